//! Contracts for the services the tracker depends on but does not own:
//! authentication, SMS delivery and runtime permissions. Each comes with a
//! local, file-backed implementation.

pub mod auth;
pub mod permission;
pub mod sms;

pub use auth::{AuthProvider, LocalAccounts, Session, SignInMethod};
pub use permission::{Capability, GrantStore, PermissionDecision, PermissionGate};
pub use sms::{OutboxSms, SmsTransport};
