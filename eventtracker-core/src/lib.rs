//! Core types for eventtracker.
//!
//! - `event`: the event record and its patchable fields
//! - `remote`: the push-notifying remote event store
//! - `cache`: the on-device SQLite mirror
//! - `coordinator`: the single owner of both stores and of the event list
//! - `digest`: the SMS summary of upcoming events
//! - `collab`: authentication, SMS and permission contracts

pub mod cache;
pub mod collab;
pub mod coordinator;
pub mod digest;
pub mod error;
pub mod event;
pub mod format;
pub mod remote;
pub mod tracker_config;

pub use coordinator::{CachePolicy, EventsView, SyncCoordinator};
pub use error::{TrackerError, TrackerResult};
pub use event::{Event, EventDraft, EventField};
pub use tracker_config::TrackerConfig;
