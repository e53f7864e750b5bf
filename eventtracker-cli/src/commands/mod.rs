pub mod auth;
pub mod cache;
pub mod delete;
pub mod digest;
pub mod edit;
pub mod events;
pub mod new;
pub mod watch;
