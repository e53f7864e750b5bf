//! Error types for the eventtracker ecosystem.

use thiserror::Error;

use crate::collab::permission::Capability;

/// Failures reported by an authentication provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("An account already exists for {0}")]
    EmailInUse(String),

    #[error("Password is too short (minimum {min} characters)")]
    WeakPassword { min: usize },

    #[error("Sign-in was cancelled")]
    Cancelled,

    #[error("Authentication backend unavailable: {0}")]
    Unavailable(String),
}

/// Failures of a write against the remote store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteWriteError {
    #[error("Permission denied: sign in to modify events")]
    PermissionDenied,

    #[error("Malformed path: {0}")]
    MalformedPath(String),

    #[error("No event with id '{0}'")]
    MissingDocument(String),

    #[error("Remote store unreachable: {0}")]
    Connectivity(String),
}

/// Failures of a read or subscription against the remote store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteReadError {
    #[error("Permission denied: sign in to read events")]
    PermissionDenied,

    #[error("Malformed path: {0}")]
    MalformedPath(String),

    #[error("Remote store unreachable: {0}")]
    Connectivity(String),
}

/// Failures of the local relational cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalStoreError {
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Local store I/O error: {0}")]
    Io(String),

    #[error("Local store is closed")]
    Closed,
}

impl From<rusqlite::Error> for LocalStoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                LocalStoreError::Constraint(err.to_string())
            }
            _ => LocalStoreError::Io(err.to_string()),
        }
    }
}

/// Errors that can occur in eventtracker operations.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    RemoteWrite(#[from] RemoteWriteError),

    #[error(transparent)]
    RemoteRead(#[from] RemoteReadError),

    #[error(transparent)]
    LocalStore(#[from] LocalStoreError),

    #[error("Permission '{0}' was not granted")]
    PermissionDenied(Capability),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for eventtracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_failures_map_to_constraint_variant() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("NOT NULL constraint failed: Event.title".into()),
        );
        assert!(matches!(
            LocalStoreError::from(err),
            LocalStoreError::Constraint(_)
        ));
    }

    #[test]
    fn other_sqlite_failures_map_to_io() {
        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(LocalStoreError::from(err), LocalStoreError::Io(_)));
    }
}
