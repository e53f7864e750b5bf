//! Remote event store: a hierarchical, push-notifying document collection.
//!
//! Every event lives under a fixed root path (by default `EventTracker`) keyed by
//! a store-generated push id. Writers get an acknowledgment back; readers register
//! a [`Subscription`] and receive the full snapshot of the collection after every
//! acknowledged change.

pub mod listeners;
pub mod push_id;
pub mod realtime;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RemoteReadError, RemoteWriteError};
use crate::event::{Event, EventDraft, EventField};

pub use listeners::{ListenerRegistry, Subscription};
pub use realtime::{AccessRules, RealtimeStore};

/// Collection that holds every event document.
pub const DEFAULT_ROOT: &str = "EventTracker";

/// CRUD surface of a remote event collection.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Write a new document under a freshly generated id. Resolves with the id
    /// once the store has acknowledged the write.
    async fn create(&self, draft: &EventDraft) -> Result<String, RemoteWriteError>;

    /// Register a listener. The current snapshot is delivered immediately, then a
    /// fresh one after every acknowledged change.
    async fn subscribe(&self) -> Result<Subscription, RemoteReadError>;

    /// Patch a single field of an existing document.
    async fn update_field(
        &self,
        id: &str,
        field: EventField,
        value: &str,
    ) -> Result<(), RemoteWriteError>;

    /// Delete the document at `id`. Missing ids are not an error.
    async fn remove(&self, id: &str) -> Result<(), RemoteWriteError>;
}

/// Full contents of the collection at one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Number of acknowledged changes the store had applied when this was taken
    pub revision: u64,
    /// Documents in key order, which is creation order for push ids
    pub events: Vec<Event>,
}

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }
}

/// Shape of an event document stored under its id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
}

impl EventDocument {
    pub fn into_event(self, id: impl Into<String>) -> Event {
        Event::new(id, self.title, self.date, self.time)
    }
}

impl From<&EventDraft> for EventDocument {
    fn from(draft: &EventDraft) -> Self {
        EventDocument {
            title: draft.title.clone(),
            date: draft.date.clone(),
            time: draft.time.clone(),
        }
    }
}

/// A validated `/`-separated location in the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPath(Vec<String>);

impl RootPath {
    pub fn parse(path: &str) -> Result<Self, String> {
        let segments: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .map(str::to_string)
            .collect();

        for segment in &segments {
            validate_key(segment).map_err(|reason| format!("'{}': {}", path, reason))?;
        }

        Ok(RootPath(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl Default for RootPath {
    fn default() -> Self {
        RootPath(vec![DEFAULT_ROOT.to_string()])
    }
}

impl fmt::Display for RootPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Longest key the store accepts, in bytes.
const MAX_KEY_BYTES: usize = 768;

/// Check a single path segment (a collection name or a document id).
pub fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("empty path segment".into());
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(format!("key longer than {} bytes", MAX_KEY_BYTES));
    }
    if let Some(c) = key
        .chars()
        .find(|c| matches!(c, '.' | '#' | '$' | '[' | ']' | '/') || c.is_control())
    {
        return Err(format!("key contains forbidden character {:?}", c));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_parses_nested_segments() {
        let path = RootPath::parse("/users/u1/EventTracker/").unwrap();
        assert_eq!(path.segments(), ["users", "u1", "EventTracker"]);
        assert_eq!(path.to_string(), "users/u1/EventTracker");
    }

    #[test]
    fn root_path_rejects_forbidden_characters() {
        assert!(RootPath::parse("Event.Tracker").is_err());
        assert!(RootPath::parse("events/$all").is_err());
        assert!(RootPath::parse("a//b").is_err());
        assert!(RootPath::parse("").is_err());
    }

    #[test]
    fn document_defaults_missing_fields() {
        let doc: EventDocument = serde_json::from_str(r#"{"title":"Standup"}"#).unwrap();
        let event = doc.into_event("k1");
        assert_eq!(event.title, "Standup");
        assert_eq!(event.date, "");
        assert_eq!(event.time, "");
    }
}
