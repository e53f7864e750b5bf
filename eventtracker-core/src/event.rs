//! The event record shared by the remote store, the local cache and the list view.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A tracked event.
///
/// `Default` is the empty record the cache row mapping starts from; `new` builds a
/// complete one. No validation happens here, callers check their input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Key assigned by the remote store at write time
    pub id: String,
    pub title: String,
    /// `MM/DD/YYYY`
    pub date: String,
    /// `H:MMAM` / `H:MMPM`
    pub time: String,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        date: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        Event {
            id: id.into(),
            title: title.into(),
            date: date.into(),
            time: time.into(),
        }
    }

    pub fn field(&self, field: EventField) -> &str {
        match field {
            EventField::Title => &self.title,
            EventField::Date => &self.date,
            EventField::Time => &self.time,
        }
    }

    pub fn set_field(&mut self, field: EventField, value: impl Into<String>) {
        let value = value.into();
        match field {
            EventField::Title => self.title = value,
            EventField::Date => self.date = value,
            EventField::Time => self.time = value,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.title, self.date, self.time)
    }
}

/// A single patchable field of an event document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventField {
    Title,
    Date,
    Time,
}

impl EventField {
    pub const ALL: [EventField; 3] = [EventField::Title, EventField::Date, EventField::Time];

    /// Key of the field inside a remote event document.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventField::Title => "title",
            EventField::Date => "date",
            EventField::Time => "time",
        }
    }
}

impl fmt::Display for EventField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventField::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown event field '{}'. Expected title, date or time", s))
    }
}

/// What the create form submits: everything but the id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub date: String,
    pub time: String,
}

impl EventDraft {
    pub fn new(
        title: impl Into<String>,
        date: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        EventDraft {
            title: title.into(),
            date: date.into(),
            time: time.into(),
        }
    }

    /// Fields left blank, in form order. The form refuses to submit unless empty.
    pub fn missing_fields(&self) -> Vec<EventField> {
        EventField::ALL
            .into_iter()
            .filter(|field| {
                let value = match field {
                    EventField::Title => &self.title,
                    EventField::Date => &self.date,
                    EventField::Time => &self.time,
                };
                value.trim().is_empty()
            })
            .collect()
    }

    /// Attach the id the remote store acknowledged.
    pub fn into_event(self, id: impl Into<String>) -> Event {
        Event::new(id, self.title, self.date, self.time)
    }
}
