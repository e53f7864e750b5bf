//! SMS transport contract and an outbox-file stand-in.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Fire-and-forget text message delivery.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, phone_number: &str, body: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub to: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Appends every message as one JSON line to an outbox file.
#[derive(Debug, Clone)]
pub struct OutboxSms {
    path: PathBuf,
}

impl OutboxSms {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        OutboxSms { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Messages sent so far, oldest first. Unreadable lines are skipped.
    pub fn messages(&self) -> Vec<OutboxMessage> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    fn append(&self, message: &OutboxMessage) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(message)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

#[async_trait]
impl SmsTransport for OutboxSms {
    async fn send(&self, phone_number: &str, body: &str) {
        let message = OutboxMessage {
            to: phone_number.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
        };

        match self.append(&message) {
            Ok(()) => info!(to = %phone_number, bytes = body.len(), "sms queued"),
            Err(e) => warn!(to = %phone_number, error = %e, "sms delivery failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sms = OutboxSms::new(dir.path().join("out").join("sms-outbox.jsonl"));

        sms.send("+15555550100", "first").await;
        sms.send("+15555550100", "second\nline").await;

        let messages = sms.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "first");
        assert_eq!(messages[1].body, "second\nline");
        assert_eq!(messages[1].to, "+15555550100");
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the outbox file should be makes the append fail.
        let sms = OutboxSms::new(dir.path());
        sms.send("+15555550100", "lost").await;
        assert!(sms.messages().is_empty());
    }
}
