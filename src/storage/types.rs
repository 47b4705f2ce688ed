use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::{strip_system_prefix, Message};

/// One conversation as held by the store and the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    /// Primary key, unique within the store
    pub title: String,
    /// When the last turn committed (second precision)
    pub last_updated: DateTime<Utc>,
    /// Transcript without a leading system message
    pub messages: Vec<Message>,
}

impl ConversationRecord {
    /// Build a record stamped with the current time
    ///
    /// A leading system message is dropped.
    pub fn new(title: impl Into<String>, messages: &[Message]) -> Self {
        Self::with_timestamp(title, messages, Utc::now())
    }

    /// Build a record with an explicit timestamp, truncated to whole seconds
    pub fn with_timestamp(
        title: impl Into<String>,
        messages: &[Message],
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            last_updated: truncate_to_seconds(last_updated),
            messages: strip_system_prefix(messages).to_vec(),
        }
    }
}

/// Stored value for one key: `{"time": <epoch seconds>, "messages": [...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredConversation {
    pub time: i64,
    pub messages: Vec<Message>,
}

impl StoredConversation {
    pub fn from_record(record: &ConversationRecord) -> Self {
        Self {
            time: record.last_updated.timestamp(),
            messages: strip_system_prefix(&record.messages).to_vec(),
        }
    }

    pub fn into_record(self, title: String) -> Option<ConversationRecord> {
        let last_updated = Utc.timestamp_opt(self.time, 0).single()?;
        Some(ConversationRecord {
            title,
            last_updated,
            messages: self.messages,
        })
    }
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(at.timestamp(), 0).single().unwrap_or(at)
}
