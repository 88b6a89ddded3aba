use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a published or delivered message
///
/// Synthesized as a v4 UUID unless the broker hands one out. Broker-assigned
/// identifiers are normalized on the way in, and brokers that address
/// messages by position rather than identity get the topic-partition-offset
/// form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Synthesize a new unique message ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Normalize a broker-assigned identifier
    ///
    /// Surrounding whitespace is stripped. A blank ID (some brokers return
    /// one on fire-and-forget sends) falls back to a synthesized UUID so an
    /// envelope never carries an empty identity.
    pub fn broker_assigned(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Self::new()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Synthesize the ID for brokers that address messages by log position
    /// instead of identity, e.g. a Kafka record
    pub fn from_partition_offset(topic: &str, partition: i32, offset: i64) -> Self {
        Self(format!("{topic}-{partition}-{offset}"))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self::broker_assigned(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::broker_assigned(id)
    }
}
