use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ids::MessageId;

/// Consumer lifecycle events for observability
///
/// Broadcast on a best-effort channel; slow subscribers lose old events
/// rather than blocking the delivery loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConsumerEvent {
    /// Handler or transport error that did not kill the subscription
    Error {
        message: String,
        at: DateTime<Utc>,
    },

    /// In-flight messages crossed the high-watermark
    Backpressure {
        in_flight: usize,
        at: DateTime<Utc>,
    },

    /// Group rebalance started (partition/stream reassignment)
    Rebalancing {
        at: DateTime<Utc>,
    },

    /// Group rebalance finished
    Rebalanced {
        at: DateTime<Utc>,
    },

    /// Connection-level failure; the subscription is dead
    Crash {
        message: String,
        at: DateTime<Utc>,
    },

    /// A message was dispatched to a handler
    Message {
        id: MessageId,
        at: DateTime<Utc>,
    },
}

impl ConsumerEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::Backpressure { .. } => "backpressure",
            Self::Rebalancing { .. } => "rebalancing",
            Self::Rebalanced { .. } => "rebalanced",
            Self::Crash { .. } => "crash",
            Self::Message { .. } => "message",
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Error { at, .. } => at,
            Self::Backpressure { at, .. } => at,
            Self::Rebalancing { at } => at,
            Self::Rebalanced { at } => at,
            Self::Crash { at, .. } => at,
            Self::Message { at, .. } => at,
        }
    }
}
