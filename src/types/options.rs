use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::message::Headers;
use crate::types::payload::Payload;

/// Per-publish options
///
/// The universal superset across backends; each adapter maps what its broker
/// supports and silently ignores the rest.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Routing/partition key
    pub key: Option<String>,

    pub headers: Option<Headers>,

    /// Explicit partition (Kafka)
    pub partition: Option<i32>,

    /// Delay before the message becomes visible (SQS, JetStream, Azure SB)
    pub delay_seconds: Option<u32>,

    /// FIFO message group (SQS/SNS FIFO, Azure SB session)
    pub group_id: Option<String>,

    /// FIFO deduplication ID
    pub deduplication_id: Option<String>,

    /// Ordered-delivery key (Pub/Sub)
    pub ordering_key: Option<String>,

    /// Broker-level priority (RabbitMQ)
    pub priority: Option<u8>,

    /// Message time-to-live
    pub ttl_ms: Option<u64>,

    pub correlation_id: Option<String>,

    pub reply_to: Option<String>,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_ordering_key(mut self, ordering_key: impl Into<String>) -> Self {
        self.ordering_key = Some(ordering_key.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// One message of a batch publish
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub body: Payload,
    pub options: PublishOptions,
}

impl OutgoingMessage {
    pub fn new(body: impl Into<Payload>) -> Self {
        Self {
            body: body.into(),
            options: PublishOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }
}

/// Subscription options
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Start from the earliest retained message where the backend supports it
    pub from_beginning: bool,

    /// Start from a point in time where the backend supports it
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Maximum envelopes in flight to handlers at once
    pub concurrency: usize,

    /// Acknowledge automatically when the handler returns cleanly
    pub auto_ack: bool,

    /// Upper bound on a dispatched batch
    pub batch_size: Option<usize>,

    /// Dispatch a partial batch once this much time has passed since its
    /// first message arrived
    pub batch_timeout: Option<Duration>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            from_beginning: false,
            from_timestamp: None,
            concurrency: 1,
            auto_ack: true,
            batch_size: None,
            batch_timeout: None,
        }
    }
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_beginning(mut self) -> Self {
        self.from_beginning = true;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn manual_ack(mut self) -> Self {
        self.auto_ack = false;
        self
    }

    pub fn with_batch(mut self, batch_size: usize, batch_timeout: Duration) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self.batch_timeout = Some(batch_timeout);
        self
    }
}

/// Target for `Consumer::seek` on backends with repositionable cursors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeekPosition {
    Beginning,
    End,
    /// Absolute offset/sequence number
    Offset(u64),
    Timestamp(DateTime<Utc>),
}
