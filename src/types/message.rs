use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::{MqError, MqResult};
use crate::provider::Provider;
use crate::serializer::json::payload_to_json;
use crate::types::ids::MessageId;
use crate::types::payload::Payload;

/// Header value: UTF-8 text or an opaque byte blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    Binary(Bytes),
}

impl HeaderValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(v))
    }
}

/// Message headers; names are unique, order is irrelevant
pub type Headers = HashMap<String, HeaderValue>;

/// Backend-specific delivery metadata
///
/// The tagged variant identifies the backend that produced an envelope and
/// carries the fields an operator needs to reach the underlying delivery in
/// that backend's own terms.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderMetadata {
    Memory {
        queue: String,
    },
    /// Entry IDs carry a millisecond timestamp prefix; the adapter derives
    /// the delivery timestamp from it
    RedisStreams {
        stream: String,
        group: String,
        entry_id: String,
    },
    /// `redelivered` only distinguishes first delivery from later ones, so
    /// the adapter reports attempt 1 or 2
    RabbitMq {
        exchange: String,
        routing_key: String,
        delivery_tag: u64,
        redelivered: bool,
    },
    Sqs {
        queue_url: String,
        receipt_handle: String,
        receive_count: u32,
    },
    Sns {
        topic_arn: String,
    },
    PubSub {
        subscription: String,
        ack_id: String,
        delivery_attempt: u32,
    },
    /// Kafka has no broker-side attempt counter; adapters report a fixed
    /// `delivery_attempt` of 1 and synthesize IDs as topic-partition-offset
    Kafka {
        topic: String,
        partition: i32,
        offset: i64,
    },
    Jetstream {
        stream: String,
        consumer: String,
        sequence: u64,
        redelivery_count: u64,
    },
    AzureServiceBus {
        entity: String,
        lock_token: String,
        sequence_number: i64,
        delivery_count: u32,
    },
}

impl ProviderMetadata {
    /// The backend that produced this envelope
    pub fn provider(&self) -> Provider {
        match self {
            Self::Memory { .. } => Provider::Memory,
            Self::RedisStreams { .. } => Provider::RedisStreams,
            Self::RabbitMq { .. } => Provider::RabbitMq,
            Self::Sqs { .. } => Provider::Sqs,
            Self::Sns { .. } => Provider::Sns,
            Self::PubSub { .. } => Provider::PubSub,
            Self::Kafka { .. } => Provider::Kafka,
            Self::Jetstream { .. } => Provider::Jetstream,
            Self::AzureServiceBus { .. } => Provider::AzureServiceBus,
        }
    }
}

/// Settlement decision for a delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleAction {
    /// Positive acknowledgement; the broker forgets the message
    Ack,

    /// Negative acknowledgement; `requeue` asks for redelivery
    Nack { requeue: bool },

    /// Lengthen the lock/visibility window for this delivery
    ExtendDeadline { seconds: u32 },
}

/// Backend hook the envelope dispatches settlement calls through
///
/// One handle per delivery, owned by the envelope; adapters bind it to the
/// backend acknowledgement primitive (XACK, DeleteMessage, ack_id, ...).
#[async_trait]
pub trait Settlement: Send + Sync {
    async fn settle(&self, action: SettleAction) -> MqResult<()>;
}

/// A delivered message as handed to consumer handlers
///
/// Immutable to the handler apart from its settlement lifecycle, which moves
/// `unsettled -> settled` exactly once; repeat `ack`/`nack` calls are Ok
/// no-ops.
pub struct Delivery {
    /// Unique per delivery
    pub id: MessageId,

    /// Decoded payload
    pub body: Payload,

    /// Routing/partition key, when the publisher set one
    pub key: Option<String>,

    pub headers: Headers,

    /// Original publication time
    pub timestamp: DateTime<Utc>,

    /// 1-based count of deliveries of this message to any consumer of the
    /// same group/subscription; increases monotonically across redeliveries
    pub delivery_attempt: u32,

    /// Backend identification plus backend-specific fields
    pub metadata: ProviderMetadata,

    settlement: Arc<dyn Settlement>,
    settled: Arc<AtomicBool>,
}

impl Delivery {
    pub fn new(
        id: MessageId,
        body: Payload,
        key: Option<String>,
        headers: Headers,
        timestamp: DateTime<Utc>,
        delivery_attempt: u32,
        metadata: ProviderMetadata,
        settlement: Arc<dyn Settlement>,
    ) -> Self {
        Self {
            id,
            body,
            key,
            headers,
            timestamp,
            delivery_attempt,
            metadata,
            settlement,
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deserialize the payload into a concrete type
    pub fn body_as<T: DeserializeOwned>(&self) -> MqResult<T> {
        let value = payload_to_json(&self.body)?;
        serde_json::from_value(value).map_err(MqError::from)
    }

    /// Positively acknowledge this delivery
    pub async fn ack(&self) -> MqResult<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.settlement.settle(SettleAction::Ack).await
    }

    /// Negatively acknowledge; `requeue` asks the backend to redeliver
    pub async fn nack(&self, requeue: bool) -> MqResult<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.settlement.settle(SettleAction::Nack { requeue }).await
    }

    /// Lengthen the lock/visibility window; does not settle the delivery
    pub async fn extend_deadline(&self, seconds: u32) -> MqResult<()> {
        if self.settled.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.settlement
            .settle(SettleAction::ExtendDeadline { seconds })
            .await
    }

    /// Whether ack or nack has already been dispatched
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("timestamp", &self.timestamp)
            .field("delivery_attempt", &self.delivery_attempt)
            .field("provider", &self.metadata.provider())
            .field("settled", &self.is_settled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingSettlement {
        actions: Mutex<Vec<SettleAction>>,
    }

    impl RecordingSettlement {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                actions: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Settlement for RecordingSettlement {
        async fn settle(&self, action: SettleAction) -> MqResult<()> {
            self.actions.lock().push(action);
            Ok(())
        }
    }

    fn delivery_with(settlement: Arc<RecordingSettlement>) -> Delivery {
        Delivery::new(
            MessageId::new(),
            Payload::object([("order_id", "123")]),
            None,
            Headers::new(),
            Utc::now(),
            1,
            ProviderMetadata::Memory {
                queue: "orders".to_string(),
            },
            settlement,
        )
    }

    #[tokio::test]
    async fn test_ack_is_idempotent() {
        let settlement = RecordingSettlement::new();
        let delivery = delivery_with(settlement.clone());

        delivery.ack().await.unwrap();
        delivery.ack().await.unwrap();
        delivery.nack(true).await.unwrap();

        assert_eq!(settlement.actions.lock().as_slice(), &[SettleAction::Ack]);
        assert!(delivery.is_settled());
    }

    #[tokio::test]
    async fn test_nack_carries_requeue_flag() {
        let settlement = RecordingSettlement::new();
        let delivery = delivery_with(settlement.clone());

        delivery.nack(true).await.unwrap();

        assert_eq!(
            settlement.actions.lock().as_slice(),
            &[SettleAction::Nack { requeue: true }]
        );
    }

    #[tokio::test]
    async fn test_extend_deadline_does_not_settle() {
        let settlement = RecordingSettlement::new();
        let delivery = delivery_with(settlement.clone());

        delivery.extend_deadline(30).await.unwrap();
        assert!(!delivery.is_settled());

        delivery.ack().await.unwrap();
        assert_eq!(
            settlement.actions.lock().as_slice(),
            &[SettleAction::ExtendDeadline { seconds: 30 }, SettleAction::Ack]
        );
    }

    #[tokio::test]
    async fn test_body_as_typed_decode() {
        #[derive(serde::Deserialize)]
        struct Order {
            order_id: String,
        }

        let delivery = delivery_with(RecordingSettlement::new());
        let order: Order = delivery.body_as().unwrap();
        assert_eq!(order.order_id, "123");
    }

    #[test]
    fn test_metadata_provider_tags() {
        let metadata = ProviderMetadata::Kafka {
            topic: "orders".to_string(),
            partition: 3,
            offset: 1042,
        };
        assert_eq!(metadata.provider(), Provider::Kafka);
        assert_eq!(metadata.provider().name(), "kafka");
    }
}
