use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::adapter::AdapterCore;
use crate::backend::memory::queue::InMemoryQueue;
use crate::backend::memory::registry::QueueRegistry;
use crate::backend::memory::MemoryConfig;
use crate::error::{MqError, MqResult};
use crate::producer::Producer;
use crate::types::health::HealthStatus;
use crate::types::ids::MessageId;
use crate::types::options::{OutgoingMessage, PublishOptions};
use crate::types::payload::Payload;

/// Producer over a registry-resolved in-memory queue
///
/// Payloads are stored structurally; no byte serialization happens on this
/// backend. Publish options other than `key` and `headers` are ignored.
pub struct MemoryProducer {
    core: AdapterCore,
    config: MemoryConfig,
    queue: RwLock<Option<Arc<InMemoryQueue>>>,
}

impl MemoryProducer {
    pub fn new(config: MemoryConfig) -> MqResult<Self> {
        Ok(Self {
            core: AdapterCore::new(config.base.clone())?,
            config,
            queue: RwLock::new(None),
        })
    }

    fn queue(&self) -> MqResult<Arc<InMemoryQueue>> {
        self.queue
            .read()
            .clone()
            .ok_or_else(|| MqError::connection("producer is not connected"))
    }
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn connect(&self) -> MqResult<()> {
        if self.core.is_connected() {
            return Ok(());
        }
        let queue =
            QueueRegistry::global().get_or_create(&self.config.queue, self.config.limits());
        *self.queue.write() = Some(queue);
        self.core.mark_connected();
        if self.core.log_enabled() {
            info!(queue = %self.config.queue, "memory producer connected");
        }
        Ok(())
    }

    async fn disconnect(&self) -> MqResult<()> {
        if !self.core.is_connected() {
            return Ok(());
        }
        self.core.mark_disconnected();
        *self.queue.write() = None;
        if self.core.log_enabled() {
            info!(queue = %self.config.queue, "memory producer disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    async fn publish(&self, body: Payload, options: PublishOptions) -> MqResult<MessageId> {
        let queue = self.queue()?;
        let id = self
            .core
            .execute_with_resilience(|| {
                let queue = queue.clone();
                let body = body.clone();
                let key = options.key.clone();
                let headers = options.headers.clone().unwrap_or_default();
                async move { Ok(queue.enqueue(body, key, headers)) }
            })
            .await?;
        if self.core.log_enabled() {
            debug!(queue = %self.config.queue, id = %id, "published message");
        }
        Ok(id)
    }

    async fn publish_batch(&self, messages: Vec<OutgoingMessage>) -> MqResult<Vec<MessageId>> {
        // This backend reports per-entry batch results: failed entries are
        // logged and skipped, survivors keep their original order
        let ids = publish_each(&self.config.queue, messages, |message| {
            self.publish(message.body, message.options)
        })
        .await;
        Ok(ids)
    }

    async fn health_check(&self) -> MqResult<HealthStatus> {
        let started = Instant::now();
        let connected = self.core.is_connected();

        let status = match self.queue.read().clone() {
            Some(queue) => HealthStatus::healthy(connected)
                .with_latency_ms(started.elapsed().as_millis() as u64)
                .with_details(json!({
                    "queue": queue.name(),
                    "size": queue.len(),
                    "processing_count": queue.processing_count(),
                })),
            None => HealthStatus::unhealthy(connected, "producer is not connected"),
        };
        Ok(status)
    }
}

/// Publish a batch entry by entry, collecting per-entry results
///
/// Failed entries are logged and skipped rather than failing the whole
/// batch; the returned IDs are the successes in their original order.
async fn publish_each<F, Fut>(
    queue: &str,
    messages: Vec<OutgoingMessage>,
    mut publish_one: F,
) -> Vec<MessageId>
where
    F: FnMut(OutgoingMessage) -> Fut,
    Fut: Future<Output = MqResult<MessageId>>,
{
    let mut ids = Vec::with_capacity(messages.len());
    for (index, message) in messages.into_iter().enumerate() {
        match publish_one(message).await {
            Ok(id) => ids.push(id),
            Err(err) => {
                warn!(queue, index, error = %err, "skipping failed batch entry");
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BaseConfig, CircuitBreakerConfig};
    use crate::types::message::Headers;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unique(name: &str) -> String {
        format!("{}-{}", name, uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_publish_requires_connect() {
        let producer = MemoryProducer::new(MemoryConfig::new(unique("orders"))).unwrap();
        let err = producer
            .publish(Payload::from("m1"), PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONNECTION_ERROR");
    }

    #[tokio::test]
    async fn test_publish_stores_structurally() {
        let queue_name = unique("orders");
        let producer = MemoryProducer::new(MemoryConfig::new(&queue_name)).unwrap();
        producer.connect().await.unwrap();

        let mut headers = Headers::new();
        headers.insert("trace".to_string(), "abc".into());
        let id = producer
            .publish(
                Payload::object([("order_id", "123")]),
                PublishOptions::new().with_key("k1").with_headers(headers),
            )
            .await
            .unwrap();

        let queue = QueueRegistry::global().get(&queue_name).unwrap();
        let stored = queue.dequeue().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.key.as_deref(), Some("k1"));
        assert_eq!(stored.body.get("order_id").unwrap().as_str(), Some("123"));

        QueueRegistry::global().remove(&queue_name);
    }

    #[tokio::test]
    async fn test_publish_batch_preserves_order() {
        let queue_name = unique("orders");
        let producer = MemoryProducer::new(MemoryConfig::new(&queue_name)).unwrap();
        producer.connect().await.unwrap();

        let ids = producer
            .publish_batch(vec![
                OutgoingMessage::new(Payload::from(1)),
                OutgoingMessage::new(Payload::from(2)),
                OutgoingMessage::new(Payload::from(3)),
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);

        let queue = QueueRegistry::global().get(&queue_name).unwrap();
        for expected_id in &ids {
            assert_eq!(&queue.dequeue().unwrap().id, expected_id);
        }

        QueueRegistry::global().remove(&queue_name);
    }

    #[tokio::test]
    async fn test_publish_batch_skips_failed_entries() {
        let attempts = AtomicU32::new(0);
        let messages = vec![
            OutgoingMessage::new(Payload::from(0)),
            OutgoingMessage::new(Payload::from(1)),
            OutgoingMessage::new(Payload::from(2)),
        ];

        // Middle entry fails; the survivors come back in original order
        let ids = publish_each("orders", messages, |_message| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    Err(MqError::publish("broker rejected entry"))
                } else {
                    Ok(MessageId::broker_assigned(format!("entry-{n}")))
                }
            }
        })
        .await;

        let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, ["entry-0", "entry-2"]);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_publish_batch_under_open_circuit_returns_survivors_only() {
        let queue_name = unique("orders");
        let base = BaseConfig::default()
            .with_circuit_breaker(CircuitBreakerConfig::new().enabled());
        let producer =
            MemoryProducer::new(MemoryConfig::new(&queue_name).with_base(base)).unwrap();
        producer.connect().await.unwrap();

        // Open circuit: every entry fails fast, is skipped, nothing lands
        producer.core.breaker().trip();
        let ids = producer
            .publish_batch(vec![
                OutgoingMessage::new(Payload::from(1)),
                OutgoingMessage::new(Payload::from(2)),
            ])
            .await
            .unwrap();
        assert!(ids.is_empty());
        let queue = QueueRegistry::global().get(&queue_name).unwrap();
        assert!(queue.is_empty());

        // Closed again: the same batch goes through whole
        producer.core.breaker().reset();
        let ids = producer
            .publish_batch(vec![
                OutgoingMessage::new(Payload::from(1)),
                OutgoingMessage::new(Payload::from(2)),
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(queue.len(), 2);

        QueueRegistry::global().remove(&queue_name);
    }

    #[tokio::test]
    async fn test_connect_disconnect_idempotent() {
        let producer = MemoryProducer::new(MemoryConfig::new(unique("orders"))).unwrap();

        producer.connect().await.unwrap();
        producer.connect().await.unwrap();
        assert!(producer.is_connected());

        producer.disconnect().await.unwrap();
        producer.disconnect().await.unwrap();
        assert!(!producer.is_connected());
    }

    #[tokio::test]
    async fn test_health_check_reports_depth() {
        let queue_name = unique("orders");
        let producer = MemoryProducer::new(MemoryConfig::new(&queue_name)).unwrap();
        producer.connect().await.unwrap();
        producer
            .publish(Payload::from("m1"), PublishOptions::default())
            .await
            .unwrap();

        let health = producer.health_check().await.unwrap();
        assert!(health.healthy);
        assert!(health.connected);
        assert_eq!(health.details.unwrap()["size"], 1);

        QueueRegistry::global().remove(&queue_name);
    }
}
