use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::AdapterCore;
use crate::backend::memory::queue::{InMemoryQueue, QueueLimits, StoredMessage};
use crate::backend::memory::registry::QueueRegistry;
use crate::backend::memory::MemoryConfig;
use crate::config::DeadLetterConfig;
use crate::consumer::{BatchHandler, BoxStream, Consumer, MessageHandler};
use crate::error::{MqError, MqResult};
use crate::types::events::ConsumerEvent;
use crate::types::health::HealthStatus;
use crate::types::ids::MessageId;
use crate::types::message::{Delivery, ProviderMetadata, SettleAction, Settlement};
use crate::types::options::SubscribeOptions;

/// Poll cadence of the delivery loop
const TICK: Duration = Duration::from_millis(10);

/// Default batch framing when the subscriber sets a size but no timeout
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_millis(100);

/// Floor for the backpressure high-watermark
const MIN_HIGH_WATERMARK: usize = 16;

/// Binds an envelope's settlement calls to its in-memory queue entry
struct MemorySettlement {
    queue: Arc<InMemoryQueue>,
    id: MessageId,
}

#[async_trait]
impl Settlement for MemorySettlement {
    async fn settle(&self, action: SettleAction) -> MqResult<()> {
        match action {
            SettleAction::Ack => {
                self.queue.ack(&self.id);
            }
            SettleAction::Nack { requeue } => {
                self.queue.nack(&self.id, requeue);
            }
            // In-memory deliveries hold no expiring lock
            SettleAction::ExtendDeadline { .. } => {}
        }
        Ok(())
    }
}

/// Everything a dispatch needs, cloneable into concurrent handler tasks
#[derive(Clone)]
struct DispatchCtx {
    queue: Arc<InMemoryQueue>,
    dlq: Option<Arc<InMemoryQueue>>,
    dlq_config: DeadLetterConfig,
    auto_ack: bool,
    events: broadcast::Sender<ConsumerEvent>,
    log_enabled: bool,
}

impl DispatchCtx {
    fn make_delivery(&self, stored: StoredMessage) -> Delivery {
        let settlement = Arc::new(MemorySettlement {
            queue: self.queue.clone(),
            id: stored.id.clone(),
        });
        Delivery::new(
            stored.id,
            stored.body,
            stored.key,
            stored.headers,
            stored.timestamp,
            stored.delivery_attempt,
            ProviderMetadata::Memory {
                queue: self.queue.name().to_string(),
            },
            settlement,
        )
    }

    /// Handler-failure bookkeeping: emit the error, then dead-letter at the
    /// attempt threshold or requeue for another delivery
    fn on_handler_failure(&self, id: &MessageId, attempt: u32, err: &MqError) {
        if self.log_enabled {
            warn!(queue = %self.queue.name(), id = %id, attempt, error = %err, "handler failed");
        }
        let _ = self.events.send(ConsumerEvent::Error {
            message: err.to_string(),
            at: Utc::now(),
        });

        let dead_lettered = if self.dlq_config.enabled
            && attempt >= self.dlq_config.max_delivery_attempts
        {
            match &self.dlq {
                Some(dlq) => {
                    let reason = self
                        .dlq_config
                        .include_error
                        .then(|| err.to_string());
                    self.queue.dead_letter(id, dlq, reason.as_deref())
                }
                None => false,
            }
        } else {
            false
        };

        if !dead_lettered {
            self.queue.nack(id, true);
        }
    }
}

async fn dispatch_one(ctx: DispatchCtx, handler: Arc<dyn MessageHandler>, stored: StoredMessage) {
    let id = stored.id.clone();
    let attempt = stored.delivery_attempt;
    let delivery = ctx.make_delivery(stored);

    let _ = ctx.events.send(ConsumerEvent::Message {
        id: id.clone(),
        at: Utc::now(),
    });

    match handler.handle(delivery).await {
        Ok(()) => {
            if ctx.auto_ack {
                // No-op when the handler settled the envelope itself
                ctx.queue.ack(&id);
            }
        }
        Err(err) => ctx.on_handler_failure(&id, attempt, &err),
    }
}

async fn dispatch_batch(
    ctx: &DispatchCtx,
    handler: &Arc<dyn BatchHandler>,
    batch: Vec<StoredMessage>,
) {
    let ids: Vec<MessageId> = batch.iter().map(|m| m.id.clone()).collect();
    let deliveries: Vec<Delivery> = batch
        .into_iter()
        .map(|stored| {
            let _ = ctx.events.send(ConsumerEvent::Message {
                id: stored.id.clone(),
                at: Utc::now(),
            });
            ctx.make_delivery(stored)
        })
        .collect();

    match handler.handle(deliveries).await {
        Ok(()) => {
            if ctx.auto_ack {
                for id in &ids {
                    ctx.queue.ack(id);
                }
            }
        }
        Err(err) => {
            if ctx.log_enabled {
                warn!(queue = %ctx.queue.name(), batch = ids.len(), error = %err, "batch handler failed");
            }
            let _ = ctx.events.send(ConsumerEvent::Error {
                message: err.to_string(),
                at: Utc::now(),
            });
            // Whole-batch release; individual acks are not attempted
            for id in &ids {
                ctx.queue.nack(id, true);
            }
        }
    }
}

/// The pull-shape subscribe loop over an in-memory queue
struct DeliveryLoop {
    ctx: DispatchCtx,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
    options: SubscribeOptions,
    watermark: usize,
    above_watermark: bool,
}

impl DeliveryLoop {
    fn new(
        ctx: DispatchCtx,
        paused: Arc<AtomicBool>,
        cancel: CancellationToken,
        options: SubscribeOptions,
    ) -> Self {
        let watermark = (options.concurrency * 2).max(MIN_HIGH_WATERMARK);
        Self {
            ctx,
            paused,
            cancel,
            options,
            watermark,
            above_watermark: false,
        }
    }

    /// Fetch up to `want` messages unless paused; a pause landing between
    /// the flag check and the dequeue releases the messages untouched
    fn fetch(&self, want: usize) -> Vec<StoredMessage> {
        if self.paused.load(Ordering::SeqCst) {
            return Vec::new();
        }
        let batch = self.ctx.queue.dequeue_batch(want);
        if !batch.is_empty() && self.paused.load(Ordering::SeqCst) {
            self.release(batch);
            return Vec::new();
        }
        batch
    }

    fn release(&self, batch: Vec<StoredMessage>) {
        for message in batch {
            self.ctx.queue.nack(&message.id, true);
        }
    }

    fn check_backpressure(&mut self) {
        let in_flight = self.ctx.queue.processing_count();
        if in_flight > self.watermark {
            if !self.above_watermark {
                self.above_watermark = true;
                let _ = self.ctx.events.send(ConsumerEvent::Backpressure {
                    in_flight,
                    at: Utc::now(),
                });
            }
        } else {
            self.above_watermark = false;
        }
    }

    async fn run_single(mut self, handler: Arc<dyn MessageHandler>) {
        let mut ticker = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let batch = self.fetch(self.options.concurrency.max(1));
            if batch.is_empty() {
                continue;
            }
            self.check_backpressure();

            if batch.len() == 1 {
                let stored = batch.into_iter().next().unwrap();
                dispatch_one(self.ctx.clone(), handler.clone(), stored).await;
            } else {
                let mut tasks = JoinSet::new();
                for stored in batch {
                    tasks.spawn(dispatch_one(self.ctx.clone(), handler.clone(), stored));
                }
                while tasks.join_next().await.is_some() {}
            }
        }
    }

    async fn run_batch(mut self, handler: Arc<dyn BatchHandler>) {
        let batch_size = self.options.batch_size.unwrap_or(10).max(1);
        let batch_timeout = self.options.batch_timeout.unwrap_or(DEFAULT_BATCH_TIMEOUT);

        let mut ticker = tokio::time::interval(TICK);
        let mut pending: Vec<StoredMessage> = Vec::new();
        let mut first_at: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Already-fetched but undispatched messages go back
                    self.release(pending);
                    break;
                }
                _ = ticker.tick() => {}
            }

            if self.paused.load(Ordering::SeqCst) {
                if !pending.is_empty() {
                    self.release(std::mem::take(&mut pending));
                    first_at = None;
                }
                continue;
            }

            if pending.len() < batch_size {
                let fetched = self.fetch(batch_size - pending.len());
                if !fetched.is_empty() && first_at.is_none() {
                    first_at = Some(Instant::now());
                }
                pending.extend(fetched);
            }
            if pending.is_empty() {
                continue;
            }
            self.check_backpressure();

            // First trigger wins: full frame or timeout since first message
            let timed_out = first_at.is_some_and(|at| at.elapsed() >= batch_timeout);
            if pending.len() >= batch_size || timed_out {
                let frame = std::mem::take(&mut pending);
                first_at = None;
                dispatch_batch(&self.ctx, &handler, frame).await;
            }
        }
    }
}

/// Consumer over a registry-resolved in-memory queue
///
/// Runs the pull-shape loop: a short tick dequeues messages, dispatches to
/// the handler, auto-acks on clean return, and on handler failure either
/// dead-letters (attempt threshold met, DLQ configured) or requeues.
pub struct MemoryConsumer {
    core: AdapterCore,
    config: MemoryConfig,
    queue: RwLock<Option<Arc<InMemoryQueue>>>,
    dlq: RwLock<Option<Arc<InMemoryQueue>>>,
    paused: Arc<AtomicBool>,
    subscribed: AtomicBool,
    events: broadcast::Sender<ConsumerEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryConsumer {
    pub fn new(config: MemoryConfig) -> MqResult<Self> {
        let (events, _) = broadcast::channel(1024);
        Ok(Self {
            core: AdapterCore::new(config.base.clone())?,
            config,
            queue: RwLock::new(None),
            dlq: RwLock::new(None),
            paused: Arc::new(AtomicBool::new(false)),
            subscribed: AtomicBool::new(false),
            events,
            task: Mutex::new(None),
        })
    }

    fn queue(&self) -> MqResult<Arc<InMemoryQueue>> {
        self.queue
            .read()
            .clone()
            .ok_or_else(|| MqError::connection("consumer is not connected"))
    }

    fn start_loop(
        &self,
        options: &SubscribeOptions,
    ) -> MqResult<(DispatchCtx, Arc<AtomicBool>, CancellationToken)> {
        if !self.core.is_connected() {
            return Err(MqError::connection("consumer is not connected"));
        }
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(MqError::configuration(
                "consumer already has an active subscription",
            ));
        }
        let ctx = DispatchCtx {
            queue: self.queue()?,
            dlq: self.dlq.read().clone(),
            dlq_config: self.core.config().dead_letter_queue.clone(),
            auto_ack: options.auto_ack,
            events: self.events.clone(),
            log_enabled: self.core.log_enabled(),
        };
        Ok((ctx, self.paused.clone(), self.core.cancellation()))
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn connect(&self) -> MqResult<()> {
        if self.core.is_connected() {
            return Ok(());
        }
        let registry = QueueRegistry::global();
        *self.queue.write() = Some(registry.get_or_create(&self.config.queue, self.config.limits()));

        let dlq_config = &self.config.base.dead_letter_queue;
        if dlq_config.enabled {
            if let Some(destination) = &dlq_config.destination {
                *self.dlq.write() =
                    Some(registry.get_or_create(destination, QueueLimits::default()));
            }
        }

        self.core.mark_connected();
        if self.core.log_enabled() {
            info!(queue = %self.config.queue, "memory consumer connected");
        }
        Ok(())
    }

    async fn disconnect(&self) -> MqResult<()> {
        if !self.core.is_connected() {
            return Ok(());
        }
        self.core.mark_disconnected();

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.subscribed.store(false, Ordering::SeqCst);
        *self.queue.write() = None;
        *self.dlq.write() = None;
        if self.core.log_enabled() {
            info!(queue = %self.config.queue, "memory consumer disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    async fn subscribe(
        &self,
        handler: Arc<dyn MessageHandler>,
        options: SubscribeOptions,
    ) -> MqResult<()> {
        let (ctx, paused, cancel) = self.start_loop(&options)?;
        let delivery_loop = DeliveryLoop::new(ctx, paused, cancel, options);
        *self.task.lock() = Some(tokio::spawn(delivery_loop.run_single(handler)));
        Ok(())
    }

    async fn subscribe_batch(
        &self,
        handler: Arc<dyn BatchHandler>,
        options: SubscribeOptions,
    ) -> MqResult<()> {
        let (ctx, paused, cancel) = self.start_loop(&options)?;
        let delivery_loop = DeliveryLoop::new(ctx, paused, cancel, options);
        *self.task.lock() = Some(tokio::spawn(delivery_loop.run_batch(handler)));
        Ok(())
    }

    async fn pause(&self) -> MqResult<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> MqResult<()> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
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
                    "paused": self.is_paused(),
                })),
            None => HealthStatus::unhealthy(connected, "consumer is not connected"),
        };
        Ok(status)
    }

    fn event_stream(&self) -> BoxStream<ConsumerEvent> {
        let receiver = self.events.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|result| result.ok());
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::producer::MemoryProducer;
    use crate::consumer::handler_fn;
    use crate::producer::Producer;
    use crate::types::options::PublishOptions;
    use crate::types::payload::Payload;

    fn unique(name: &str) -> String {
        format!("{}-{}", name, uuid::Uuid::new_v4())
    }

    async fn drain(name: &str) {
        QueueRegistry::global().remove(name);
    }

    #[tokio::test]
    async fn test_subscribe_requires_connect() {
        let consumer = MemoryConsumer::new(MemoryConfig::new(unique("orders"))).unwrap();
        let err = consumer
            .subscribe(
                handler_fn(|_| async { Ok(()) }),
                SubscribeOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONNECTION_ERROR");
    }

    #[tokio::test]
    async fn test_double_subscribe_rejected() {
        let queue = unique("orders");
        let consumer = MemoryConsumer::new(MemoryConfig::new(&queue)).unwrap();
        consumer.connect().await.unwrap();

        consumer
            .subscribe(handler_fn(|_| async { Ok(()) }), SubscribeOptions::default())
            .await
            .unwrap();
        let err = consumer
            .subscribe(handler_fn(|_| async { Ok(()) }), SubscribeOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");

        consumer.disconnect().await.unwrap();
        drain(&queue).await;
    }

    #[tokio::test]
    async fn test_handler_receives_metadata_and_auto_acks() {
        let queue_name = unique("orders");
        let producer = MemoryProducer::new(MemoryConfig::new(&queue_name)).unwrap();
        producer.connect().await.unwrap();
        producer
            .publish(
                Payload::object([("order_id", "123")]),
                PublishOptions::new().with_key("k1"),
            )
            .await
            .unwrap();

        let consumer = MemoryConsumer::new(MemoryConfig::new(&queue_name)).unwrap();
        consumer.connect().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        consumer
            .subscribe(
                handler_fn(move |delivery: Delivery| {
                    let tx = tx.clone();
                    async move {
                        tx.send((
                            delivery.key.clone(),
                            delivery.delivery_attempt,
                            delivery.metadata.provider().name(),
                        ))
                        .unwrap();
                        Ok(())
                    }
                }),
                SubscribeOptions::default(),
            )
            .await
            .unwrap();

        let (key, attempt, provider) =
            tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(key.as_deref(), Some("k1"));
        assert_eq!(attempt, 1);
        assert_eq!(provider, "memory");

        // Auto-ack leaves nothing in flight
        tokio::time::sleep(Duration::from_millis(30)).await;
        let queue = QueueRegistry::global().get(&queue_name).unwrap();
        assert_eq!(queue.processing_count(), 0);

        consumer.disconnect().await.unwrap();
        drain(&queue_name).await;
    }

    #[tokio::test]
    async fn test_manual_ack_mode_leaves_unacked_in_flight() {
        let queue_name = unique("orders");
        let producer = MemoryProducer::new(MemoryConfig::new(&queue_name)).unwrap();
        producer.connect().await.unwrap();
        producer
            .publish(Payload::from("m1"), PublishOptions::default())
            .await
            .unwrap();

        let consumer = MemoryConsumer::new(MemoryConfig::new(&queue_name)).unwrap();
        consumer.connect().await.unwrap();
        consumer
            .subscribe(
                handler_fn(|_delivery: Delivery| async { Ok(()) }),
                SubscribeOptions::new().manual_ack(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let queue = QueueRegistry::global().get(&queue_name).unwrap();
        assert_eq!(queue.processing_count(), 1);

        consumer.disconnect().await.unwrap();
        drain(&queue_name).await;
    }

    #[tokio::test]
    async fn test_batch_subscribe_frames_by_size() {
        let queue_name = unique("orders");
        let producer = MemoryProducer::new(MemoryConfig::new(&queue_name)).unwrap();
        producer.connect().await.unwrap();
        for n in 0..6 {
            producer
                .publish(Payload::from(n as i64), PublishOptions::default())
                .await
                .unwrap();
        }

        let consumer = MemoryConsumer::new(MemoryConfig::new(&queue_name)).unwrap();
        consumer.connect().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        consumer
            .subscribe_batch(
                crate::consumer::batch_handler_fn(move |deliveries: Vec<Delivery>| {
                    let tx = tx.clone();
                    async move {
                        tx.send(deliveries.len()).unwrap();
                        Ok(())
                    }
                }),
                SubscribeOptions::new().with_batch(3, Duration::from_millis(50)),
            )
            .await
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, 3);
        assert_eq!(second, 3);

        consumer.disconnect().await.unwrap();
        drain(&queue_name).await;
    }

    #[tokio::test]
    async fn test_batch_failure_releases_whole_batch() {
        let queue_name = unique("orders");
        let producer = MemoryProducer::new(MemoryConfig::new(&queue_name)).unwrap();
        producer.connect().await.unwrap();
        for n in 0..2 {
            producer
                .publish(Payload::from(n as i64), PublishOptions::default())
                .await
                .unwrap();
        }

        let consumer = MemoryConsumer::new(MemoryConfig::new(&queue_name)).unwrap();
        consumer.connect().await.unwrap();

        let calls = Arc::new(AtomicBool::new(false));
        let seen = calls.clone();
        consumer
            .subscribe_batch(
                crate::consumer::batch_handler_fn(move |_deliveries: Vec<Delivery>| {
                    let first = !seen.swap(true, Ordering::SeqCst);
                    async move {
                        if first {
                            Err(MqError::consume("batch rejected"))
                        } else {
                            Ok(())
                        }
                    }
                }),
                SubscribeOptions::new().with_batch(2, Duration::from_millis(20)),
            )
            .await
            .unwrap();

        // First frame fails and is requeued, second pass drains it
        tokio::time::sleep(Duration::from_millis(200)).await;
        let queue = QueueRegistry::global().get(&queue_name).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.processing_count(), 0);

        consumer.disconnect().await.unwrap();
        drain(&queue_name).await;
    }

    #[tokio::test]
    async fn test_disconnect_stops_loop_promptly() {
        let queue_name = unique("orders");
        let consumer = MemoryConsumer::new(MemoryConfig::new(&queue_name)).unwrap();
        consumer.connect().await.unwrap();
        consumer
            .subscribe(handler_fn(|_| async { Ok(()) }), SubscribeOptions::default())
            .await
            .unwrap();

        consumer.disconnect().await.unwrap();
        assert!(!consumer.is_connected());

        // Loop is gone: a message published now stays put
        let producer = MemoryProducer::new(MemoryConfig::new(&queue_name)).unwrap();
        producer.connect().await.unwrap();
        producer
            .publish(Payload::from("m1"), PublishOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let queue = QueueRegistry::global().get(&queue_name).unwrap();
        assert_eq!(queue.len(), 1);

        drain(&queue_name).await;
    }

    #[tokio::test]
    async fn test_health_check_includes_paused() {
        let queue_name = unique("orders");
        let consumer = MemoryConsumer::new(MemoryConfig::new(&queue_name)).unwrap();
        consumer.connect().await.unwrap();
        consumer.pause().await.unwrap();

        let health = consumer.health_check().await.unwrap();
        assert_eq!(health.details.unwrap()["paused"], true);

        consumer.disconnect().await.unwrap();
        drain(&queue_name).await;
    }

    #[tokio::test]
    async fn test_seek_and_lag_not_implemented() {
        let consumer = MemoryConsumer::new(MemoryConfig::new(unique("orders"))).unwrap();
        assert_eq!(
            consumer
                .seek(crate::types::options::SeekPosition::Beginning)
                .await
                .unwrap_err()
                .code(),
            "NOT_IMPLEMENTED"
        );
        assert_eq!(consumer.lag().await.unwrap_err().code(), "NOT_IMPLEMENTED");
    }

    #[tokio::test]
    async fn test_reconnect_allows_resubscribe() {
        let queue_name = unique("orders");
        let consumer = MemoryConsumer::new(MemoryConfig::new(&queue_name)).unwrap();

        consumer.connect().await.unwrap();
        consumer
            .subscribe(handler_fn(|_| async { Ok(()) }), SubscribeOptions::default())
            .await
            .unwrap();
        consumer.disconnect().await.unwrap();

        consumer.connect().await.unwrap();
        consumer
            .subscribe(handler_fn(|_| async { Ok(()) }), SubscribeOptions::default())
            .await
            .unwrap();
        consumer.disconnect().await.unwrap();

        drain(&queue_name).await;
    }
}
