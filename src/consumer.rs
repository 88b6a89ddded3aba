use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::{MqError, MqResult};
use crate::types::events::ConsumerEvent;
use crate::types::health::HealthStatus;
use crate::types::message::Delivery;
use crate::types::options::{SeekPosition, SubscribeOptions};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Per-message consumer callback
///
/// A clean return with auto-ack on acknowledges the delivery; an error is
/// never propagated to the subscriber — the adapter emits an `error` event
/// and routes the message through the failure policy (requeue or DLQ).
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: Delivery) -> MqResult<()>;
}

/// Batch consumer callback
///
/// An error releases every message of the batch; individual acks are not
/// attempted.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, deliveries: Vec<Delivery>) -> MqResult<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync,
    Fut: Future<Output = MqResult<()>> + Send,
{
    async fn handle(&self, delivery: Delivery) -> MqResult<()> {
        (self.0)(delivery).await
    }
}

struct FnBatchHandler<F>(F);

#[async_trait]
impl<F, Fut> BatchHandler for FnBatchHandler<F>
where
    F: Fn(Vec<Delivery>) -> Fut + Send + Sync,
    Fut: Future<Output = MqResult<()>> + Send,
{
    async fn handle(&self, deliveries: Vec<Delivery>) -> MqResult<()> {
        (self.0)(deliveries).await
    }
}

/// Wrap an async closure as a message handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MqResult<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Wrap an async closure as a batch handler
pub fn batch_handler_fn<F, Fut>(f: F) -> Arc<dyn BatchHandler>
where
    F: Fn(Vec<Delivery>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MqResult<()>> + Send + 'static,
{
    Arc::new(FnBatchHandler(f))
}

/// Universal consumer contract
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Open the transport and assert declared topology; idempotent
    async fn connect(&self) -> MqResult<()>;

    /// Stop the delivery loop (within one fetch cycle), release unhandled
    /// messages, and close; idempotent
    async fn disconnect(&self) -> MqResult<()>;

    fn is_connected(&self) -> bool;

    /// Start a delivery loop dispatching single messages to `handler`
    async fn subscribe(
        &self,
        handler: Arc<dyn MessageHandler>,
        options: SubscribeOptions,
    ) -> MqResult<()>;

    /// Start a delivery loop dispatching batches bounded by `batch_size`
    /// and `batch_timeout`, whichever triggers first
    async fn subscribe_batch(
        &self,
        handler: Arc<dyn BatchHandler>,
        options: SubscribeOptions,
    ) -> MqResult<()>;

    /// Stop dispatching after the current handler call returns; messages
    /// the transport already delivered are released back to the broker,
    /// never buffered in memory
    async fn pause(&self) -> MqResult<()>;

    /// Re-enable dispatch; messages released during pause may redeliver
    async fn resume(&self) -> MqResult<()>;

    fn is_paused(&self) -> bool;

    /// Reposition the consumer cursor where the backend supports it
    async fn seek(&self, _position: SeekPosition) -> MqResult<()> {
        Err(MqError::not_implemented("seek"))
    }

    /// Consumer lag where the backend exposes it
    async fn lag(&self) -> MqResult<u64> {
        Err(MqError::not_implemented("lag"))
    }

    /// Probe the backend; details include the paused flag
    async fn health_check(&self) -> MqResult<HealthStatus>;

    /// Lifecycle events: error, backpressure, rebalancing, rebalanced,
    /// crash, message
    fn event_stream(&self) -> BoxStream<ConsumerEvent>;
}
