//! # omnimq: Broker-Agnostic Messaging Abstraction
//!
//! One producer/consumer contract over heterogeneous message-queue
//! backends. Business code writes against the [`Producer`] and [`Consumer`]
//! traits and swaps backends through configuration, not rewrites.
//!
//! ## What the core provides
//!
//! - **Contract layer**: the [`Delivery`] envelope with ack/nack/extend
//!   lifecycle, publish/subscribe options, health checks, consumer events,
//!   and a typed error taxonomy with stable codes.
//! - **Resilience middleware**: bounded retry with exponential, linear,
//!   constant, and fibonacci backoff plus jitter, and a three-state circuit
//!   breaker with a rolling failure window. Every backend call is routed
//!   `breaker(retry(op))`.
//! - **Consumer driver**: the poll-loop skeleton with pause/resume under
//!   flight, batch framing, dead-letter routing, and handler-failure
//!   bookkeeping.
//! - **In-memory reference backend**: a FIFO queue with in-flight tracking,
//!   requeue, DLQ forwarding, and capacity/age limits, shared through a
//!   process-wide registry. It defines ground truth for the contract and is
//!   the unit-test target.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use omnimq::prelude::*;
//! use omnimq::backend::memory::{MemoryConfig, MemoryConsumer, MemoryProducer};
//!
//! #[tokio::main]
//! async fn main() -> MqResult<()> {
//!     let producer = MemoryProducer::new(MemoryConfig::new("orders"))?;
//!     producer.connect().await?;
//!     producer
//!         .publish(Payload::object([("order_id", "123")]), PublishOptions::new())
//!         .await?;
//!
//!     let consumer = MemoryConsumer::new(MemoryConfig::new("orders"))?;
//!     consumer.connect().await?;
//!     consumer
//!         .subscribe(
//!             handler_fn(|delivery: Delivery| async move {
//!                 println!("got {:?}", delivery.body);
//!                 Ok(())
//!             }),
//!             SubscribeOptions::default(),
//!         )
//!         .await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!     consumer.disconnect().await?;
//!     producer.disconnect().await
//! }
//! ```
//!
//! Remote-broker adapters (Kafka, RabbitMQ, SQS/SNS, Pub/Sub, Redis
//! Streams, NATS JetStream, Azure Service Bus) implement the same traits
//! over their SDKs; [`Provider::capabilities`] is the compatibility matrix
//! they realize and [`ProviderMetadata`] the envelope fields they populate.

pub mod adapter;
pub mod backend;
pub mod config;
pub mod consumer;
pub mod error;
pub mod producer;
pub mod provider;
pub mod resilience;
pub mod serializer;
pub mod types;

// Core API exports
pub use adapter::AdapterCore;
pub use config::{
    BaseConfig, CircuitBreakerConfig, DeadLetterConfig, LogLevel, LoggingConfig, RetryConfig,
};
pub use consumer::{
    batch_handler_fn, handler_fn, BatchHandler, BoxStream, Consumer, MessageHandler,
};
pub use error::{ErrorKind, MqError, MqResult};
pub use producer::Producer;
pub use provider::{BrokerCapabilities, Provider};
pub use resilience::{
    BackoffStrategy, CircuitBreaker, CircuitMetrics, CircuitState, RetryContext, RetryExecutor,
};
pub use serializer::{JsonSerializer, JsonSerializerOptions, Serializer, SerializerRegistry};
pub use types::{
    ConsumerEvent, Delivery, HeaderValue, Headers, HealthStatus, MessageId, OutgoingMessage,
    Payload, ProviderMetadata, PublishOptions, SeekPosition, SettleAction, Settlement,
    SubscribeOptions,
};

/// Everything a typical caller needs
pub mod prelude {
    pub use crate::{
        batch_handler_fn, handler_fn, BaseConfig, Consumer, ConsumerEvent, DeadLetterConfig,
        Delivery, HealthStatus, MessageId, MqError, MqResult, OutgoingMessage, Payload, Producer,
        Provider, PublishOptions, RetryConfig, SubscribeOptions,
    };

    pub use async_trait::async_trait;
}
