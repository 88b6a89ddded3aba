use async_trait::async_trait;

use crate::error::MqResult;
use crate::types::health::HealthStatus;
use crate::types::ids::MessageId;
use crate::types::options::{OutgoingMessage, PublishOptions};
use crate::types::payload::Payload;

/// Universal producer contract
///
/// Implementations route every publish through the resilience layer
/// (circuit breaker wrapping retry) and ignore publish options their broker
/// does not support.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Open the transport and assert declared topology; idempotent
    async fn connect(&self) -> MqResult<()>;

    /// Flush pending sends where supported and close; idempotent, must not
    /// fail on double-disconnect
    async fn disconnect(&self) -> MqResult<()>;

    fn is_connected(&self) -> bool;

    /// Publish one message, returning a broker-assigned or synthesized ID
    async fn publish(&self, body: Payload, options: PublishOptions) -> MqResult<MessageId>;

    /// Publish several messages, preserving input order in the returned IDs
    ///
    /// Backends without per-entry results aggregate individual failures
    /// into a single publish error; backends with per-entry results log
    /// failures and return the successful IDs in original order.
    async fn publish_batch(&self, messages: Vec<OutgoingMessage>) -> MqResult<Vec<MessageId>>;

    /// Ensure buffered messages reach the broker; no-op by default
    async fn flush(&self) -> MqResult<()> {
        Ok(())
    }

    /// Probe the backend (e.g. topic/exchange existence)
    async fn health_check(&self) -> MqResult<HealthStatus>;
}
