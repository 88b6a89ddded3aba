use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::BaseConfig;
use crate::error::{MqError, MqResult};
use crate::resilience::{CircuitBreaker, RetryExecutor};
use crate::serializer::SerializerRegistry;

/// Shared runtime every concrete adapter embeds
///
/// Composes the validated configuration, the retry executor, the circuit
/// breaker, the serializer registry, and the connection/cancellation state.
/// One core per producer or consumer instance; resilience state is never
/// shared between instances.
pub struct AdapterCore {
    config: BaseConfig,
    retry: RetryExecutor,
    breaker: CircuitBreaker,
    serializers: SerializerRegistry,
    cancel: RwLock<CancellationToken>,
    connected: AtomicBool,
}

impl AdapterCore {
    /// Validate the configuration and build the resilience stack
    pub fn new(config: BaseConfig) -> MqResult<Self> {
        config.validate()?;
        Ok(Self {
            retry: RetryExecutor::new(config.retry.clone()),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            serializers: SerializerRegistry::new(),
            cancel: RwLock::new(CancellationToken::new()),
            connected: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &BaseConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    /// Whether adapter-side log lines should be emitted
    pub fn log_enabled(&self) -> bool {
        self.config.logging.enabled
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Mark connected and install a fresh cancellation token for the session
    pub fn mark_connected(&self) {
        *self.cancel.write() = CancellationToken::new();
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Mark disconnected and cancel everything bound to the session token
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.read().cancel();
    }

    /// Token bound to the current connect/disconnect session
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.read().clone()
    }

    /// Route an operation through the resilience stack: the circuit breaker
    /// wraps the retried operation, so one exhausted retry sequence counts
    /// as one breaker failure
    pub async fn execute_with_resilience<T, F, Fut>(&self, op: F) -> MqResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MqResult<T>>,
    {
        let cancel = self.cancellation();
        self.breaker
            .execute(|| self.retry.execute(&cancel, op))
            .await
    }

    /// Bound a connect-phase future by `connection_timeout`
    pub async fn with_connection_timeout<T>(
        &self,
        fut: impl Future<Output = MqResult<T>>,
    ) -> MqResult<T> {
        match tokio::time::timeout(self.config.connection_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(MqError::timeout(format!(
                "connect exceeded {:?}",
                self.config.connection_timeout
            ))),
        }
    }

    /// Bound a request-phase future by `request_timeout`
    pub async fn with_request_timeout<T>(
        &self,
        fut: impl Future<Output = MqResult<T>>,
    ) -> MqResult<T> {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(MqError::timeout(format!(
                "request exceeded {:?}",
                self.config.request_timeout
            ))),
        }
    }
}
