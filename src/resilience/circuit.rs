use std::collections::VecDeque;
use std::future::Future;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{MqError, MqResult};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Calls flow through; failures accumulate in the rolling window
    Closed,

    /// Calls fail fast until the reset timeout elapses
    Open,

    /// Probe calls flow through; enough successes close the circuit,
    /// any failure reopens it
    HalfOpen,
}

impl CircuitState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

/// Consistent snapshot of breaker counters
#[derive(Debug, Clone)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub window_failures: usize,
    pub half_open_successes: u32,
    pub last_failure_at: Option<Instant>,
    pub total_requests: u64,
    pub total_failures: u64,
}

struct BreakerState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    half_open_successes: u32,
    last_failure_at: Option<Instant>,
    total_requests: u64,
    total_failures: u64,
}

/// Three-state circuit breaker with a rolling failure window
///
/// One breaker per adapter instance; state is never shared across
/// producer/consumer pairs.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                half_open_successes: 0,
                last_failure_at: None,
                total_requests: 0,
                total_failures: 0,
            }),
        }
    }

    /// Run `op` under breaker supervision
    ///
    /// When disabled, delegates unconditionally. When open and the reset
    /// timeout has not elapsed, fails fast with `CIRCUIT_OPEN` without
    /// invoking `op`.
    pub async fn execute<T, F, Fut>(&self, op: F) -> MqResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MqResult<T>>,
    {
        if !self.config.enabled {
            return op().await;
        }

        self.before_call()?;

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err)
            }
        }
    }

    /// Force the circuit closed and clear all window state
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failures.clear();
        inner.half_open_successes = 0;
        inner.last_failure_at = None;
    }

    /// Force the circuit open as if a failure just occurred
    pub fn trip(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.last_failure_at = Some(Instant::now());
        inner.half_open_successes = 0;
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn metrics(&self) -> CircuitMetrics {
        let inner = self.inner.lock();
        CircuitMetrics {
            state: inner.state,
            window_failures: inner.failures.len(),
            half_open_successes: inner.half_open_successes,
            last_failure_at: inner.last_failure_at,
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
        }
    }

    fn before_call(&self) -> MqResult<()> {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.reset_timeout);
                if elapsed >= self.config.reset_timeout {
                    debug!("circuit breaker probing: open -> half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    Ok(())
                } else {
                    Err(MqError::circuit_open(format!(
                        "circuit open, retry after {:?}",
                        self.config.reset_timeout - elapsed
                    )))
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                debug!("circuit breaker recovered: half-open -> closed");
                inner.state = CircuitState::Closed;
                inner.failures.clear();
                inner.half_open_successes = 0;
            }
        }
    }

    fn on_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.last_failure_at = Some(now);

        match inner.state {
            CircuitState::Closed => {
                inner.failures.push_back(now);
                let window = self.config.failure_window;
                while let Some(oldest) = inner.failures.front() {
                    if now.duration_since(*oldest) > window {
                        inner.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if inner.failures.len() >= self.config.failure_threshold as usize {
                    warn!(
                        failures = inner.failures.len(),
                        "circuit breaker tripped: closed -> open"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                debug!("circuit breaker probe failed: -> open");
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
            }
        }
    }
}
