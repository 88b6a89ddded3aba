use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::{ErrorKind, MqError, MqResult};

/// Built-in transient failure signatures, matched case-insensitively
/// against the full cause chain when no custom patterns are configured
const TRANSIENT_PATTERNS: &[&str] = &[
    "econnrefused",
    "connection refused",
    "econnreset",
    "connection reset",
    "etimedout",
    "timeout",
    "timed out",
    "enotfound",
    "eai_again",
    "socket hang up",
    "rate limit",
    "too many requests",
    "429",
    "throttl",
    "service unavailable",
    "temporarily unavailable",
];

/// Snapshot passed to the `on_retry` callback before each backoff sleep
///
/// `attempt` is the attempt about to run after the sleep, not the one that
/// just failed; a 4-attempt run observes the sequence 2, 3, 4.
#[derive(Debug)]
pub struct RetryContext<'a> {
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub last_error: &'a MqError,
}

pub type OnRetry = Arc<dyn Fn(&RetryContext<'_>) + Send + Sync>;

/// Bounded-attempt executor with configurable backoff
pub struct RetryExecutor {
    config: RetryConfig,
    on_retry: Option<OnRetry>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            on_retry: None,
        }
    }

    /// Observe upcoming retries, e.g. for logging or test assertions
    pub fn with_on_retry(mut self, on_retry: OnRetry) -> Self {
        self.on_retry = Some(on_retry);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` up to `max_retries + 1` times
    ///
    /// The token aborts both in-flight backoff sleeps and upcoming attempts
    /// with a `CANCELLED` error; the final failure after exhaustion is the
    /// operation's own last error.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> MqResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MqResult<T>>,
    {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(MqError::cancelled("operation aborted before attempt"));
            }

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= max_attempts || !self.is_retryable(&err) {
                return Err(err);
            }

            let delay = self
                .config
                .strategy
                .delay_for_attempt(attempt, &self.config);
            debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after backoff"
            );

            if let Some(on_retry) = &self.on_retry {
                on_retry(&RetryContext {
                    attempt: attempt + 1,
                    max_attempts,
                    delay_ms: delay.as_millis() as u64,
                    last_error: &err,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(MqError::cancelled("operation aborted during backoff sleep"));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    /// Retryability predicate
    ///
    /// Circuit-open, cancellation, and caller-fault kinds never loop.
    /// Custom patterns, when configured, are the only signal. Otherwise the
    /// error's own flag wins; a wrapped SDK cause with a built-in transient
    /// signature rescues an operation whose flag was pinned false.
    fn is_retryable(&self, err: &MqError) -> bool {
        if matches!(
            err.kind(),
            ErrorKind::CircuitOpen
                | ErrorKind::Cancelled
                | ErrorKind::Serialization
                | ErrorKind::SchemaValidation
                | ErrorKind::Configuration
                | ErrorKind::NotImplemented
        ) {
            return false;
        }
        let text = cause_chain_text(err);
        if !self.config.retryable_errors.is_empty() {
            return matches_any(&text, self.config.retryable_errors.iter().map(String::as_str));
        }
        if err.retryable() {
            return true;
        }
        err.source().is_some() && matches_any(&text, TRANSIENT_PATTERNS.iter().copied())
    }
}

fn matches_any<'a>(text: &str, mut patterns: impl Iterator<Item = &'a str>) -> bool {
    patterns.any(|p| text.contains(&p.to_lowercase()))
}

fn cause_chain_text(err: &MqError) -> String {
    let mut text = err.to_string().to_lowercase();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push('\n');
        text.push_str(&cause.to_string().to_lowercase());
        source = cause.source();
    }
    text
}
