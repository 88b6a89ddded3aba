use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MqError, MqResult};
use crate::resilience::backoff::BackoffStrategy;

/// Base configuration shared by every producer and consumer adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Client identifier reported to the broker and used in logs
    pub client_id: Option<String>,

    /// Retry behavior for publish/consume operations
    pub retry: RetryConfig,

    /// Circuit breaker wrapped around broker calls
    pub circuit_breaker: CircuitBreakerConfig,

    /// Dead-letter routing for messages that exhaust their delivery budget
    pub dead_letter_queue: DeadLetterConfig,

    /// Adapter-side logging switches
    pub logging: LoggingConfig,

    /// Deadline for establishing the transport connection
    #[serde(with = "duration_ms")]
    pub connection_timeout: Duration,

    /// Deadline for individual broker requests
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            dead_letter_queue: DeadLetterConfig::default(),
            logging: LoggingConfig::default(),
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_dead_letter_queue(mut self, dead_letter_queue: DeadLetterConfig) -> Self {
        self.dead_letter_queue = dead_letter_queue;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validate the whole tree; adapters call this once at construction
    pub fn validate(&self) -> MqResult<()> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.dead_letter_queue.validate()?;
        Ok(())
    }
}

/// Retry behavior for operations routed through the resilience layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,

    /// Delay before the second attempt, in milliseconds
    pub initial_delay_ms: u64,

    /// Upper bound on any computed delay, in milliseconds
    pub max_delay_ms: u64,

    /// Growth factor (exponential) or step size in ms (linear)
    pub multiplier: f64,

    /// Randomize each delay by a uniform factor in [0.75, 1.25]
    pub jitter: bool,

    /// Delay curve across attempts
    pub strategy: BackoffStrategy,

    /// Case-insensitive substrings that mark an error message retryable;
    /// when non-empty this list replaces the built-in transient patterns
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: true,
            strategy: BackoffStrategy::Exponential,
            retryable_errors: Vec::new(),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay_ms(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, delay_ms: u64) -> Self {
        self.max_delay_ms = delay_ms;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_retryable_errors(mut self, patterns: Vec<String>) -> Self {
        self.retryable_errors = patterns;
        self
    }

    pub fn validate(&self) -> MqResult<()> {
        if self.multiplier <= 0.0 {
            return Err(MqError::configuration(format!(
                "retry.multiplier must be positive, got {}",
                self.multiplier
            )));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(MqError::configuration(format!(
                "retry.max_delay_ms ({}) is below retry.initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        Ok(())
    }
}

/// Three-state circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When false, execute delegates straight to the wrapped operation
    pub enabled: bool,

    /// Failures inside the rolling window that open the circuit
    pub failure_threshold: u32,

    /// Rolling window over which failures are counted
    #[serde(with = "duration_ms")]
    pub failure_window: Duration,

    /// Time an open circuit waits before probing with half-open calls
    #[serde(with = "duration_ms")]
    pub reset_timeout: Duration,

    /// Consecutive half-open successes required to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: 5,
            failure_window: Duration::from_millis(60_000),
            reset_timeout: Duration::from_millis(30_000),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn validate(&self) -> MqResult<()> {
        if self.enabled && self.failure_threshold == 0 {
            return Err(MqError::configuration(
                "circuit_breaker.failure_threshold must be at least 1",
            ));
        }
        if self.enabled && self.success_threshold == 0 {
            return Err(MqError::configuration(
                "circuit_breaker.success_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Dead-letter routing for messages that exhaust their delivery budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    pub enabled: bool,

    /// Destination queue/topic name for dead-lettered messages
    pub destination: Option<String>,

    /// Deliveries allowed before a failing message is dead-lettered
    pub max_delivery_attempts: u32,

    /// Record the triggering error message in the death headers
    pub include_error: bool,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: None,
            max_delivery_attempts: 3,
            include_error: true,
        }
    }
}

impl DeadLetterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, destination: impl Into<String>) -> Self {
        self.enabled = true;
        self.destination = Some(destination.into());
        self
    }

    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = attempts;
        self
    }

    pub fn without_error_header(mut self) -> Self {
        self.include_error = false;
        self
    }

    pub fn validate(&self) -> MqResult<()> {
        if self.enabled && self.destination.is_none() {
            return Err(MqError::configuration(
                "dead_letter_queue.destination is required when the DLQ is enabled",
            ));
        }
        if self.enabled && self.max_delivery_attempts == 0 {
            return Err(MqError::configuration(
                "dead_letter_queue.max_delivery_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Adapter-side logging switches
///
/// Emission goes through `tracing`; `enabled = false` silences the adapter's
/// own log lines regardless of the host subscriber, which is the no-op
/// logger of the portable contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(de)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = BaseConfig::default();

        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert_eq!(config.retry.max_delay_ms, 10_000);
        assert_eq!(config.retry.multiplier, 2.0);
        assert!(config.retry.jitter);

        assert!(!config.circuit_breaker.enabled);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.failure_window, Duration::from_secs(60));
        assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_secs(30));
        assert_eq!(config.circuit_breaker.success_threshold, 2);

        assert!(!config.dead_letter_queue.enabled);
        assert_eq!(config.dead_letter_queue.max_delivery_attempts, 3);
        assert!(config.dead_letter_queue.include_error);

        assert!(config.logging.enabled);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_validate_rejects_dlq_without_destination() {
        let mut config = BaseConfig::default();
        config.dead_letter_queue.enabled = true;

        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_validate_rejects_zero_multiplier() {
        let config = BaseConfig::default().with_retry(RetryConfig::new().with_multiplier(0.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_thresholds_when_enabled() {
        let config = BaseConfig::default().with_circuit_breaker(
            CircuitBreakerConfig::new().enabled().with_failure_threshold(0),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = BaseConfig::default()
            .with_client_id("orders-service")
            .with_dead_letter_queue(DeadLetterConfig::new().enabled("orders-dlq"));

        let json = serde_json::to_string(&config).unwrap();
        let back: BaseConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.client_id.as_deref(), Some("orders-service"));
        assert_eq!(back.dead_letter_queue.destination.as_deref(), Some("orders-dlq"));
        assert_eq!(back.connection_timeout, Duration::from_secs(10));
    }
}
