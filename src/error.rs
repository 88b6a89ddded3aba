use std::error::Error as StdError;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Result type for messaging operations
pub type MqResult<T> = Result<T, MqError>;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error categories with stable codes and default retryability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure during connect, publish, or receive
    Connection,

    /// Encode or decode failure
    Serialization,

    /// Broker rejected or timed out a send
    Publish,

    /// Broker returned an error during receive
    Consume,

    /// Circuit breaker refused the call without invoking the backend
    CircuitOpen,

    /// Invalid configuration
    Configuration,

    /// Operation exceeded its deadline
    Timeout,

    /// Schema-typed serializer rejected the payload
    SchemaValidation,

    /// Optional operation on a backend that lacks it
    NotImplemented,

    /// Operation aborted through a cancellation token
    Cancelled,
}

impl ErrorKind {
    /// Stable machine-readable error code
    pub fn code(self) -> &'static str {
        match self {
            Self::Connection => "CONNECTION_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::Publish => "PUBLISH_ERROR",
            Self::Consume => "CONSUME_ERROR",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::SchemaValidation => "SCHEMA_VALIDATION_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether errors of this kind are retried by default
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Publish | Self::Consume | Self::Timeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Base error type for all messaging failures
///
/// Carries a stable `code`, a `retryable` flag the retry engine consults,
/// the original cause where one existed, and optional structured details.
#[derive(Error, Debug)]
#[error("{}: {message}", .kind.code())]
pub struct MqError {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    #[source]
    source: Option<BoxError>,
    details: Option<Value>,
}

impl MqError {
    /// Create an error of the given kind with its default retryability
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.default_retryable(),
            source: None,
            details: None,
        }
    }

    /// Transport failure during connect, publish, or receive
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Encode or decode failure
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    /// Broker rejected or timed out a send
    pub fn publish(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Publish, message)
    }

    /// Broker returned an error during receive
    pub fn consume(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Consume, message)
    }

    /// Circuit breaker refused the call
    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircuitOpen, message)
    }

    /// Invalid configuration
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Operation exceeded its deadline
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Schema-typed serializer rejected the payload
    pub fn schema_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaValidation, message)
    }

    /// Optional operation on a backend that lacks it
    pub fn not_implemented(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        Self::new(
            ErrorKind::NotImplemented,
            format!("operation not supported by this backend: {operation}"),
        )
    }

    /// Operation aborted through a cancellation token
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Wrap an arbitrary caught error, preserving it as the cause
    ///
    /// Always succeeds; non-`MqError` values become a base error of the
    /// given kind with the original attached as `source`.
    pub fn from_caught<E>(kind: ErrorKind, err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::new(kind, err.to_string()).with_source(err)
    }

    /// Attach the underlying cause
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach structured details for operators
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Override the retryability flag (e.g. a non-retryable publish rejection)
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the retry engine may re-attempt the failed operation
    pub fn retryable(&self) -> bool {
        self.retryable
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }
}

impl From<serde_json::Error> for MqError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_caught(ErrorKind::Serialization, err)
    }
}
