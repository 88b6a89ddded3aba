use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a producer/consumer health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub connected: bool,

    /// Probe round-trip time where the backend was actually reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    /// Backend-specific diagnostics (queue depth, paused flag, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn healthy(connected: bool) -> Self {
        Self {
            healthy: true,
            connected,
            latency_ms: None,
            details: None,
            error: None,
        }
    }

    pub fn unhealthy(connected: bool, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            connected,
            latency_ms: None,
            details: None,
            error: Some(error.into()),
        }
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape_omits_empty_fields() {
        let status = HealthStatus::healthy(true);
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["healthy"], true);
        assert_eq!(json["connected"], true);
        assert!(json.get("latency_ms").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_unhealthy_carries_error() {
        let status = HealthStatus::unhealthy(false, "broker unreachable").with_latency_ms(12);
        assert!(!status.healthy);
        assert_eq!(status.error.as_deref(), Some("broker unreachable"));
        assert_eq!(status.latency_ms, Some(12));
    }
}
