use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MqError;

/// Supported broker backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Memory,
    RedisStreams,
    #[serde(rename = "rabbitmq")]
    RabbitMq,
    Sqs,
    Sns,
    #[serde(rename = "pubsub")]
    PubSub,
    Kafka,
    Jetstream,
    AzureServiceBus,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::RedisStreams => "redis-streams",
            Self::RabbitMq => "rabbitmq",
            Self::Sqs => "sqs",
            Self::Sns => "sns",
            Self::PubSub => "pubsub",
            Self::Kafka => "kafka",
            Self::Jetstream => "jetstream",
            Self::AzureServiceBus => "azure-service-bus",
        }
    }

    /// Feature matrix each adapter for this backend must realize
    pub fn capabilities(self) -> BrokerCapabilities {
        match self {
            Self::Memory => BrokerCapabilities {
                ordering_key: false,
                consumer_groups: false,
                extend_deadline: false,
                native_dead_letter: false,
                delivery_attempt_signal: true,
                seek: false,
                lag: false,
                delayed_delivery: false,
                per_entry_batch_results: true,
            },
            Self::RedisStreams => BrokerCapabilities {
                ordering_key: false,
                consumer_groups: true,
                extend_deadline: false,
                native_dead_letter: false,
                delivery_attempt_signal: true,
                seek: false,
                lag: true,
                delayed_delivery: false,
                per_entry_batch_results: true,
            },
            Self::RabbitMq => BrokerCapabilities {
                ordering_key: false,
                consumer_groups: false,
                extend_deadline: false,
                native_dead_letter: true,
                delivery_attempt_signal: true,
                seek: false,
                lag: false,
                delayed_delivery: false,
                per_entry_batch_results: true,
            },
            Self::Sqs => BrokerCapabilities {
                ordering_key: true,
                consumer_groups: false,
                extend_deadline: true,
                native_dead_letter: true,
                delivery_attempt_signal: true,
                seek: false,
                lag: true,
                delayed_delivery: true,
                per_entry_batch_results: true,
            },
            Self::Sns => BrokerCapabilities {
                ordering_key: true,
                consumer_groups: false,
                extend_deadline: true,
                native_dead_letter: false,
                delivery_attempt_signal: true,
                seek: false,
                lag: false,
                delayed_delivery: false,
                per_entry_batch_results: true,
            },
            Self::PubSub => BrokerCapabilities {
                ordering_key: true,
                consumer_groups: false,
                extend_deadline: true,
                native_dead_letter: true,
                delivery_attempt_signal: true,
                seek: true,
                lag: false,
                delayed_delivery: false,
                per_entry_batch_results: false,
            },
            Self::Kafka => BrokerCapabilities {
                ordering_key: true,
                consumer_groups: true,
                extend_deadline: false,
                native_dead_letter: false,
                delivery_attempt_signal: false,
                seek: true,
                lag: true,
                delayed_delivery: false,
                per_entry_batch_results: false,
            },
            Self::Jetstream => BrokerCapabilities {
                ordering_key: false,
                consumer_groups: true,
                extend_deadline: true,
                native_dead_letter: true,
                delivery_attempt_signal: true,
                seek: true,
                lag: true,
                delayed_delivery: true,
                per_entry_batch_results: true,
            },
            Self::AzureServiceBus => BrokerCapabilities {
                ordering_key: true,
                consumer_groups: false,
                extend_deadline: true,
                native_dead_letter: true,
                delivery_attempt_signal: true,
                seek: false,
                lag: false,
                delayed_delivery: true,
                per_entry_batch_results: false,
            },
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = MqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "redis-streams" => Ok(Self::RedisStreams),
            "rabbitmq" => Ok(Self::RabbitMq),
            "sqs" => Ok(Self::Sqs),
            "sns" => Ok(Self::Sns),
            "pubsub" => Ok(Self::PubSub),
            "kafka" => Ok(Self::Kafka),
            "jetstream" => Ok(Self::Jetstream),
            "azure-service-bus" => Ok(Self::AzureServiceBus),
            other => Err(MqError::configuration(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// Explicit feature detection for a backend
///
/// Adapters consult this instead of probing the SDK: an unsupported
/// operation fails with `NOT_IMPLEMENTED` up front rather than surfacing a
/// broker-specific error mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerCapabilities {
    /// Messages sharing a key are processed in publish order
    pub ordering_key: bool,

    /// Consumers sharing a group load-balance deliveries
    pub consumer_groups: bool,

    /// Lock/visibility window can be lengthened mid-flight
    pub extend_deadline: bool,

    /// Broker-managed dead-letter destination
    pub native_dead_letter: bool,

    /// Broker reports a per-delivery attempt count (Kafka does not)
    pub delivery_attempt_signal: bool,

    /// Consumer can reposition to an offset/sequence
    pub seek: bool,

    /// Consumer lag is observable
    pub lag: bool,

    /// Publish-time delay before the message becomes visible
    pub delayed_delivery: bool,

    /// Batch publish reports per-entry outcomes instead of all-or-nothing
    pub per_entry_batch_results: bool,
}
