pub mod consumer;
pub mod producer;
pub mod queue;
pub mod registry;

use std::time::Duration;

use crate::config::BaseConfig;

pub use consumer::MemoryConsumer;
pub use producer::MemoryProducer;
pub use queue::{InMemoryQueue, QueueLimits, StoredMessage};
pub use registry::{QueueRegistry, QueueStats};

/// Configuration for the in-memory backend
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub base: BaseConfig,

    /// Queue name resolved through the process-wide registry
    pub queue: String,

    /// Capacity limit; the oldest ready message is dropped on overflow
    pub max_messages: Option<usize>,

    /// Age limit; ready messages older than this are lazily evicted
    pub max_age: Option<Duration>,
}

impl MemoryConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            base: BaseConfig::default(),
            queue: queue.into(),
            max_messages: None,
            max_age: None,
        }
    }

    pub fn with_base(mut self, base: BaseConfig) -> Self {
        self.base = base;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub(crate) fn limits(&self) -> QueueLimits {
        QueueLimits {
            max_messages: self.max_messages,
            max_age: self.max_age,
        }
    }
}
