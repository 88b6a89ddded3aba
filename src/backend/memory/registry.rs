use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::backend::memory::queue::{InMemoryQueue, QueueLimits};

static GLOBAL: Lazy<QueueRegistry> = Lazy::new(QueueRegistry::new);

/// Per-queue depth snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub size: usize,
    pub processing_count: usize,
}

/// Process-wide name -> queue map
///
/// Producers and consumers created against the same name share the queue
/// instance; queues persist for the process lifetime unless explicitly
/// removed.
pub struct QueueRegistry {
    queues: RwLock<HashMap<String, Arc<InMemoryQueue>>>,
}

impl QueueRegistry {
    fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry every memory adapter resolves through
    pub fn global() -> &'static QueueRegistry {
        &GLOBAL
    }

    /// Look up a queue, creating it with `limits` on first use
    ///
    /// Limits are fixed at creation; later callers share the instance as-is.
    pub fn get_or_create(&self, name: &str, limits: QueueLimits) -> Arc<InMemoryQueue> {
        if let Some(queue) = self.queues.read().get(name) {
            return queue.clone();
        }
        let mut queues = self.queues.write();
        queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryQueue::new(name, limits)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<InMemoryQueue>> {
        self.queues.read().get(name).cloned()
    }

    /// Depth snapshot of every registered queue
    pub fn stats(&self) -> HashMap<String, QueueStats> {
        self.queues
            .read()
            .iter()
            .map(|(name, queue)| {
                (
                    name.clone(),
                    QueueStats {
                        size: queue.len(),
                        processing_count: queue.processing_count(),
                    },
                )
            })
            .collect()
    }

    /// Drop one queue and its contents
    pub fn remove(&self, name: &str) -> bool {
        match self.queues.write().remove(name) {
            Some(queue) => {
                queue.clear();
                true
            }
            None => false,
        }
    }

    /// Empty and remove every queue; tests and admin tooling only
    pub fn clear_all(&self) {
        let mut queues = self.queues.write();
        for queue in queues.values() {
            queue.clear();
        }
        queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::Headers;
    use crate::types::payload::Payload;

    // Tests share the registry through fresh instances to stay independent
    // of the process-wide one
    fn registry() -> QueueRegistry {
        QueueRegistry::new()
    }

    #[test]
    fn test_same_name_shares_instance() {
        let registry = registry();
        let a = registry.get_or_create("orders", QueueLimits::default());
        let b = registry.get_or_create("orders", QueueLimits::default());

        a.enqueue(Payload::from("hello"), None, Headers::new());
        assert_eq!(b.len(), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_stats_snapshot() {
        let registry = registry();
        let orders = registry.get_or_create("orders", QueueLimits::default());
        registry.get_or_create("billing", QueueLimits::default());

        orders.enqueue(Payload::from("a"), None, Headers::new());
        orders.enqueue(Payload::from("b"), None, Headers::new());
        orders.dequeue();

        let stats = registry.stats();
        assert_eq!(
            stats["orders"],
            QueueStats {
                size: 1,
                processing_count: 1
            }
        );
        assert_eq!(
            stats["billing"],
            QueueStats {
                size: 0,
                processing_count: 0
            }
        );
    }

    #[test]
    fn test_clear_all_removes_entries() {
        let registry = registry();
        registry.get_or_create("orders", QueueLimits::default());
        registry.clear_all();
        assert!(registry.get("orders").is_none());
        assert!(registry.stats().is_empty());
    }

    #[test]
    fn test_remove_single_queue() {
        let registry = registry();
        registry.get_or_create("orders", QueueLimits::default());

        assert!(registry.remove("orders"));
        assert!(!registry.remove("orders"));
    }
}
