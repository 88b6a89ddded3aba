use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::types::ids::MessageId;
use crate::types::message::{HeaderValue, Headers};
use crate::types::payload::Payload;

/// Death-record headers added when a message is forwarded to a DLQ
pub const HEADER_ORIGINAL_QUEUE: &str = "x-original-queue";
pub const HEADER_DEATH_REASON: &str = "x-death-reason";
pub const HEADER_DEATH_TIME: &str = "x-death-time";
pub const HEADER_DELIVERY_ATTEMPTS: &str = "x-delivery-attempts";

/// Capacity and age limits for a queue
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueLimits {
    /// Drop the oldest ready message once the queue would exceed this
    pub max_messages: Option<usize>,

    /// Lazily evict ready messages older than this on enqueue/dequeue
    pub max_age: Option<Duration>,
}

/// A message held by an in-memory queue
///
/// Lifecycle state is positional: ready messages sit in the FIFO sequence,
/// dequeued-but-unsettled messages in the in-flight map, and settled
/// messages are gone.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: MessageId,
    pub body: Payload,
    pub key: Option<String>,
    pub headers: Headers,
    pub timestamp: chrono::DateTime<Utc>,

    /// 1-based once dequeued; increments on every dequeue of this message
    pub delivery_attempt: u32,
}

struct QueueState {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<MessageId, StoredMessage>,
}

/// FIFO queue with in-flight tracking — the reference backend's ground truth
///
/// All mutations are serialized behind one lock; producers and consumers on
/// any thread share instances through the registry.
pub struct InMemoryQueue {
    name: String,
    limits: QueueLimits,
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>, limits: QueueLimits) -> Self {
        Self {
            name: name.into(),
            limits,
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                in_flight: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a message, enforcing capacity and age limits
    pub fn enqueue(&self, body: Payload, key: Option<String>, headers: Headers) -> MessageId {
        let id = MessageId::new();
        let mut state = self.state.lock();
        Self::evict_aged(&mut state.ready, self.limits.max_age);

        state.ready.push_back(StoredMessage {
            id: id.clone(),
            body,
            key,
            headers,
            timestamp: Utc::now(),
            delivery_attempt: 0,
        });

        if let Some(max) = self.limits.max_messages {
            while state.ready.len() > max {
                if let Some(dropped) = state.ready.pop_front() {
                    debug!(queue = %self.name, id = %dropped.id, "dropped oldest message on overflow");
                }
            }
        }

        id
    }

    /// Remove the head, count the delivery, and track it in flight
    pub fn dequeue(&self) -> Option<StoredMessage> {
        let mut state = self.state.lock();
        Self::evict_aged(&mut state.ready, self.limits.max_age);

        let mut message = state.ready.pop_front()?;
        message.delivery_attempt += 1;
        state.in_flight.insert(message.id.clone(), message.clone());
        Some(message)
    }

    /// Iterated dequeue, stopping at empty
    pub fn dequeue_batch(&self, n: usize) -> Vec<StoredMessage> {
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            match self.dequeue() {
                Some(message) => batch.push(message),
                None => break,
            }
        }
        batch
    }

    /// Settle an in-flight message; false when it was not in flight
    pub fn ack(&self, id: &MessageId) -> bool {
        self.state.lock().in_flight.remove(id).is_some()
    }

    /// Reject an in-flight message; with `requeue` it becomes
    /// next-to-dequeue, otherwise it is discarded
    pub fn nack(&self, id: &MessageId, requeue: bool) -> bool {
        let mut state = self.state.lock();
        match state.in_flight.remove(id) {
            Some(message) => {
                if requeue {
                    state.ready.push_front(message);
                }
                true
            }
            None => false,
        }
    }

    /// Forward an in-flight message to `dlq` with death-record headers
    pub fn dead_letter(&self, id: &MessageId, dlq: &InMemoryQueue, reason: Option<&str>) -> bool {
        let message = match self.state.lock().in_flight.remove(id) {
            Some(message) => message,
            None => return false,
        };

        let mut headers = message.headers;
        headers.insert(
            HEADER_ORIGINAL_QUEUE.to_string(),
            HeaderValue::from(self.name.clone()),
        );
        headers.insert(
            HEADER_DEATH_REASON.to_string(),
            HeaderValue::from(reason.unwrap_or("max retries exceeded")),
        );
        headers.insert(
            HEADER_DEATH_TIME.to_string(),
            HeaderValue::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        headers.insert(
            HEADER_DELIVERY_ATTEMPTS.to_string(),
            HeaderValue::from(message.delivery_attempt.to_string()),
        );

        debug!(queue = %self.name, dlq = %dlq.name(), id = %message.id, "dead-lettering message");
        dlq.enqueue(message.body, message.key, headers);
        true
    }

    /// Drop every ready and in-flight message
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.ready.clear();
        state.in_flight.clear();
    }

    /// Ready messages waiting to be dequeued
    pub fn len(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().ready.is_empty()
    }

    /// Dequeued-but-unsettled messages
    pub fn processing_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    fn evict_aged(ready: &mut VecDeque<StoredMessage>, max_age: Option<Duration>) {
        let Some(max_age) = max_age else { return };
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return;
        };
        let cutoff = Utc::now() - max_age;
        ready.retain(|message| message.timestamp >= cutoff);
    }
}
