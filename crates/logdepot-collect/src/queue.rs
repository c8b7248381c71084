//! Single-flight work queue
//!
//! Messages are keyed by (class, instance, method, server guid, zone).
//! While a message for a key is still ready or being worked, a second put
//! for the same key is refused and the caller is told which message is
//! already in flight. The check and the insert happen under one lock, so
//! two concurrent requests for the same server can never both enqueue.

use std::collections::{BTreeMap, HashMap};

use logdepot_core::{MessageId, MessageState, MessageTemplate, QueueKey, QueueMessage};
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a single-flight put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A new message was created
    Enqueued(MessageId),
    /// A non-terminal message for the same key already exists
    Skipped(MessageId),
}

impl DispatchOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, DispatchOutcome::Enqueued(_))
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            DispatchOutcome::Enqueued(id) | DispatchOutcome::Skipped(id) => *id,
        }
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    next_id: MessageId,
    messages: BTreeMap<MessageId, QueueMessage>,
    /// Non-terminal message per key
    in_flight: HashMap<QueueKey, MessageId>,
}

/// In-process queue with put-unless-exists semantics
#[derive(Debug, Default)]
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message for `key` unless one is already in flight
    pub fn put_unless_exists(&self, key: QueueKey, template: MessageTemplate) -> DispatchOutcome {
        let mut inner = self.inner.lock();

        if let Some(&existing) = inner.in_flight.get(&key) {
            info!(%key, message_id = existing, "Message already in flight, skipping");
            return DispatchOutcome::Skipped(existing);
        }

        inner.next_id += 1;
        let id = inner.next_id;
        let message = QueueMessage::new(id, key.clone(), template);
        debug!(%key, message_id = id, priority = message.priority, "Message enqueued");
        inner.messages.insert(id, message);
        inner.in_flight.insert(key, id);
        DispatchOutcome::Enqueued(id)
    }

    /// The in-flight message for a key, if any
    pub fn find_in_flight(&self, key: &QueueKey) -> Option<QueueMessage> {
        let inner = self.inner.lock();
        inner
            .in_flight
            .get(key)
            .and_then(|id| inner.messages.get(id))
            .cloned()
    }

    /// Take the next ready message (lowest priority value, then oldest),
    /// optionally restricted to one server, and mark it dequeued
    pub fn dequeue(&self, server_guid: Option<Uuid>) -> Option<QueueMessage> {
        let mut inner = self.inner.lock();
        let id = inner
            .messages
            .values()
            .filter(|m| m.state == MessageState::Ready)
            .filter(|m| server_guid.map_or(true, |g| m.key.server_guid == g))
            .min_by_key(|m| (m.priority, m.id))
            .map(|m| m.id)?;

        let message = inner.messages.get_mut(&id)?;
        message.state = MessageState::Dequeue;
        Some(message.clone())
    }

    /// Move a message to a terminal state, releasing its key and dropping
    /// it from the queue. Returns the finished message.
    pub fn complete(&self, id: MessageId, state: MessageState) -> Option<QueueMessage> {
        debug_assert!(state.is_terminal(), "complete() needs a terminal state");
        let mut inner = self.inner.lock();
        let mut message = inner.messages.remove(&id)?;
        message.state = state;
        if inner.in_flight.get(&message.key) == Some(&id) {
            inner.in_flight.remove(&message.key);
        }
        Some(message)
    }

    /// A message that has not been completed yet
    pub fn get(&self, id: MessageId) -> Option<QueueMessage> {
        self.inner.lock().messages.get(&id).cloned()
    }

    /// Messages not yet in a terminal state
    pub fn pending_count(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}
