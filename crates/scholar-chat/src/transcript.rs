//! Transcript store
//!
//! The ordered list of messages. Every mutation replaces a whole message,
//! looked up by id, under the write lock, so concurrent updaters of different
//! messages never lose each other's changes.

use parking_lot::RwLock;

use crate::types::{Message, MessageId};

#[derive(Debug, Default)]
pub struct TranscriptStore {
    messages: RwLock<Vec<Message>>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, message: Message) -> MessageId {
        let id = message.id;
        self.messages.write().push(message);
        id
    }

    /// Replace the message `id` with `updater(current)`. Returns the new value,
    /// or `None` (and does nothing) if no such message exists.
    pub fn update_by_id<F>(&self, id: MessageId, updater: F) -> Option<Message>
    where
        F: FnOnce(&Message) -> Message,
    {
        let mut messages = self.messages.write();
        let slot = messages.iter_mut().find(|m| m.id == id)?;
        let mut next = updater(slot);
        // Identity and body kind are fixed at creation.
        next.id = slot.id;
        next.sender = slot.sender;
        if next.is_record_list() != slot.is_record_list() {
            tracing::warn!(message_id = %id, "Ignoring update that changes message body kind");
            return Some(slot.clone());
        }
        *slot = next.clone();
        Some(next)
    }

    pub fn find_by_id(&self, id: MessageId) -> Option<Message> {
        self.messages.read().iter().find(|m| m.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// True iff any message is mid-stream.
    pub fn is_streaming(&self) -> bool {
        self.messages.read().iter().any(|m| m.streaming)
    }

    /// Settle every message in place. Returns the ids that changed.
    pub fn settle_all(&self) -> Vec<MessageId> {
        let mut messages = self.messages.write();
        let mut changed = Vec::new();
        for message in messages.iter_mut() {
            if !message.is_settled() {
                *message = message.settled();
                changed.push(message.id);
            }
        }
        changed
    }

    pub fn reset(&self) {
        self.messages.write().clear();
    }
}
