//! Inbound message queue
//!
//! Messages arrive from the push channel at any time; they are queued here
//! and applied in arrival order at the next frame.

use crate::message::LiveMessage;
use siege_core::Millis;
use std::collections::VecDeque;

/// A queued message
#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntry {
    /// Wall time when the message was received
    pub received_at: Millis,
    pub message: LiveMessage,
}

/// Bounded FIFO of received messages
#[derive(Debug)]
pub struct Inbox {
    /// Pending messages (oldest first)
    entries: VecDeque<InboxEntry>,
    capacity: usize,
}

impl Inbox {
    /// Create a new inbox with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Queue a message
    ///
    /// Returns `Err` if the inbox is full.
    pub fn push(&mut self, received_at: Millis, message: LiveMessage) -> crate::Result<()> {
        if self.is_full() {
            return Err(crate::Error::InboxFull);
        }
        self.entries.push_back(InboxEntry {
            received_at,
            message,
        });
        Ok(())
    }

    /// Take every queued message, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = InboxEntry> + '_ {
        self.entries.drain(..)
    }

    /// Receive time of the oldest waiting message
    pub fn oldest_received_at(&self) -> Option<Millis> {
        self.entries.front().map(|e| e.received_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
