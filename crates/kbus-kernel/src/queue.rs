//! Per-endpoint delivery queue.

use std::collections::VecDeque;

use crate::message::QueuedMessage;

/// FIFO of message copies waiting to be read by one endpoint.
#[derive(Debug)]
pub struct EndpointQueue {
    entries: VecDeque<QueuedMessage>,
    capacity: usize,
}

impl EndpointQueue {
    /// An empty queue holding at most `capacity` copies.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append a copy.  The caller checks [`EndpointQueue::room`] first.
    pub fn push(&mut self, copy: QueuedMessage) {
        self.entries.push_back(copy);
    }

    /// Remove and return the oldest copy.
    pub fn pop(&mut self) -> Option<QueuedMessage> {
        self.entries.pop_front()
    }

    /// Framed byte length of the oldest copy, or 0 when empty.
    pub fn peek_length(&self) -> usize {
        self.entries.front().map_or(0, QueuedMessage::wire_len)
    }

    /// How many more copies fit.
    pub fn room(&self) -> usize {
        self.capacity.saturating_sub(self.entries.len())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pop every queued copy in order.
    pub fn drain(&mut self) -> impl Iterator<Item = QueuedMessage> + '_ {
        self.entries.drain(..)
    }
}
