//! FIFO buffer for inbound channel messages.
//!
//! Messages are applied strictly in arrival order: appended at the tail on
//! receipt, removed at the head one at a time by the single consuming task.
//! The queue is unbounded; enqueue never blocks and never drops. Depth is
//! logged so a host can watch for runaway growth.

use std::collections::VecDeque;

use log::debug;

/// A message received from the chat channel, not yet processed.
///
/// Arrival order is implicit in the queue position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Stable identity of the sending peer.
    pub sender: String,
    /// Raw payload text, classified and decoded at processing time.
    pub body: String,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
        }
    }
}

/// Ordered command buffer with strict first-in-first-out discipline.
#[derive(Debug, Default)]
pub struct CommandQueue {
    queue: VecDeque<InboundMessage>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Append at the tail. O(1), never blocks, never drops.
    pub fn enqueue(&mut self, msg: InboundMessage) {
        self.queue.push_back(msg);
        debug!("command queue has {} items", self.queue.len());
    }

    /// Remove and return the oldest message, if any. O(1).
    pub fn dequeue_front(&mut self) -> Option<InboundMessage> {
        self.queue.pop_front()
    }

    /// Drop every queued message from `peer`, returning how many were
    /// discarded. Used when a session stops so stale edits from that peer
    /// are never applied later.
    pub fn discard_from(&mut self, peer: &str) -> usize {
        let before = self.queue.len();
        self.queue.retain(|m| m.sender != peer);
        before - self.queue.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
