//! ---
//! rhome_section: "02-messaging"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Line protocol codec, message variants and queues."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Unbounded FIFO of encoded lines backed by a mutex protected deque.
///
/// Clones share the same storage, so a transport and the dispatch loop can
/// each hold a handle. Neither operation blocks waiting for data.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl MessageQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line to the back of the queue.
    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().push_back(line.into());
    }

    /// Pop the oldest line, or `None` when nothing is queued.
    pub fn try_pop(&self) -> Option<String> {
        self.lines.lock().pop_front()
    }

    /// Number of queued lines.
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Remove and return every queued line in FIFO order.
    pub fn drain(&self) -> Vec<String> {
        self.lines.lock().drain(..).collect()
    }
}
