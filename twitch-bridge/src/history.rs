//! Bounded in-memory history of formatted chat lines.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Default history capacity.
pub const MAX_MESSAGES: usize = 100;

/// A thread-safe FIFO of the most recent chat lines.
///
/// Single mutation point: [`append`](Self::append) evicts exactly the oldest
/// entry when the store would exceed capacity, so `len() <= capacity` holds
/// after every call. Readers get independent copies; later appends never
/// mutate a previously returned window. No persistence — contents are lost
/// on restart.
#[derive(Debug, Clone)]
pub struct RecentMessageStore {
    inner: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Default for RecentMessageStore {
    fn default() -> Self {
        Self::with_capacity(MAX_MESSAGES)
    }
}

impl RecentMessageStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a formatted line, evicting the oldest entry on overflow.
    pub fn append(&self, line: impl Into<String>) {
        let mut messages = self.inner.lock();
        messages.push_back(line.into());
        if messages.len() > self.capacity {
            messages.pop_front();
        }
    }

    /// Up to `n` most recent lines in chronological order (oldest of the
    /// window first). Fewer are returned if the store holds fewer.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let messages = self.inner.lock();
        let skip = messages.len().saturating_sub(n);
        messages.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
