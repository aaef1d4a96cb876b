// Fixed-capacity ring of the most recent messages of a topic, used for
// catch-up replay when a subscriber joins.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::Message;

/// Bounded FIFO of messages. Insertion order is preserved and the oldest
/// entry is evicted on overflow. The internal lock is never held across an
/// await point; readers get a cloned snapshot.
pub struct RecentCache {
    entries: Mutex<VecDeque<Message>>,
    capacity: usize,
}

impl RecentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn add(&self, message: Message) {
        let mut entries = self.entries.lock().expect("recent cache lock");
        entries.push_back(message);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Up to `k` most recent messages, oldest first.
    pub fn last(&self, k: usize) -> Vec<Message> {
        let entries = self.entries.lock().expect("recent cache lock");
        let skip = entries.len().saturating_sub(k);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("recent cache lock").clear();
    }

    pub fn count(&self) -> usize {
        self.entries.lock().expect("recent cache lock").len()
    }
}
