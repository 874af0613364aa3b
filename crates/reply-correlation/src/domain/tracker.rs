//! Bounded record of recently resolved correlation keys.
//!
//! Keys land here once their wait has been matched, timed out or
//! interrupted. The monitor consults it to recognise late or duplicate
//! replies. When full, the oldest key is evicted first.

use crate::domain::key::CorrelationKey;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

/// Default number of keys remembered.
pub const DEFAULT_RECENTLY_RESOLVED_CAPACITY: usize = 50_000;

#[derive(Debug, Default)]
struct TrackerState {
    order: VecDeque<CorrelationKey>,
    members: HashSet<CorrelationKey>,
}

/// FIFO-bounded set of resolved keys.
#[derive(Debug)]
pub struct RecentlyResolvedTracker {
    state: Mutex<TrackerState>,
    capacity: usize,
}

impl RecentlyResolvedTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(TrackerState {
                order: VecDeque::with_capacity(capacity.min(1024)),
                members: HashSet::new(),
            }),
            capacity,
        }
    }

    /// Remember `key`, evicting the oldest entry if the tracker is full.
    ///
    /// Recording a key already present is a no-op. Returns the evicted key.
    pub fn record(&self, key: CorrelationKey) -> Option<CorrelationKey> {
        let mut state = self.state.lock();
        if state.members.contains(&key) {
            return None;
        }

        let evicted = if state.order.len() >= self.capacity {
            let oldest = state.order.pop_front();
            if let Some(oldest) = &oldest {
                state.members.remove(oldest);
            }
            oldest
        } else {
            None
        };

        state.members.insert(key.clone());
        state.order.push_back(key);
        evicted
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.state.lock().members.contains(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The key next in line for eviction.
    pub fn oldest(&self) -> Option<CorrelationKey> {
        self.state.lock().order.front().cloned()
    }
}

impl Default for RecentlyResolvedTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RECENTLY_RESOLVED_CAPACITY)
    }
}
