//! Per-key serialization
//!
//! Events for the same `(origin, record_id)` run one at a time in submission
//! order. Only the head of each key's lane is handed to the worker pool; later
//! events for a busy key wait in their lane, not in a worker, so other keys
//! always find a free worker.

use hms_common::SourceIdentity;
use std::collections::{HashMap, VecDeque};

pub type SequenceKey = (SourceIdentity, String);

/// What to do with a newly admitted item
#[derive(Debug, PartialEq)]
pub enum Admission<T> {
    /// Key was idle: hand the item to the pool now
    Dispatch(T),
    /// Key is busy: the item waits behind it
    Parked,
}

/// Bounded set of per-key FIFO lanes.
///
/// `waiting` counts admitted items no worker has started yet, whether they sit
/// in the pool's queue or in a lane. That count is what the capacity bounds.
#[derive(Debug)]
pub struct KeySequencer<T> {
    lanes: HashMap<SequenceKey, VecDeque<T>>,
    waiting: usize,
    capacity: usize,
}

impl<T> KeySequencer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: HashMap::new(),
            waiting: 0,
            capacity: capacity.max(1),
        }
    }

    /// Admit `item` for `key`; `None` when the capacity is used up
    pub fn admit(&mut self, key: SequenceKey, item: T) -> Option<Admission<T>> {
        if self.waiting >= self.capacity {
            return None;
        }
        self.waiting += 1;
        match self.lanes.get_mut(&key) {
            Some(lane) => {
                lane.push_back(item);
                Some(Admission::Parked)
            }
            None => {
                self.lanes.insert(key, VecDeque::new());
                Some(Admission::Dispatch(item))
            }
        }
    }

    /// A worker picked a dispatched item off the pool queue
    pub fn started(&mut self) {
        self.waiting = self.waiting.saturating_sub(1);
    }

    /// The running item for `key` finished; returns the next one to run
    /// for that key (already counted as started), or frees the key
    pub fn finished(&mut self, key: &SequenceKey) -> Option<T> {
        let next = self.lanes.get_mut(key).and_then(VecDeque::pop_front);
        match next {
            Some(item) => {
                self.waiting = self.waiting.saturating_sub(1);
                Some(item)
            }
            None => {
                self.lanes.remove(key);
                None
            }
        }
    }

    /// Admitted items not yet started
    pub fn depth(&self) -> usize {
        self.waiting
    }

    #[cfg(test)]
    pub(crate) fn active_keys(&self) -> usize {
        self.lanes.len()
    }
}
