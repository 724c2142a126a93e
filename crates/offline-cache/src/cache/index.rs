//! Explicit insertion-order index over the keys of one namespace.
//!
//! Eviction must not depend on whatever order a backing store happens to
//! iterate in, so every write is stamped with a monotonic sequence number
//! and the oldest key is always the lowest live sequence.

use std::collections::{BTreeMap, HashMap};

use crate::request::RequestKey;

#[derive(Debug, Default)]
pub(crate) struct OrderedIndex {
    slots: HashMap<RequestKey, u64>,
    order: BTreeMap<u64, RequestKey>,
    next_sequence: u64,
}

impl OrderedIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserve the sequence number for the next write.
    pub(crate) fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Record `key` at `sequence`, dropping any older slot for it.
    /// Overwritten keys move to the back; reads never reorder.
    pub(crate) fn insert(&mut self, key: RequestKey, sequence: u64) {
        if let Some(previous) = self.slots.insert(key.clone(), sequence) {
            self.order.remove(&previous);
        }
        self.order.insert(sequence, key);
        self.next_sequence = self.next_sequence.max(sequence + 1);
    }

    /// Append `key` with a fresh sequence number.
    pub(crate) fn push(&mut self, key: RequestKey) -> u64 {
        let sequence = self.next_sequence();
        self.insert(key, sequence);
        sequence
    }

    pub(crate) fn remove(&mut self, key: &RequestKey) -> bool {
        match self.slots.remove(key) {
            Some(sequence) => {
                self.order.remove(&sequence);
                true
            }
            None => false,
        }
    }

    /// Drop `key` only if its slot is still `sequence`.
    pub(crate) fn remove_if_current(&mut self, key: &RequestKey, sequence: u64) -> bool {
        if self.slots.get(key) == Some(&sequence) {
            self.remove(key)
        } else {
            false
        }
    }

    pub(crate) fn sequence_of(&self, key: &RequestKey) -> Option<u64> {
        self.slots.get(key).copied()
    }

    pub(crate) fn oldest(&self) -> Option<&RequestKey> {
        self.order.values().next()
    }

    pub(crate) fn keys(&self) -> Vec<RequestKey> {
        self.order.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
