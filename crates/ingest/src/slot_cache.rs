//! Slot -> block-timestamp cache.
//!
//! The processor is the only writer; other in-process readers share the
//! handle, so the map sits behind a read/write lock. Entries are only added
//! or pruned, never mutated after insertion, and a miss degrades to a zero
//! timestamp downstream.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct CacheInner {
    slots: HashMap<u64, i64>,
    replay_marker: u64,
}

/// Concurrent slot-time cache with a replay boundary marker.
#[derive(Debug, Default)]
pub struct SlotTimeCache {
    inner: RwLock<CacheInner>,
}

impl SlotTimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unix timestamp for the slot, if cached.
    pub fn get(&self, slot: u64) -> Option<i64> {
        self.inner.read().expect("slot cache poisoned").slots.get(&slot).copied()
    }

    pub fn set(&self, slot: u64, ts_sec: i64) {
        self.inner
            .write()
            .expect("slot cache poisoned")
            .slots
            .insert(slot, ts_sec);
    }

    /// Timestamps for every cached slot in `[start_slot, end_slot]`.
    pub fn get_range(&self, start_slot: u64, end_slot: u64) -> BTreeMap<u64, i64> {
        let inner = self.inner.read().expect("slot cache poisoned");
        inner
            .slots
            .iter()
            .filter(|(slot, _)| **slot >= start_slot && **slot <= end_slot)
            .map(|(slot, ts)| (*slot, *ts))
            .collect()
    }

    /// Marks the slot from which updates are being replayed.
    pub fn set_replay_marker(&self, slot: u64) {
        self.inner.write().expect("slot cache poisoned").replay_marker = slot;
    }

    pub fn replay_marker(&self) -> u64 {
        self.inner.read().expect("slot cache poisoned").replay_marker
    }

    /// True when the slot is at or after the replay boundary.
    pub fn is_replay_slot(&self, slot: u64) -> bool {
        let inner = self.inner.read().expect("slot cache poisoned");
        inner.replay_marker > 0 && slot >= inner.replay_marker
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("slot cache poisoned");
        inner.slots.clear();
        inner.replay_marker = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("slot cache poisoned").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry with a slot below `slot`, returning the count.
    pub fn prune_before_slot(&self, slot: u64) -> usize {
        let mut inner = self.inner.write().expect("slot cache poisoned");
        let before = inner.slots.len();
        inner.slots.retain(|cached, _| *cached >= slot);
        before - inner.slots.len()
    }
}
