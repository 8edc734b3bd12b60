//! Bounded least-recently-used memory tier.
//!
//! Entries are ranked by a monotonically increasing access tick. Inserting
//! past either the byte or the entry limit evicts the lowest ticks first,
//! so eviction order depends only on the sequence of calls.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use bytes::Bytes;

struct Entry {
    data: Bytes,
    tick: u64,
}

pub(crate) struct LruMemory<K> {
    entries: HashMap<K, Entry>,
    order: BTreeMap<u64, K>,
    next_tick: u64,
    used_bytes: usize,
    max_bytes: usize,
    max_entries: usize,
}

impl<K: Clone + Eq + Hash> LruMemory<K> {
    pub(crate) fn new(max_bytes: usize, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_tick: 0,
            used_bytes: 0,
            max_bytes,
            max_entries: max_entries.max(1),
        }
    }

    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Look up and mark as most recently used.
    pub(crate) fn get(&mut self, key: &K) -> Option<Bytes> {
        let tick = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key.clone());
        Some(entry.data.clone())
    }

    /// Insert or replace. Values larger than the whole byte budget are not
    /// kept; any previous entry for the key is dropped instead.
    pub(crate) fn insert(&mut self, key: K, data: Bytes) {
        self.remove(&key);
        if data.len() > self.max_bytes {
            return;
        }
        while self.used_bytes + data.len() > self.max_bytes || self.entries.len() >= self.max_entries {
            if !self.evict_oldest() {
                break;
            }
        }
        let tick = self.bump();
        self.used_bytes += data.len();
        self.order.insert(tick, key.clone());
        self.entries.insert(key, Entry { data, tick });
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<Bytes> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        self.used_bytes -= entry.data.len();
        Some(entry.data)
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, key)) => {
                if let Some(entry) = self.entries.remove(&key) {
                    self.used_bytes -= entry.data.len();
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.used_bytes = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }
}
