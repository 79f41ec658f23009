//! Fixed-capacity least-recently-used map
//!
//! Recency is a monotonically increasing tick per key; the ordered tick index
//! gives the LRU victim in O(log n).

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

pub struct LruMap<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    tick: u64,
}

impl<K: Hash + Eq + Clone, V> LruMap<K, V> {
    /// Capacity is at least one
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
        }
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

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up and mark as most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let next = self.next_tick();
        let (_, tick) = self.entries.get_mut(key)?;
        self.order.remove(tick);
        *tick = next;
        self.order.insert(next, key.clone());
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Insert or replace, marking the key most recently used
    ///
    /// Returns the evicted entry when a new key pushed the map past capacity.
    /// Replacing an existing key never evicts.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let next = self.next_tick();

        if let Some((stored, tick)) = self.entries.get_mut(&key) {
            *stored = value;
            self.order.remove(tick);
            *tick = next;
            self.order.insert(next, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        self.order.insert(next, key.clone());
        self.entries.insert(key, (value, next));
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (value, tick) = self.entries.remove(key)?;
        self.order.remove(&tick);
        Some(value)
    }

    fn pop_lru(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let (value, _) = self.entries.remove(&key)?;
        Some((key, value))
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
