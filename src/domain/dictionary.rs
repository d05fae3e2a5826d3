//! Insertion-ordered key-value lookup.
//!
//! [`Dictionary`] backs both registries: it maps each key to the publisher
//! or store created for it and remembers the order in which keys were
//! first inserted. It carries no publish/subscribe logic of its own.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Generic key→value map iterated in insertion order.
///
/// Overwriting an existing key keeps its original position. Iterators
/// borrow the dictionary, so they reflect the state at the moment they
/// were created and are always finite.
#[derive(Debug, Clone)]
pub struct Dictionary<K, V> {
    /// Key → insertion sequence number.
    index: HashMap<K, u64>,
    /// Insertion sequence number → entry.
    entries: BTreeMap<u64, (K, V)>,
    next_seq: u64,
}

impl<K, V> Dictionary<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Returns the value stored for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let seq = self.index.get(key)?;
        self.entries.get(seq).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value stored for `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let seq = self.index.get(key)?;
        self.entries.get_mut(seq).map(|(_, v)| v)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        if let Some(slot) = self.get_mut(&key) {
            return Some(std::mem::replace(slot, value));
        }
        let seq = self.allocate_seq();
        self.index.insert(key.clone(), seq);
        self.entries.insert(seq, (key, value));
        None
    }

    /// Returns the value for `key`, inserting the result of `make` first if
    /// the key is absent. `make` runs at most once and only on insertion.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let seq = match self.index.get(&key) {
            Some(seq) => *seq,
            None => {
                let seq = self.allocate_seq();
                self.index.insert(key.clone(), seq);
                seq
            }
        };
        &mut self.entries.entry(seq).or_insert_with(|| (key, make())).1
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn has(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Removes `key`, returning its value.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let seq = self.index.remove(key)?;
        self.entries.remove(&seq).map(|(_, v)| v)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.values().map(|(k, _)| k)
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.entries.values().map(|(_, v)| v)
    }

    /// `(key, value)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.entries.values().map(|(k, v)| (k, v))
    }

    /// Calls `visit(value, key)` once for every entry, in insertion order.
    pub fn for_each(&self, mut visit: impl FnMut(&V, &K)) {
        for (k, v) in self.entries.values() {
            visit(v, k);
        }
    }

    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

impl<K, V> Default for Dictionary<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
