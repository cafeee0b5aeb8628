//! Index implementation
//!
//! BTreeMap keyed by the serialized key bytes.

use std::collections::BTreeMap;

use super::IndexEntry;

/// In-memory view of the log
#[derive(Debug)]
pub struct Index<V> {
    entries: BTreeMap<Vec<u8>, V>,
}

impl<V> Index<V> {
    /// Create a new empty Index
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.entries.get(key)
    }

    /// Insert or overwrite, returning the previous value
    pub fn put(&mut self, key: Vec<u8>, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    /// Remove a key, returning its value if it was live
    pub fn delete(&mut self, key: &[u8]) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Apply one record's effect
    pub fn replay(&mut self, key: Vec<u8>, entry: IndexEntry<V>) {
        match entry {
            IndexEntry::Value(value) => {
                self.entries.insert(key, value);
            }
            IndexEntry::Tombstone => {
                self.entries.remove(&key);
            }
        }
    }

    /// Live entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &V)> {
        self.entries.iter().map(|(key, value)| (key.as_slice(), value))
    }
}

impl<V> Default for Index<V> {
    fn default() -> Self {
        Self::new()
    }
}
