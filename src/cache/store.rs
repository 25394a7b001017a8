//! Fixed-capacity, least-recently-used result store
//!
//! Holds no lock of its own and knows nothing about TTLs; the coordinator
//! wraps it in a mutex and applies freshness on read.

use lru::LruCache;
use std::num::NonZeroUsize;

/// Key → value store that evicts the least recently used key when full
pub struct ResultCache<V> {
    entries: LruCache<String, V>,
}

impl<V> ResultCache<V> {
    /// Create a store holding at most `capacity` keys (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Look up a key, marking it recently used
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    /// Mutable lookup, marking the key recently used
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    /// Look up a key without touching eviction order
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries.peek(key)
    }

    /// Insert or replace a value, marking the key recently used
    ///
    /// Returns the entry evicted to make room, if any.
    pub fn put(&mut self, key: impl Into<String>, value: V) -> Option<(String, V)> {
        let key = key.into();
        self.entries
            .push(key.clone(), value)
            .filter(|(old_key, _)| *old_key != key)
    }

    /// Keys, most recently used first
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Iterate without touching eviction order, most recently used first
    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
