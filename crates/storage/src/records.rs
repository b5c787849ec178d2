//! Record-existence cache
//!
//! A set of opaque record identifiers the caller has already confirmed to
//! exist in storage. Purely advisory: a miss never means the record is
//! absent, and the engine never consults it. Cleared wholesale whenever the
//! database's structural state is reset.

use std::collections::HashSet;

/// Advisory existence cache keyed by opaque record identifiers.
///
/// No internal locking; the owning [`Database`](crate::Database) serializes
/// access.
#[derive(Debug, Default)]
pub struct RecordCache {
    keys: HashSet<String>,
}

impl RecordCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is known to exist.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Mark `key` as known to exist.
    pub fn insert(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }

    /// Forget `key`.
    pub fn remove(&mut self, key: &str) {
        self.keys.remove(key);
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
