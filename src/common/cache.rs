//! Bounded in-memory memo backed by moka.

use moka::sync::Cache;

/// Thread-safe in-memory memo with configurable capacity.
///
/// Used by the profile to remember the hashes of stored nodes
/// (`MemCache<String, String>`, node uuid to digest), so that hashing a
/// process node does not recompute the whole upstream input graph every time.
/// Entries may be evicted at any time; callers must always be able to
/// recompute a missing value.
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`].
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::new(capacity),
        }
    }

    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }

    pub fn remove(
        &self,
        key: &K,
    ) {
        self.entries.invalidate(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}
