//! Query cache shared between the sync bridge and the views reading from it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Opaque token scoping a set of fetched rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Storage for fetched rows, keyed by [`CacheKey`].
///
/// Implementations provide their own internal consistency; the bridge only
/// ever goes through these three calls.
pub trait QueryCache<R>: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Vec<R>>;

    fn set(&self, key: &CacheKey, rows: Vec<R>);

    /// Marks the entry stale. Rows stay readable until the next `set`.
    fn invalidate(&self, key: &CacheKey);
}

/// A cached row set together with its freshness.
#[derive(Debug, Clone)]
pub struct CacheEntry<R> {
    pub rows: Vec<R>,
    pub stale: bool,
    pub updated_at: DateTime<Utc>,
}

/// In-process [`QueryCache`].
#[derive(Debug)]
pub struct MemoryCache<R> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<R>>>,
}

impl<R: Clone> MemoryCache<R> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry<R>> {
        self.read().get(key).cloned()
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.read().get(key).map(|e| e.stale).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry<R>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry<R>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<R: Clone> Default for MemoryCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone + Send + Sync> QueryCache<R> for MemoryCache<R> {
    fn get(&self, key: &CacheKey) -> Option<Vec<R>> {
        self.read().get(key).map(|e| e.rows.clone())
    }

    fn set(&self, key: &CacheKey, rows: Vec<R>) {
        self.write().insert(
            key.clone(),
            CacheEntry {
                rows,
                stale: false,
                updated_at: Utc::now(),
            },
        );
    }

    fn invalidate(&self, key: &CacheKey) {
        if let Some(entry) = self.write().get_mut(key) {
            entry.stale = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key() {
        let cache: MemoryCache<u32> = MemoryCache::new();
        assert!(cache.get(&CacheKey::new("beds")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("beds");
        cache.set(&key, vec![1, 2, 3]);

        assert_eq!(cache.get(&key), Some(vec![1, 2, 3]));
        assert!(!cache.is_stale(&key));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_keeps_rows() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("beds");
        cache.set(&key, vec!["ward-a"]);
        cache.invalidate(&key);

        assert!(cache.is_stale(&key));
        assert_eq!(cache.get(&key), Some(vec!["ward-a"]));

        cache.set(&key, vec!["ward-b"]);
        assert!(!cache.is_stale(&key));
        assert_eq!(cache.entry(&key).unwrap().rows, vec!["ward-b"]);
    }

    #[test]
    fn test_invalidate_unknown_key_is_noop() {
        let cache: MemoryCache<u8> = MemoryCache::new();
        cache.invalidate(&CacheKey::new("nothing"));
        assert!(cache.is_empty());
    }
}
