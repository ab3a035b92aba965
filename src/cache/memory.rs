//! In-memory cache store backed by moka.
//!
//! moka's own TTL is cache-wide, so it is not used here: entries carry their
//! own TTL and expire lazily under the same rules as [`FileCache`](super::FileCache).
//! The capacity bound still applies (LRU eviction).

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use super::{CacheEntry, CacheStore, CachedPayload};
use crate::Result;
use crate::clock::{Clock, SystemClock};

/// Default maximum number of entries.
const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Process-local cache store.
pub struct MemoryCache {
    entries: Cache<String, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    /// Create an empty cache with the default capacity and system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty cache reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES, clock)
    }

    /// Create an empty cache with a custom capacity.
    pub fn with_capacity(max_entries: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Cache::new(max_entries),
            clock,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = self.clock.now();
        Ok(self.entries.get(key).filter(|entry| entry.is_fresh(now)))
    }

    fn put(&self, key: &str, payload: CachedPayload, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(key, payload, self.clock.now(), ttl);
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn clear_all(&self) -> Result<usize> {
        let keys: Vec<Arc<String>> = self.entries.iter().map(|(k, _)| k).collect();
        for key in &keys {
            self.entries.invalidate(key.as_str());
        }
        Ok(keys.len())
    }

    fn clear_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let stale: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(k, _)| k)
            .collect();
        for key in &stale {
            self.entries.invalidate(key.as_str());
        }
        Ok(stale.len())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.iter().count())
    }
}
