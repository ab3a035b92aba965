//! Response cache.
//!
//! Remote responses are cached under a content-addressed key (see [`key`])
//! so repeated runs over the same companies skip the model call entirely.
//!
//! # Freshness
//!
//! Every entry carries its own TTL, fixed when it is written. An entry is
//! fresh iff `now - created_at < ttl`. Expiry is lazy: [`CacheStore::get`]
//! treats a stale entry exactly like a missing one but never deletes it.
//! Stale entries stay on disk until [`CacheStore::clear_expired`] or
//! [`CacheStore::clear_all`] runs.
//!
//! # Backends
//!
//! - [`FileCache`]: one JSON file per key; survives process restarts.
//!   This is what the CLI uses.
//! - [`MemoryCache`]: moka-backed, process-local. Same freshness rules.
//!
//! Both read time through a [`Clock`](crate::clock::Clock), so expiry can
//! be tested without sleeping.

pub mod file;
pub mod key;
pub mod memory;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

pub use file::FileCache;
pub use key::cache_key;
pub use memory::MemoryCache;

/// Default entry lifetime: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Cached result of one remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPayload {
    pub text: String,
    /// Tokens the original call consumed. Informational; hits are never
    /// charged again.
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl CachedPayload {
    pub fn new(text: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            text: text.into(),
            input_tokens,
            output_tokens,
        }
    }
}

/// One stored entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: CachedPayload,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "ttl_secs", with = "ttl_secs")]
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(
        key: impl Into<String>,
        payload: CachedPayload,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at,
            ttl,
        }
    }

    /// Whether the entry may still be served at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now.signed_duration_since(self.created_at) < ttl,
            // TTL too large to represent: never expires.
            Err(_) => true,
        }
    }
}

/// Durable key → entry store with per-entry expiry.
///
/// Implementations must be safe to share across concurrently running tasks.
/// `put` is last-write-wins; entries for different keys never interfere.
pub trait CacheStore: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Look up a fresh entry.
    ///
    /// Returns `None` both when no entry exists and when it has expired.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store (or overwrite) an entry created now.
    fn put(&self, key: &str, payload: CachedPayload, ttl: Duration) -> Result<()>;

    /// Remove every entry. Returns the number removed.
    fn clear_all(&self) -> Result<usize>;

    /// Remove only stale entries. Returns the number removed.
    fn clear_expired(&self) -> Result<usize>;

    /// Number of stored entries, stale ones included.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

mod ttl_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_fresh_before_ttl() {
        let created = Utc::now();
        let entry = CacheEntry::new("k", CachedPayload::new("t", 1, 2), created, DEFAULT_TTL);
        assert!(entry.is_fresh(created));
        assert!(entry.is_fresh(created + chrono::Duration::hours(23)));
    }

    #[test]
    fn entry_stale_at_exactly_ttl() {
        let created = Utc::now();
        let entry = CacheEntry::new(
            "k",
            CachedPayload::new("t", 0, 0),
            created,
            Duration::from_secs(60),
        );
        assert!(!entry.is_fresh(created + chrono::Duration::seconds(60)));
        assert!(!entry.is_fresh(created + chrono::Duration::days(2)));
    }

    #[test]
    fn entry_serializes_ttl_as_seconds() {
        let entry = CacheEntry::new(
            "k",
            CachedPayload::new("t", 0, 0),
            Utc::now(),
            Duration::from_secs(3600),
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["ttl_secs"], 3600);
        let back: CacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.ttl, Duration::from_secs(3600));
    }
}
