//! In-process cache backed by `DashMap`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{CacheStore, Records};

#[derive(Debug, Clone)]
struct CacheEntry {
    records: Records,
    expires_at: Instant,
}

/// Thread-safe in-memory [`CacheStore`]. Expired entries are dropped lazily
/// on lookup.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until next lookup.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes `key`, returning whether it was present.
    pub fn forget(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn live_entry(&self, key: &str) -> Option<Records> {
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > Instant::now() {
                return Some(entry.records.clone());
            }
        }
        // the read guard must be gone before `remove` locks the same shard
        trace!(key, "dropping expired cache entry");
        self.entries.remove(key);
        None
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn has(&self, key: &str) -> bool {
        self.live_entry(key).is_some()
    }

    async fn get(&self, key: &str) -> Option<Records> {
        self.live_entry(key)
    }

    async fn put(&self, key: &str, records: Records, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .insert(key.to_string(), CacheEntry { records, expires_at });
    }
}
