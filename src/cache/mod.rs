//! Cache seam for API result sets.
//!
//! [`CacheStore`] is the contract the API layer depends on; [`MemoryCache`]
//! is the in-process default.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use memory::MemoryCache;

/// A cached result set: records in the order they were accumulated.
pub type Records = Vec<Value>;

/// Key/value store for result sets with per-entry TTL.
///
/// Stores that can fail (network caches) should treat failures as misses and
/// log them; callers never see cache errors.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// True when `key` holds an unexpired entry.
    async fn has(&self, key: &str) -> bool;

    /// Returns the unexpired entry under `key`.
    async fn get(&self, key: &str) -> Option<Records>;

    /// Stores `records` under `key` for `ttl`.
    async fn put(&self, key: &str, records: Records, ttl: Duration);

    /// Returns the entry under `key`, or stores and returns `produce()`.
    ///
    /// Not single-flight: two callers missing at the same time both run
    /// `produce` and the later `put` wins.
    async fn remember(
        &self,
        key: &str,
        ttl: Duration,
        produce: Box<dyn FnOnce() -> Records + Send + 'async_trait>,
    ) -> Records {
        if let Some(records) = self.get(key).await {
            return records;
        }
        let records = produce();
        self.put(key, records.clone(), ttl).await;
        records
    }
}
