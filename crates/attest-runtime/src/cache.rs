//! Provenance text cache.
//!
//! Evidence chunks are immutable once indexed, so resolved texts are cached
//! by chunk id across runs. Empty texts from failed lookups are never cached.

use moka::future::Cache;
use std::time::Duration;

use crate::config::CacheConfig;

/// Bounded, TTL-expiring cache of evidence texts keyed by chunk id.
#[derive(Clone)]
pub struct ProvenanceCache {
    cache: Cache<String, String>,
}

impl ProvenanceCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    pub async fn get(&self, chunk_id: &str) -> Option<String> {
        self.cache.get(chunk_id).await
    }

    /// Store a resolved text. Empty texts are ignored.
    pub async fn insert(&self, chunk_id: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        self.cache.insert(chunk_id.to_string(), text.to_string()).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ProvenanceCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl std::fmt::Debug for ProvenanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvenanceCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
