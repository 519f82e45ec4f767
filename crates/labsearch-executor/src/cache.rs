//! Compiled-plan caching.
//!
//! Provides an LRU cache with TTL expiration for [`CompiledQuery`] plans,
//! keyed by the serialized search. Thread-safe using `Mutex` for LRU operations.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use labsearch::{OrderSpec, SearchInstance};
use lru::LruCache;

use crate::config::CacheConfig;
use crate::query::CompiledQuery;

/// A cached plan with expiration tracking.
#[derive(Debug, Clone)]
struct CacheEntry {
    plan: Arc<CompiledQuery>,
    created_at: Instant,
}

impl CacheEntry {
    fn new(plan: Arc<CompiledQuery>) -> Self {
        Self {
            plan,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Thread-safe LRU cache with TTL expiration for compiled plans.
///
/// # Features
///
/// - **LRU Eviction**: When the cache is full, the least recently used entry is evicted.
/// - **TTL Expiration**: Entries expire after the configured time-to-live.
/// - **Thread-Safe**: Uses `Mutex` for safe concurrent access.
///
/// Plans are shared as `Arc<CompiledQuery>`; a hit never recompiles.
pub struct PlanCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl PlanCache {
    /// Creates a cache from its configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_capacity(config.max_entries, config.ttl)
    }

    /// Creates a cache with custom capacity and TTL.
    pub fn with_capacity(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Gets a cached plan; expired entries are removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Arc<CompiledQuery>> {
        let mut cache = self.inner.lock().ok()?;

        if let Some(entry) = cache.get(key) {
            if entry.is_expired(self.ttl) {
                cache.pop(key);
                return None;
            }
            return Some(Arc::clone(&entry.plan));
        }

        None
    }

    /// Stores a plan, evicting the least recently used one when full.
    pub fn set(&self, key: String, plan: Arc<CompiledQuery>) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(key, CacheEntry::new(plan));
        }
    }

    /// Number of entries, possibly including expired ones.
    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(cache) => cache.len(),
            _ => 0,
        }
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all entries from the cache.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.clear();
        }
    }

    /// Removes expired entries.
    pub fn cleanup_expired(&self) {
        if let Ok(mut cache) = self.inner.lock() {
            let ttl = self.ttl;
            let expired_keys: Vec<String> = cache
                .iter()
                .filter(|(_, entry)| entry.is_expired(ttl))
                .map(|(key, _)| key.clone())
                .collect();

            for key in expired_keys {
                cache.pop(&key);
            }
        }
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        match self.inner.lock() {
            Ok(cache) => {
                let total = cache.len();
                let expired = cache
                    .iter()
                    .filter(|(_, entry)| entry.is_expired(self.ttl))
                    .count();

                CacheStats {
                    total_entries: total,
                    expired_entries: expired,
                    valid_entries: total.saturating_sub(expired),
                }
            }
            _ => CacheStats::default(),
        }
    }
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("PlanCache")
            .field("entries", &stats.total_entries)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Statistics about the cache state.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of entries in the cache.
    pub total_entries: usize,
    /// Number of expired entries (not yet cleaned up).
    pub expired_entries: usize,
    /// Number of valid (non-expired) entries.
    pub valid_entries: usize,
}

/// Builds the cache key for a search and its ordering.
///
/// Returns `None` when the search cannot be serialized; such searches are
/// simply not cached.
pub fn plan_cache_key(instance: &SearchInstance, order: Option<&OrderSpec>) -> Option<String> {
    let mut key = serde_json::to_string(instance).ok()?;
    if let Some(order) = order {
        key.push_str("|order:");
        key.push_str(&order.to_string());
    }
    Some(key)
}
