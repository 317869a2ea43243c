//! Cross-query cache — process-wide, size-bounded, TTL-driven.
//!
//! `spec.md` §4.2 specifies this cache as supplied by the host ("size-bounded
//! store with byte-accounting entries, forced-eviction threshold percentage,
//! optional stale-eviction period... its consistency is its own
//! responsibility"). [`CrossQueryCache`] is the trait the builtin kernel
//! consults; [`LruCrossQueryCache`] is a reference in-process implementation
//! (used standalone and in tests), grounded in the teacher's
//! `fraiseql_core::cache::result::QueryResultCache` (an `lru::LruCache`
//! behind a `Mutex`, TTL-checked lazily on read).
//!
//! Concurrent reads and writes are serialized by the mutex; the critical
//! section never crosses an await point (insert/lookup are pure in-memory
//! operations), so unrelated backend I/O is never blocked by cache access.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;

use super::config::CrossQueryCacheConfig;
use super::key::CacheKey;

struct Entry {
    payload:    Vec<u8>,
    expires_at: i64, // nanoseconds since epoch, per the host's "current time"
}

/// Surface the builtin kernel consults. In production this is backed by
/// the host engine's own bounded cache; `LruCrossQueryCache` below is the
/// standalone reference implementation.
pub trait CrossQueryCache: Send + Sync {
    /// Returns the payload if present and `now <= expires_at`.
    fn get(&self, key: &CacheKey, now_nanos: i64) -> Option<Vec<u8>>;
    fn put(&self, key: CacheKey, payload: Vec<u8>, expires_at_nanos: i64);
    /// Total hits served since construction, for metrics/tests.
    fn hits(&self) -> u64;
}

pub struct LruCrossQueryCache {
    inner:        Mutex<LruCache<CacheKey, Entry>>,
    config:       CrossQueryCacheConfig,
    bytes_in_use: AtomicU64,
    hits:         AtomicU64,
}

impl LruCrossQueryCache {
    #[must_use]
    pub fn new(config: CrossQueryCacheConfig) -> Self {
        let capacity = std::num::NonZeroUsize::new(config.max_entries.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            config,
            bytes_in_use: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    fn forced_eviction_threshold(&self) -> u64 {
        self.config.max_bytes * u64::from(self.config.forced_eviction_threshold_pct) / 100
    }

    /// Evict least-recently-used entries until under the forced-eviction
    /// threshold. Called while holding `inner`'s lock.
    fn evict_to_threshold(&self, inner: &mut LruCache<CacheKey, Entry>) {
        let threshold = self.forced_eviction_threshold();
        while self.bytes_in_use.load(Ordering::Relaxed) > threshold {
            match inner.pop_lru() {
                Some((_, entry)) => {
                    self.bytes_in_use.fetch_sub(entry.payload.len() as u64, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }
}

impl CrossQueryCache for LruCrossQueryCache {
    fn get(&self, key: &CacheKey, now_nanos: i64) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(entry) if entry.expires_at > now_nanos => {
                let payload = entry.payload.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(payload)
            }
            Some(_) => {
                // Expired: drop it now rather than waiting for the stale
                // sweep so a miss doesn't keep paying for a dead entry.
                if let Some(entry) = inner.pop(key) {
                    self.bytes_in_use.fetch_sub(entry.payload.len() as u64, Ordering::Relaxed);
                }
                None
            }
            None => None,
        }
    }

    fn put(&self, key: CacheKey, payload: Vec<u8>, expires_at_nanos: i64) {
        if self.config.max_entries == 0 {
            return;
        }
        let size = payload.len() as u64;
        let mut inner = self.inner.lock();
        if let Some(old) = inner.put(key, Entry { payload, expires_at: expires_at_nanos }) {
            self.bytes_in_use.fetch_sub(old.payload.len() as u64, Ordering::Relaxed);
        }
        self.bytes_in_use.fetch_add(size, Ordering::Relaxed);
        self.evict_to_threshold(&mut inner);
    }

    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

pub const fn ttl_to_expiry(now_nanos: i64, ttl: Duration) -> i64 {
    now_nanos.saturating_add(ttl.as_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ValueMap};

    fn key(n: &str) -> CacheKey {
        let mut m = ValueMap::new();
        m.insert("k".to_string(), Value::String(n.to_string()));
        CacheKey::from_request(&m)
    }

    #[test]
    fn hit_within_ttl_then_miss_after_expiry() {
        let cache = LruCrossQueryCache::new(CrossQueryCacheConfig::default());
        let k = key("a");
        cache.put(k.clone(), b"payload".to_vec(), 100);

        assert_eq!(cache.get(&k, 50), Some(b"payload".to_vec()));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.get(&k, 150), None);
    }

    #[test]
    fn disabled_cache_never_retains_entries() {
        let cache = LruCrossQueryCache::new(CrossQueryCacheConfig::disabled());
        let k = key("a");
        cache.put(k.clone(), b"x".to_vec(), i64::MAX);
        assert_eq!(cache.get(&k, 0), None);
    }

    #[test]
    fn forced_eviction_respects_byte_budget() {
        let mut config = CrossQueryCacheConfig::default();
        config.max_entries = 100;
        config.max_bytes = 10;
        config.forced_eviction_threshold_pct = 100;
        let cache = LruCrossQueryCache::new(config);

        cache.put(key("a"), vec![0u8; 6], i64::MAX);
        cache.put(key("b"), vec![0u8; 6], i64::MAX);

        // "a" should have been evicted to stay under the 10-byte budget.
        assert_eq!(cache.get(&key("a"), 0), None);
        assert_eq!(cache.get(&key("b"), 0), Some(vec![0u8; 6]));
    }
}
