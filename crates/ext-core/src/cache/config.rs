//! Cross-query cache configuration.
//!
//! Mirrors the teacher's `fraiseql_core::cache::CacheConfig`: a hard LRU
//! bound combined with TTL expiry, plus the byte-accounting and
//! forced-eviction knobs `spec.md` §4.2 calls out explicitly for the
//! cross-query cache contract.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrossQueryCacheConfig {
    /// Maximum number of entries. When reached, LRU eviction makes room.
    pub max_entries: usize,
    /// Soft byte budget across all cached payloads. Forced eviction kicks
    /// in once usage crosses `forced_eviction_threshold_pct` of this value.
    pub max_bytes: u64,
    /// Percentage (0-100) of `max_bytes` at which forced eviction starts
    /// proactively reclaiming space ahead of the hard `max_entries` limit.
    pub forced_eviction_threshold_pct: u8,
    /// Default TTL applied when a builtin does not override `cache_duration`.
    pub default_ttl: Duration,
    /// Optional period for a background sweep that evicts stale entries
    /// even if they are never looked up again. `None` disables the sweep
    /// (entries are still checked for expiry lazily on lookup).
    pub stale_eviction_period: Option<Duration>,
}

impl Default for CrossQueryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_bytes: 100 * 1024 * 1024,
            forced_eviction_threshold_pct: 90,
            default_ttl: Duration::from_secs(60),
            stale_eviction_period: Some(Duration::from_secs(300)),
        }
    }
}

impl CrossQueryCacheConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self { max_entries: 0, ..Self::default() }
    }
}
