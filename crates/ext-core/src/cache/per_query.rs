//! Per-query cache — scoped to one evaluation, tied to the host's
//! per-request scratch map.
//!
//! Always consulted (unlike the cross-query cache, which is opt-in via
//! `cache: true`). Holds both successes and captured errors: the rule
//! language assumes deterministic semantics inside a single evaluation, so
//! re-executing a failing call with identical arguments must yield the same
//! error (`spec.md` §3 "Per-Query Cache Entry").
//!
//! Owned by a single evaluator and never shared across threads, so it needs
//! no locking — a plain `HashMap` scoped per builtin (`pool_key`) within the
//! scratch map, mirroring how the host's per-request context is documented
//! to work in `spec.md` §4.2.

use std::collections::HashMap;

use crate::value::Value;

use super::key::CacheKey;

/// A captured outcome, cloned verbatim on repeat lookups within the query.
#[derive(Debug, Clone)]
pub enum CachedOutcome {
    Success(Value),
    /// The full response shape the builtin would have returned for this
    /// failure — either a framework error (aborts) or a `{error: {...}}`
    /// data response, already decided by `raise_error` at insert time.
    Error(Value),
}

/// One per-builtin scratch slot, keyed by the host's `pool_key` (typically
/// the builtin name), each holding its own request→outcome map.
#[derive(Debug, Default)]
pub struct PerQueryCache {
    slots: HashMap<String, HashMap<CacheKey, CachedOutcome>>,
}

impl PerQueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pool_key: &str, key: &CacheKey) -> Option<&CachedOutcome> {
        self.slots.get(pool_key)?.get(key)
    }

    pub fn insert(&mut self, pool_key: &str, key: CacheKey, outcome: CachedOutcome) {
        self.slots.entry(pool_key.to_string()).or_default().insert(key, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueMap;

    #[test]
    fn hit_returns_same_outcome_cloned() {
        let mut cache = PerQueryCache::new();
        let mut req = ValueMap::new();
        req.insert("q".to_string(), Value::String("select 1".to_string()));
        let key = CacheKey::from_request(&req);

        cache.insert("sql.send", key.clone(), CachedOutcome::Success(Value::Bool(true)));
        assert!(matches!(cache.get("sql.send", &key), Some(CachedOutcome::Success(Value::Bool(true)))));
    }

    #[test]
    fn different_pool_keys_are_isolated() {
        let mut cache = PerQueryCache::new();
        let req = ValueMap::new();
        let key = CacheKey::from_request(&req);
        cache.insert("sql.send", key.clone(), CachedOutcome::Success(Value::Null));
        assert!(cache.get("redis.query", &key).is_none());
    }
}
