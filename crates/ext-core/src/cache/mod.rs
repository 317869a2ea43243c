//! Cache Substrate — §4.2.
//!
//! Exposes `check`/`insert` to each builtin. The per-query cache is always
//! consulted; the cross-query cache only when the caller opts in via
//! `cache: true`.

pub mod config;
pub mod cross_query;
pub mod key;
pub mod per_query;

use std::time::Duration;

use ext_error::ExtError;

use crate::value::{Value, ValueMap};
pub use config::CrossQueryCacheConfig;
pub use cross_query::{CrossQueryCache, LruCrossQueryCache};
pub use key::CacheKey;
pub use per_query::{CachedOutcome, PerQueryCache};

/// Shared cross-query cache plus a hit counter callback, handed to every
/// builtin invocation. `now_nanos` is supplied by the per-request context
/// (§4.2: "a field of the per-request context, not the system clock — this
/// keeps evaluation reproducible for time-mocked tests"), never read from
/// the system clock here.
pub struct CacheSubstrate<'a> {
    pub cross_query: &'a dyn CrossQueryCache,
    pub per_query:   &'a mut PerQueryCache,
}

#[derive(Debug)]
pub struct CacheCheckResult {
    pub outcome: Option<CachedOutcome>,
    pub hit:     bool,
}

impl<'a> CacheSubstrate<'a> {
    /// §4.2 `check`.
    pub fn check(
        &mut self,
        request: &ValueMap,
        cross_query_enabled: bool,
        pool_key: &str,
        now_nanos: i64,
    ) -> CacheCheckResult {
        let key = CacheKey::from_request(request);

        if cross_query_enabled {
            if let Some(payload) = self.cross_query.get(&key, now_nanos) {
                if let Ok(value) = deserialize_payload(&payload) {
                    return CacheCheckResult { outcome: Some(CachedOutcome::Success(value)), hit: true };
                }
            }
            return CacheCheckResult { outcome: None, hit: false };
        }

        match self.per_query.get(pool_key, &key) {
            Some(outcome) => CacheCheckResult { outcome: Some(outcome.clone()), hit: true },
            None => CacheCheckResult { outcome: None, hit: false },
        }
    }

    /// §4.2 `insert`. Exactly one of `success`/`error_response` is `Some`:
    /// the caller already knows which outcome it has in hand and need not
    /// reconstruct an `ExtError` just to tag the cache entry.
    pub fn insert(
        &mut self,
        request: &ValueMap,
        success: Option<&Value>,
        error_response: Option<&Value>,
        cross_query_enabled: bool,
        ttl: Duration,
        pool_key: &str,
        now_nanos: i64,
    ) {
        let key = CacheKey::from_request(request);

        // Cross-query cache never contains an error entry (§3 invariant).
        if let Some(value) = success {
            if cross_query_enabled {
                if let Ok(payload) = serialize_payload(value) {
                    let expires_at = cross_query::ttl_to_expiry(now_nanos, ttl);
                    self.cross_query.put(key.clone(), payload, expires_at);
                }
            }
        }

        // Per-query cache always records the outcome, success or error.
        let cached = match success {
            Some(value) => CachedOutcome::Success(value.clone()),
            None => CachedOutcome::Error(error_response.cloned().unwrap_or(Value::Null)),
        };
        self.per_query.insert(pool_key, key, cached);
    }
}

/// Round-trips the host's number semantics exactly: extended JSON via
/// `serde_json`'s `arbitrary_precision` feature keeps integers as integers
/// rather than coercing them to doubles (`spec.md` §9 "Cross-query cache
/// serialization boundary").
fn serialize_payload(value: &Value) -> Result<Vec<u8>, ExtError> {
    let json: serde_json::Value = value.into();
    serde_json::to_vec(&json).map_err(|e| ExtError::internal(format!("cache serialize: {e}")))
}

fn deserialize_payload(payload: &[u8]) -> Result<Value, ExtError> {
    let json: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| ExtError::internal(format!("cache deserialize: {e}")))?;
    Ok(Value::from(json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req(q: &str) -> ValueMap {
        match Value::from(json!({"query": q})) {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn cross_query_hit_increments_counter_exactly_once() {
        let cross = LruCrossQueryCache::new(CrossQueryCacheConfig::default());
        let mut per_query = PerQueryCache::new();
        let request = req("select 1");

        {
            let mut substrate = CacheSubstrate { cross_query: &cross, per_query: &mut per_query };
            let miss = substrate.check(&request, true, "sql.send", 0);
            assert!(!miss.hit);

            substrate.insert(
                &request,
                Some(&Value::String("B".to_string())),
                None,
                true,
                Duration::from_secs(10),
                "sql.send",
                0,
            );
        }

        let mut substrate = CacheSubstrate { cross_query: &cross, per_query: &mut per_query };
        let hit_at_9s = substrate.check(&request, true, "sql.send", 9_000_000_000);
        assert!(hit_at_9s.hit);
        assert_eq!(cross.hits(), 1);

        let miss_at_11s = substrate.check(&request, true, "sql.send", 11_000_000_000);
        assert!(!miss_at_11s.hit);
        assert_eq!(cross.hits(), 1);
    }

    #[test]
    fn per_query_cache_stores_errors_verbatim() {
        let cross = LruCrossQueryCache::new(CrossQueryCacheConfig::default());
        let mut per_query = PerQueryCache::new();
        let request = req("select fail()");
        let error_response = Value::from(json!({"error": {"message": "boom"}}));

        let mut substrate = CacheSubstrate { cross_query: &cross, per_query: &mut per_query };
        substrate.insert(
            &request,
            None,
            Some(&error_response),
            false,
            Duration::from_secs(10),
            "sql.send",
            0,
        );

        let result = substrate.check(&request, false, "sql.send", 0);
        assert!(result.hit);
        assert!(matches!(result.outcome, Some(CachedOutcome::Error(_))));
    }
}
