//! Cache key generation.
//!
//! The cache key *is* the canonical request value (`spec.md` §3). Two
//! requests are cache-equivalent iff they compare equal as ordered
//! mappings of tagged values — `Value`'s own `PartialEq`/`Hash` already
//! satisfy that (see `ext_core::value`), so `CacheKey` is a thin newtype
//! rather than a hash digest: no hidden state (wall-clock, map iteration
//! order) participates in equality.

use crate::value::ValueMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(crate::value::Value);

impl CacheKey {
    pub fn from_request(request: &ValueMap) -> Self {
        Self(crate::value::Value::Object(request.clone()))
    }
}
