//! Value Bridge — conversion between the host's tagged value tree and
//! native Rust representations.
//!
//! The host engine's value tree is an ordered mapping from string keys to
//! tagged values (strings, arbitrary-precision numbers, booleans, null,
//! nested mappings, arrays, and sets). This module models that tree as
//! [`Value`], wired to `serde_json::Value` as the wire format because the
//! host's JSON-RPC boundary round-trips through JSON — the same choice the
//! teacher crate makes for its JSONB documents (`fraiseql_core::db::types`).
//!
//! Two host properties matter for cache-key fingerprinting:
//! - map equality must ignore insertion order (`Value::Object` is backed by
//!   `IndexMap`, whose `PartialEq` already compares by content, not order);
//! - number equality is mathematical, not textual (`"1.0"` and `"1"` and
//!   `1` all compare equal) — handled by [`Number::eq`].

use indexmap::IndexMap;
use std::hash::{Hash, Hasher};

/// A key-ordered mapping of tagged values, as produced by the host engine.
pub type ValueMap = IndexMap<String, Value>;

/// The host engine's tagged value tree.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(ValueMap),
    /// An unordered collection with no duplicate members. Represented as a
    /// `Vec` because `Value` cannot implement `Ord`/`Hash` uniformly across
    /// floats; equality is multiset equality (see `PartialEq` below).
    Set(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ValueMap> {
        match self {
            Self::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Set(_) => "set",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.contains(x))
            }
            _ => false,
        }
    }
}
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => 0u8.hash(state),
            Self::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Self::Number(n) => {
                2u8.hash(state);
                n.hash(state);
            }
            Self::String(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Self::Array(a) => {
                4u8.hash(state);
                a.hash(state);
            }
            Self::Object(m) => {
                5u8.hash(state);
                // Order-independent: XOR per-entry hashes together.
                let mut acc = 0u64;
                for (k, v) in m {
                    let mut h = std::collections::hash_map::DefaultHasher::new();
                    (k, v).hash(&mut h);
                    acc ^= h.finish();
                }
                acc.hash(state);
            }
            Self::Set(items) => {
                6u8.hash(state);
                let mut acc = 0u64;
                for v in items {
                    let mut h = std::collections::hash_map::DefaultHasher::new();
                    v.hash(&mut h);
                    acc ^= h.finish();
                }
                acc.hash(state);
            }
        }
    }
}

/// An arbitrary-precision number from the host, with mathematical equality.
///
/// The host can carry numbers outside the native 64-bit range. We keep the
/// original literal for round-tripping but compare by parsed mathematical
/// value: first as `i128` (exact for any integer that fits), falling back
/// to `f64` (lossy beyond ~2^53, a documented limitation shared with the
/// teacher, which stores JSONB numbers as plain `serde_json::Value` without
/// a dedicated big-decimal type either).
#[derive(Debug, Clone)]
pub struct Number {
    literal: String,
}

impl Number {
    pub fn from_i64(v: i64) -> Self {
        Self { literal: v.to_string() }
    }

    pub fn from_f64(v: f64) -> Self {
        Self { literal: v.to_string() }
    }

    pub fn parse(literal: impl Into<String>) -> Self {
        Self { literal: literal.into() }
    }

    pub fn as_i128(&self) -> Option<i128> {
        self.literal.parse().ok()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.literal.parse().ok()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.literal.parse().ok()
    }

    /// Downcast for backends (redis, neo4j parameters) that cannot marshal
    /// arbitrary-precision wrappers: integer when representable, otherwise
    /// double (`spec.md` §9 "Arbitrary-precision numbers").
    pub fn downcast(&self) -> DowncastNumber {
        if let Some(i) = self.as_i64() {
            DowncastNumber::Int(i)
        } else {
            DowncastNumber::Float(self.as_f64().unwrap_or(0.0))
        }
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DowncastNumber {
    Int(i64),
    Float(f64),
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.as_i128(), other.as_i128()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a == b;
        }
        self.literal == other.literal
    }
}
impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must branch exactly the way `PartialEq` does: `eq` falls back to
        // comparing `as_f64()` whenever *both* sides parse as integers but
        // still compares by `as_f64` once either side fails `as_i128` — so
        // `1` and `1.0` (i128-parseable and not, respectively) are equal via
        // the `as_f64` branch, not the `as_i128` one. Hashing on `as_i128`
        // first would put them in different buckets and violate Hash/Eq.
        if let Some(f) = self.as_f64() {
            f.to_bits().hash(state);
        } else {
            self.literal.hash(state);
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(Number::parse(n.to_string())),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(a) => Self::Array(a.iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => {
                Self::Object(m.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect())
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::from(&v)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => {
                serde_json::from_str(n.literal()).unwrap_or(Self::Null)
            }
            Value::String(s) => Self::String(s.clone()),
            Value::Array(a) => Self::Array(a.iter().map(serde_json::Value::from).collect()),
            Value::Object(m) => {
                Self::Object(m.iter().map(|(k, v)| (k.clone(), serde_json::Value::from(v))).collect())
            }
            Value::Set(items) => Self::Array(items.iter().map(serde_json::Value::from).collect()),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        Self::from(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_equal_by_mathematical_value() {
        let a = Value::from(json!(1));
        let b = Value::from(json!(1.0));
        assert_eq!(a, b);
    }

    #[test]
    fn object_equality_ignores_insertion_order() {
        let a = Value::from(json!({"a": 1, "b": 2}));
        let b = Value::from(json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn nested_structures_compare_recursively() {
        let a = Value::from(json!({"a": [1, {"x": "y"}]}));
        let b = Value::from(json!({"a": [1, {"x": "y"}]}));
        assert_eq!(a, b);
    }

    #[test]
    fn strings_compare_by_bytes() {
        assert_ne!(Value::from(json!("a")), Value::from(json!("b")));
    }

    #[test]
    fn roundtrip_through_serde_json() {
        let original = json!({"k": [1, "two", null, {"nested": true}]});
        let v = Value::from(original.clone());
        let back: serde_json::Value = v.into();
        assert_eq!(original, back);
    }
}
