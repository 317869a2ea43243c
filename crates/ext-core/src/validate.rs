//! Request Validator — §4.1.
//!
//! Every builtin's request is a duck-typed mapping: check that its keys are
//! a subset of an `allowed` set and a superset of a `required` set, then
//! extract typed fields with defaults. Intentionally four functions plus a
//! set-difference check — no per-builtin schema DSL (`spec.md` §9
//! "Duck-typed request objects").

use std::collections::BTreeSet;

use ext_error::{ExtError, SourceLocation, TypeError};

use crate::value::{Value, ValueMap};

/// The outcome of `validate`: the request's keys all checked out.
#[derive(Debug, Clone, Copy)]
pub struct Validated;

/// Check that `request`'s keys are `allowed ⊇ keys(request) ⊇ required`.
///
/// Carries the offending key set verbatim in the error for diagnostics, as
/// required by `spec.md` §4.1.
pub fn validate(
    builtin: &str,
    request: &ValueMap,
    allowed: &[&str],
    required: &[&str],
    location: &SourceLocation,
) -> Result<Validated, ExtError> {
    let allowed: BTreeSet<&str> = allowed.iter().copied().collect();
    let required: BTreeSet<&str> = required.iter().copied().collect();
    let present: BTreeSet<&str> = request.keys().map(String::as_str).collect();

    let unknown: Vec<String> = present.difference(&allowed).map(|s| (*s).to_string()).collect();
    if !unknown.is_empty() {
        return Err(TypeError::UnknownKeys {
            builtin: builtin.to_string(),
            keys: unknown,
            location: location.clone(),
        }
        .into());
    }

    let missing: Vec<String> = required.difference(&present).map(|s| (*s).to_string()).collect();
    if !missing.is_empty() {
        return Err(TypeError::MissingKeys {
            builtin: builtin.to_string(),
            keys: missing,
            location: location.clone(),
        }
        .into());
    }

    Ok(Validated)
}

fn wrong_type(builtin: &str, key: &str, expected: &str, got: &Value, location: &SourceLocation) -> ExtError {
    TypeError::WrongType {
        builtin: builtin.to_string(),
        key: key.to_string(),
        expected: expected.to_string(),
        got: got.type_name().to_string(),
        location: location.clone(),
    }
    .into()
}

pub fn get_string(
    builtin: &str,
    request: &ValueMap,
    key: &str,
    location: &SourceLocation,
) -> Result<String, ExtError> {
    match request.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(wrong_type(builtin, key, "string", other, location)),
        None => Err(TypeError::MissingKeys {
            builtin: builtin.to_string(),
            keys: vec![key.to_string()],
            location: location.clone(),
        }
        .into()),
    }
}

pub fn get_string_or(
    builtin: &str,
    request: &ValueMap,
    key: &str,
    default: &str,
    location: &SourceLocation,
) -> Result<String, ExtError> {
    match request.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(wrong_type(builtin, key, "string", other, location)),
    }
}

pub fn get_bool_or(
    builtin: &str,
    request: &ValueMap,
    key: &str,
    default: bool,
    location: &SourceLocation,
) -> Result<bool, ExtError> {
    match request.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(wrong_type(builtin, key, "boolean", other, location)),
    }
}

pub fn get_int_or(
    builtin: &str,
    request: &ValueMap,
    key: &str,
    default: i64,
    location: &SourceLocation,
) -> Result<i64, ExtError> {
    match request.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| wrong_type(builtin, key, "integer", &Value::Number(n.clone()), location)),
        Some(other) => Err(wrong_type(builtin, key, "integer", other, location)),
    }
}

pub fn get_object<'a>(
    builtin: &str,
    request: &'a ValueMap,
    key: &str,
    location: &SourceLocation,
) -> Result<&'a ValueMap, ExtError> {
    match request.get(key) {
        Some(Value::Object(m)) => Ok(m),
        Some(other) => Err(wrong_type(builtin, key, "object", other, location)),
        None => Err(TypeError::MissingKeys {
            builtin: builtin.to_string(),
            keys: vec![key.to_string()],
            location: location.clone(),
        }
        .into()),
    }
}

pub fn get_object_or<'a>(
    builtin: &str,
    request: &'a ValueMap,
    key: &str,
    default: &'a ValueMap,
    location: &SourceLocation,
) -> Result<&'a ValueMap, ExtError> {
    match request.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Object(m)) => Ok(m),
        Some(other) => Err(wrong_type(builtin, key, "object", other, location)),
    }
}

/// Accepts either a number (nanoseconds) or a string (integer-nanoseconds,
/// or a duration literal with unit suffix such as `10s`).
pub fn get_duration(
    builtin: &str,
    request: &ValueMap,
    key: &str,
    default: std::time::Duration,
    location: &SourceLocation,
) -> Result<std::time::Duration, ExtError> {
    match request.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => {
            let nanos = n
                .as_i64()
                .ok_or_else(|| wrong_type(builtin, key, "duration", &Value::Number(n.clone()), location))?;
            Ok(std::time::Duration::from_nanos(nanos.max(0) as u64))
        }
        Some(Value::String(s)) => parse_duration_str(s).ok_or_else(|| {
            TypeError::InvalidValue {
                builtin: builtin.to_string(),
                key: key.to_string(),
                message: format!("'{s}' is not a valid duration"),
                location: location.clone(),
            }
            .into()
        }),
        Some(other) => Err(wrong_type(builtin, key, "duration", other, location)),
    }
}

fn parse_duration_str(s: &str) -> Option<std::time::Duration> {
    let s = s.trim();
    if let Ok(nanos) = s.parse::<i64>() {
        return Some(std::time::Duration::from_nanos(nanos.max(0) as u64));
    }

    let split_at = s.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let (num, unit) = s.split_at(split_at);
    let num: f64 = num.parse().ok()?;
    let nanos_per_unit: f64 = match unit {
        "ns" => 1.0,
        "us" | "\u{b5}s" => 1_000.0,
        "ms" => 1_000_000.0,
        "s" => 1_000_000_000.0,
        "m" => 60.0 * 1_000_000_000.0,
        "h" => 3_600.0 * 1_000_000_000.0,
        _ => return None,
    };
    Some(std::time::Duration::from_nanos((num * nanos_per_unit).max(0.0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loc() -> SourceLocation {
        SourceLocation::unknown()
    }

    fn map(v: serde_json::Value) -> ValueMap {
        match Value::from(v) {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn validate_rejects_unknown_key() {
        let req = map(json!({"a": 1, "z": 2}));
        let err = validate("test", &req, &["a"], &[], &loc()).unwrap_err();
        assert!(matches!(err, ExtError::Type(TypeError::UnknownKeys { .. })));
    }

    #[test]
    fn validate_rejects_missing_required_key() {
        let req = map(json!({"a": 1}));
        let err = validate("test", &req, &["a", "b"], &["b"], &loc()).unwrap_err();
        assert!(matches!(err, ExtError::Type(TypeError::MissingKeys { .. })));
    }

    #[test]
    fn validate_accepts_subset_superset() {
        let req = map(json!({"a": 1}));
        validate("test", &req, &["a", "b"], &["a"], &loc()).unwrap();
    }

    #[test]
    fn duration_parses_plain_nanos_string() {
        let req = map(json!({"d": "1000"}));
        let d = get_duration("test", &req, "d", std::time::Duration::ZERO, &loc()).unwrap();
        assert_eq!(d, std::time::Duration::from_nanos(1000));
    }

    #[test]
    fn duration_parses_unit_suffix() {
        let req = map(json!({"d": "10s"}));
        let d = get_duration("test", &req, "d", std::time::Duration::ZERO, &loc()).unwrap();
        assert_eq!(d, std::time::Duration::from_secs(10));
    }

    #[test]
    fn duration_number_is_nanos() {
        let req = map(json!({"d": 500}));
        let d = get_duration("test", &req, "d", std::time::Duration::ZERO, &loc()).unwrap();
        assert_eq!(d, std::time::Duration::from_nanos(500));
    }

    #[test]
    fn duration_default_when_absent() {
        let req = map(json!({}));
        let d = get_duration("test", &req, "d", std::time::Duration::from_secs(60), &loc()).unwrap();
        assert_eq!(d, std::time::Duration::from_secs(60));
    }

    proptest::proptest! {
        #[test]
        fn validate_matches_subset_superset_definition(
            present in proptest::collection::btree_set("[a-e]", 0..5),
            allowed in proptest::collection::btree_set("[a-e]", 0..5),
            required in proptest::collection::btree_set("[a-e]", 0..5),
        ) {
            let mut req = ValueMap::new();
            for k in &present {
                req.insert(k.clone(), Value::Bool(true));
            }
            let allowed_refs: Vec<&str> = allowed.iter().map(String::as_str).collect();
            let required_refs: Vec<&str> = required.iter().map(String::as_str).collect();
            let loc = SourceLocation::unknown();

            let ok = validate("prop", &req, &allowed_refs, &required_refs, &loc).is_ok();
            let expected = present.is_subset(&allowed) && required.is_subset(&present);
            prop_assert_eq!(ok, expected);
        }
    }
}
