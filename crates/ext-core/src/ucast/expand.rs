//! `ucast.expand` — rewrite the concise form into the canonical form (§4.5).
//!
//! Four shorthands are recognized; already-expanded objects (carrying
//! `operator` + `type` + `value`) are left untouched so that expansion is
//! idempotent (`spec.md` §8 invariant 2: `expand(expand(N)) == expand(N)`).

use ext_error::{ExtError, SourceLocation};

use crate::value::{Value, ValueMap};

use super::ast::FieldOp;

fn already_expanded(m: &ValueMap) -> bool {
    m.contains_key("operator") && m.contains_key("type") && m.contains_key("value")
}

fn empty_object() -> Value {
    Value::Object(ValueMap::new())
}

fn is_empty_object(v: &Value) -> bool {
    matches!(v, Value::Object(m) if m.is_empty())
}

/// Expand a single condition (object with one or more keys, or an already
/// expanded node) into canonical form.
pub fn expand(value: &Value) -> Result<Value, ExtError> {
    let Value::Object(obj) = value else {
        return Err(bad_shape("ucast.expand expects an object condition"));
    };

    if already_expanded(obj) {
        return Ok(value.clone());
    }

    if obj.is_empty() {
        return Ok(empty_object());
    }

    if obj.len() == 1 {
        let (key, val) = obj.iter().next().expect("len == 1");
        return expand_single_key(key, val);
    }

    // Multi-key object: and-compound of each key expanded individually.
    let mut children = Vec::with_capacity(obj.len());
    for (key, val) in obj {
        let expanded = expand_single_key(key, val)?;
        if !is_empty_object(&expanded) {
            children.push(expanded);
        }
    }
    if children.is_empty() {
        return Ok(empty_object());
    }

    let mut m = ValueMap::new();
    m.insert("operator".to_string(), Value::String("and".to_string()));
    m.insert("type".to_string(), Value::String("compound".to_string()));
    m.insert("value".to_string(), Value::Array(children));
    Ok(Value::Object(m))
}

fn expand_single_key(key: &str, value: &Value) -> Result<Value, ExtError> {
    if key == "or" {
        return expand_or(value);
    }

    // `{field: {op: value}}` vs `{field: value}`: disambiguate by checking
    // whether `value` is a single-key object whose key is a known operator.
    if let Value::Object(inner) = value {
        if inner.len() == 1 {
            let (op_key, op_value) = inner.iter().next().expect("len == 1");
            if let Some(op) = FieldOp::parse(op_key) {
                return Ok(field_node(op_name(op), key, op_value.clone()));
            }
        }
    }

    Ok(field_node("eq", key, value.clone()))
}

fn expand_or(value: &Value) -> Result<Value, ExtError> {
    let Value::Array(items) = value else {
        return Err(bad_shape("'or' requires an array of conditions"));
    };

    if items.is_empty() {
        // An empty or-set collapses to an empty object: drop the condition.
        return Ok(empty_object());
    }

    let mut children = Vec::with_capacity(items.len());
    for item in items {
        let expanded = expand(item)?;
        if !is_empty_object(&expanded) {
            children.push(expanded);
        }
    }
    if children.is_empty() {
        return Ok(empty_object());
    }

    let mut m = ValueMap::new();
    m.insert("operator".to_string(), Value::String("or".to_string()));
    m.insert("type".to_string(), Value::String("compound".to_string()));
    m.insert("value".to_string(), Value::Array(children));
    Ok(Value::Object(m))
}

fn field_node(operator: &str, field: &str, value: Value) -> Value {
    let mut m = ValueMap::new();
    m.insert("operator".to_string(), Value::String(operator.to_string()));
    m.insert("type".to_string(), Value::String("field".to_string()));
    m.insert("field".to_string(), Value::String(field.to_string()));
    m.insert("value".to_string(), value);
    Value::Object(m)
}

const fn op_name(op: FieldOp) -> &'static str {
    match op {
        FieldOp::Eq => "eq",
        FieldOp::Ne => "ne",
        FieldOp::Gt => "gt",
        FieldOp::Lt => "lt",
        FieldOp::Ge => "ge",
        FieldOp::Le => "le",
        FieldOp::In => "in",
        FieldOp::Startswith => "startswith",
        FieldOp::Endswith => "endswith",
        FieldOp::Contains => "contains",
    }
}

fn bad_shape(message: &str) -> ExtError {
    ext_error::TypeError::InvalidValue {
        builtin: "ucast.expand".to_string(),
        key: "conditions".to_string(),
        message: message.to_string(),
        location: SourceLocation::unknown(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    #[test]
    fn single_key_shorthand_becomes_eq_field() {
        let out = expand(&v(json!({"name": "bob"}))).unwrap();
        assert_eq!(out, v(json!({"operator": "eq", "type": "field", "field": "name", "value": "bob"})));
    }

    #[test]
    fn single_key_with_operator_object() {
        let out = expand(&v(json!({"salary": {"gt": 50000}}))).unwrap();
        assert_eq!(
            out,
            v(json!({"operator": "gt", "type": "field", "field": "salary", "value": 50000}))
        );
    }

    #[test]
    fn multi_key_becomes_and_compound() {
        let out = expand(&v(json!({"name": "bob", "salary": {"gt": 50000}}))).unwrap();
        let Value::Object(m) = &out else { panic!() };
        assert_eq!(m.get("operator"), Some(&Value::String("and".to_string())));
        let Some(Value::Array(children)) = m.get("value") else { panic!() };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn or_shorthand_becomes_or_compound() {
        let out = expand(&v(json!({"or": [{"a": 1}, {"b": 2}]}))).unwrap();
        let Value::Object(m) = &out else { panic!() };
        assert_eq!(m.get("operator"), Some(&Value::String("or".to_string())));
    }

    #[test]
    fn empty_or_collapses_to_empty_object() {
        let out = expand(&v(json!({"or": []}))).unwrap();
        assert_eq!(out, v(json!({})));
    }

    #[test]
    fn already_expanded_is_untouched() {
        let expanded = json!({"operator": "eq", "type": "field", "field": "x", "value": 1});
        let out = expand(&v(expanded.clone())).unwrap();
        assert_eq!(out, v(expanded));
    }

    #[test]
    fn expansion_is_idempotent_on_examples() {
        for example in [
            json!({"name": "bob"}),
            json!({"name": "bob", "age": {"gt": 18}}),
            json!({"or": [{"a": 1}, {"b": {"lt": 2}}]}),
        ] {
            let once = expand(&v(example)).unwrap();
            let twice = expand(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    proptest::proptest! {
        #[test]
        fn expand_idempotent_on_flat_maps(
            pairs in proptest::collection::vec(("[a-c]", 0i64..100), 0..4),
        ) {
            let mut obj = serde_json::Map::new();
            for (k, val) in pairs {
                obj.insert(k, json!(val));
            }
            let input = v(serde_json::Value::Object(obj));
            let once = expand(&input).unwrap();
            let twice = expand(&once).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
