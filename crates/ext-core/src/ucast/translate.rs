//! Compile a canonical UCAST node to a SQL `WHERE` clause string.
//!
//! `ucast.as_sql` returns one SQL string (not a parameterized query + bind
//! list) — per `spec.md` §8 scenario S4, values are inlined as
//! dialect-escaped literals rather than bound placeholders. This mirrors
//! how the teacher's own `WhereSqlGenerator::to_sql` (the fraiseql-wire
//! adapter path, as opposed to the parameterized `*WhereGenerator::generate`
//! paths) inlines values directly into the SQL string.

use ext_error::{ExtError, SourceLocation};

use crate::value::{Value, ValueMap};

use super::ast::{CompoundOp, DocumentOp, FieldOp, UcastNode};
use super::dialect::Dialect;

fn bad(message: impl Into<String>) -> ExtError {
    ext_error::TypeError::InvalidValue {
        builtin: "ucast.as_sql".to_string(),
        key: "conditions".to_string(),
        message: message.into(),
        location: SourceLocation::unknown(),
    }
    .into()
}

/// Parse an already-expanded canonical condition into a [`UcastNode`].
pub fn from_value(value: &Value) -> Result<UcastNode, ExtError> {
    let Value::Object(obj) = value else {
        return Err(bad("condition must be an object"));
    };
    // An empty object means "no condition" and has no AST representation
    // the caller should reach `to_sql` with; callers special-case it.
    let type_ = obj.get("type").and_then(Value::as_str).ok_or_else(|| bad("missing 'type'"))?;
    let operator = obj.get("operator").and_then(Value::as_str).ok_or_else(|| bad("missing 'operator'"))?;
    let value_field = obj.get("value").ok_or_else(|| bad("missing 'value'"))?;

    match type_ {
        "field" => {
            let field = obj.get("field").and_then(Value::as_str).ok_or_else(|| bad("field condition missing 'field'"))?;
            let op = FieldOp::parse(operator).ok_or_else(|| bad(format!("unknown field operator '{operator}'")))?;
            Ok(UcastNode::Field { operator: op, field: field.to_string(), value: value_field.clone() })
        }
        "document" => {
            let op = DocumentOp::parse(operator).ok_or_else(|| bad(format!("unknown document operator '{operator}'")))?;
            Ok(UcastNode::Document { operator: op, value: value_field.clone() })
        }
        "compound" => {
            let op = CompoundOp::parse(operator).ok_or_else(|| bad(format!("unknown compound operator '{operator}'")))?;
            let items = value_field.as_array().ok_or_else(|| bad("compound condition 'value' must be an array"))?;
            let children: Result<Vec<UcastNode>, ExtError> = items.iter().map(from_value).collect();
            let children = children?;
            if op == CompoundOp::Not && children.len() != 1 {
                return Err(bad("'not' takes exactly one child"));
            }
            Ok(UcastNode::Compound { operator: op, children })
        }
        other => Err(bad(format!("unknown condition type '{other}'"))),
    }
}

fn translate_field(field: &str, translations: &ValueMap) -> String {
    if let Some((table, column)) = field.split_once('.') {
        if let Some(mapping) = translations.get(table).and_then(Value::as_object) {
            let new_table = mapping.get("$self").and_then(Value::as_str).unwrap_or(table);
            let new_column = mapping.get(column).and_then(Value::as_str).unwrap_or(column);
            return format!("{new_table}.{new_column}");
        }
        return field.to_string();
    }
    if let Some(mapping) = translations.get(field).and_then(Value::as_object) {
        if let Some(renamed) = mapping.get("$self").and_then(Value::as_str) {
            return renamed.to_string();
        }
    }
    field.to_string()
}

fn field_op_sql(op: FieldOp) -> &'static str {
    match op {
        FieldOp::Eq => "=",
        FieldOp::Ne => "!=",
        FieldOp::Gt => ">",
        FieldOp::Lt => "<",
        FieldOp::Ge => ">=",
        FieldOp::Le => "<=",
        FieldOp::In => "IN",
        FieldOp::Startswith | FieldOp::Endswith | FieldOp::Contains => "LIKE",
    }
}

fn render_literal(value: &Value, dialect: Dialect) -> Result<String, ExtError> {
    match value {
        Value::String(s) => Ok(dialect.string_literal(s)),
        Value::Number(n) => Ok(dialect.number_literal(n)),
        Value::Bool(b) => Ok(if *b { "TRUE".to_string() } else { "FALSE".to_string() }),
        Value::Null => Ok("NULL".to_string()),
        Value::Array(items) => {
            let parts: Result<Vec<String>, ExtError> = items.iter().map(|v| render_literal(v, dialect)).collect();
            Ok(format!("({})", parts?.join(", ")))
        }
        other => Err(bad(format!("unsupported value in WHERE clause: {}", other.type_name()))),
    }
}

fn render_field_value(op: FieldOp, value: &Value, dialect: Dialect) -> Result<String, ExtError> {
    match op {
        FieldOp::Startswith | FieldOp::Endswith | FieldOp::Contains => {
            let s = value.as_str().ok_or_else(|| bad("LIKE-style operators require a string value"))?;
            let pattern = match op {
                FieldOp::Startswith => format!("{s}%"),
                FieldOp::Endswith => format!("%{s}"),
                FieldOp::Contains => format!("%{s}%"),
                _ => unreachable!(),
            };
            Ok(dialect.string_literal(&pattern))
        }
        FieldOp::In => {
            if !matches!(value, Value::Array(_)) {
                return Err(bad("'in' requires an array value"));
            }
            render_literal(value, dialect)
        }
        _ => render_literal(value, dialect),
    }
}

/// Compile a [`UcastNode`] to a SQL `WHERE` clause fragment. Top-level
/// callers should wrap the result in `WHERE ( ... )`.
pub fn to_sql(node: &UcastNode, dialect: Dialect, translations: &ValueMap) -> Result<String, ExtError> {
    match node {
        UcastNode::Field { operator, field, value } => {
            let col = translate_field(field, translations);

            if let Value::Null = value {
                return match operator {
                    FieldOp::Eq => Ok(format!("{col} IS NULL")),
                    FieldOp::Ne => Ok(format!("{col} IS NOT NULL")),
                    _ => Err(bad("null value is only valid with 'eq'/'ne'")),
                };
            }

            // Column-to-column comparison: `{field: <ref>}`.
            if let Value::Object(m) = value {
                if m.len() == 1 {
                    if let Some(other_field) = m.get("field").and_then(Value::as_str) {
                        let other_col = translate_field(other_field, translations);
                        return Ok(format!("{col} {} {other_col}", field_op_sql(*operator)));
                    }
                }
            }

            let rendered = render_field_value(*operator, value, dialect)?;
            Ok(format!("{col} {} {rendered}", field_op_sql(*operator)))
        }
        UcastNode::Document { operator: DocumentOp::Exists, value } => {
            let field = value.as_str().ok_or_else(|| bad("'exists' requires a field-name string value"))?;
            let col = translate_field(field, translations);
            Ok(format!("{col} IS NOT NULL"))
        }
        UcastNode::Compound { operator: CompoundOp::And, children } => {
            if children.is_empty() {
                // Empty `and` is a truth value; never emit a malformed
                // empty `WHERE`.
                return Ok("(1 = 1)".to_string());
            }
            let parts: Result<Vec<String>, ExtError> = children.iter().map(|c| to_sql(c, dialect, translations)).collect();
            Ok(format!("({})", parts?.join(" AND ")))
        }
        UcastNode::Compound { operator: CompoundOp::Or, children } => {
            if children.is_empty() {
                return Err(bad("'or' requires at least one child"));
            }
            let parts: Result<Vec<String>, ExtError> = children.iter().map(|c| to_sql(c, dialect, translations)).collect();
            Ok(format!("({})", parts?.join(" OR ")))
        }
        UcastNode::Compound { operator: CompoundOp::Not, children } => {
            let [child] = children.as_slice() else {
                return Err(bad("'not' takes exactly one child"));
            };
            Ok(format!("NOT ({})", to_sql(child, dialect, translations)?))
        }
    }
}

/// Top-level entry point for `ucast.as_sql`: parse, translate, and wrap in
/// `WHERE ( ... )`. An empty condition (no clauses survived expansion)
/// produces `WHERE (1 = 1)` rather than a malformed empty `WHERE`.
pub fn conditions_to_where_clause(
    conditions: &Value,
    dialect: Dialect,
    translations: &ValueMap,
) -> Result<String, ExtError> {
    if let Value::Object(m) = conditions {
        if m.is_empty() {
            return Ok("WHERE (1 = 1)".to_string());
        }
    }
    let node = from_value(conditions)?;
    let body = to_sql(&node, dialect, translations)?;
    Ok(format!("WHERE {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ucast::expand::expand;
    use serde_json::json;

    fn translations(j: serde_json::Value) -> ValueMap {
        match Value::from(j) {
            Value::Object(m) => m,
            _ => panic!(),
        }
    }

    #[test]
    fn s4_translate_with_translations() {
        let concise = Value::from(json!({"users.name": "bob", "users.salary": {"gt": 50000}}));
        let expanded = expand(&concise).unwrap();
        let translations = translations(json!({
            "users": {"$self": "u0", "name": "n0", "salary": "s0"}
        }));
        let sql = conditions_to_where_clause(&expanded, Dialect::Postgres, &translations).unwrap();
        assert_eq!(sql, "WHERE (u0.n0 = E'bob' AND u0.s0 > 50000)");
    }

    #[test]
    fn s5_null_ne_becomes_is_not_null() {
        let node = json!({"type": "field", "operator": "ne", "field": "name", "value": null});
        let sql = conditions_to_where_clause(&Value::from(node), Dialect::Postgres, &ValueMap::new()).unwrap();
        assert_eq!(sql, "WHERE name IS NOT NULL");
    }

    #[test]
    fn null_eq_becomes_is_null() {
        let node = json!({"type": "field", "operator": "eq", "field": "name", "value": null});
        let sql = conditions_to_where_clause(&Value::from(node), Dialect::Sqlite, &ValueMap::new()).unwrap();
        assert_eq!(sql, "WHERE name IS NULL");
    }

    #[test]
    fn unknown_dialect_falls_back_and_quotes_plain() {
        let node = json!({"type": "field", "operator": "eq", "field": "x", "value": 1});
        let sql = conditions_to_where_clause(&Value::from(node), Dialect::parse("oracle"), &ValueMap::new()).unwrap();
        assert_eq!(sql, "WHERE x = 1");
    }

    #[test]
    fn not_rejects_non_single_child() {
        let node = json!({"operator": "not", "type": "compound", "value": [
            {"type": "field", "operator": "eq", "field": "a", "value": 1},
            {"type": "field", "operator": "eq", "field": "b", "value": 2},
        ]});
        let err = from_value(&Value::from(node)).unwrap_err();
        assert!(matches!(err, ExtError::Type(_)));
    }

    #[test]
    fn empty_and_is_a_truth_value_not_malformed() {
        let node = json!({"operator": "and", "type": "compound", "value": []});
        let sql = conditions_to_where_clause(&Value::from(node), Dialect::Mysql, &ValueMap::new()).unwrap();
        assert_eq!(sql, "WHERE (1 = 1)");
    }

    #[test]
    fn or_rejects_empty_children_at_translate_time() {
        let node = json!({"operator": "or", "type": "compound", "value": []});
        let err = conditions_to_where_clause(&Value::from(node), Dialect::Mysql, &ValueMap::new()).unwrap_err();
        assert!(matches!(err, ExtError::Type(_)));
    }

    #[test]
    fn field_to_field_reference_emits_raw_column() {
        let node = json!({"type": "field", "operator": "eq", "field": "a", "value": {"field": "b"}});
        let sql = conditions_to_where_clause(&Value::from(node), Dialect::Postgres, &ValueMap::new()).unwrap();
        assert_eq!(sql, "WHERE a = b");
    }

    #[test]
    fn in_operator_renders_parenthesized_list() {
        let node = json!({"type": "field", "operator": "in", "field": "id", "value": [1, 2, 3]});
        let sql = conditions_to_where_clause(&Value::from(node), Dialect::Mysql, &ValueMap::new()).unwrap();
        assert_eq!(sql, "WHERE id IN (1, 2, 3)");
    }
}
