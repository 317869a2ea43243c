//! Universal Conditions AST — §4.5.
//!
//! Two builtins live here: `ucast.expand` (concise → canonical rewrite) and
//! `ucast.as_sql` (canonical or concise conditions → a `WHERE` clause for
//! one of four SQL dialects, with optional identifier translation).

pub mod ast;
pub mod builtin;
pub mod dialect;
pub mod expand;
pub mod translate;

use ext_error::ExtError;

use crate::value::{Value, ValueMap};
pub use ast::{CompoundOp, DocumentOp, FieldOp, UcastNode};
pub use builtin::{UcastAsSqlExecutor, UcastExpandExecutor};
pub use dialect::Dialect;

/// `ucast.expand(conditions) -> conditions`
pub fn expand_builtin(conditions: &Value) -> Result<Value, ExtError> {
    expand::expand(conditions)
}

/// `ucast.as_sql(conditions, dialect, translations) -> sql`
///
/// `conditions` may be concise or canonical; it is expanded before
/// compilation so callers never have to call `ucast.expand` themselves.
pub fn as_sql_builtin(conditions: &Value, dialect: &str, translations: &ValueMap) -> Result<Value, ExtError> {
    let expanded = expand::expand(conditions)?;
    let sql = translate::conditions_to_where_clause(&expanded, Dialect::parse(dialect), translations)?;
    Ok(Value::String(sql))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn as_sql_expands_concise_conditions_first() {
        let conditions = Value::from(json!({"name": "bob"}));
        let out = as_sql_builtin(&conditions, "postgres", &ValueMap::new()).unwrap();
        assert_eq!(out, Value::String("WHERE name = E'bob'".to_string()));
    }

    #[test]
    fn as_sql_with_translations_matches_s4() {
        let conditions = Value::from(json!({"users.name": "bob", "users.salary": {"gt": 50000}}));
        let translations = match Value::from(json!({"users": {"$self": "u0", "name": "n0", "salary": "s0"}})) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let out = as_sql_builtin(&conditions, "postgres", &translations).unwrap();
        assert_eq!(out, Value::String("WHERE (u0.n0 = E'bob' AND u0.s0 > 50000)".to_string()));
    }
}
