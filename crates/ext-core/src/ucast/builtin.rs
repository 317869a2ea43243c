//! Kernel wiring for `ucast.expand` and `ucast.as_sql` — both are pure
//! transformations with nothing to cache across queries, so they run with
//! [`CacheOptions::disabled`] rather than the per-backend TTL the other
//! builtins use.

use async_trait::async_trait;
use ext_error::{ExtError, SourceLocation};

use crate::kernel::{run_builtin, BuiltinContext, CacheOptions, Executor};
use crate::validate;
use crate::value::{Value, ValueMap};

use super::{as_sql_builtin, expand_builtin};

pub struct UcastExpandExecutor;

#[async_trait]
impl Executor for UcastExpandExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("ucast.expand expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            "ucast.expand",
            raw_request,
            &["conditions", "cache", "cache_duration", "raise_error"],
            &["conditions"],
            &location,
            ctx,
            CacheOptions::disabled(),
            |_validated| async move {
                let conditions = validate::get_object("ucast.expand", raw_request, "conditions", &location)?;
                let normalized = expand_builtin(&Value::Object(conditions.clone()))?;
                let mut out = ValueMap::new();
                out.insert("conditions".to_string(), normalized);
                Ok(Value::Object(out))
            },
        )
        .await
    }
}

pub struct UcastAsSqlExecutor;

#[async_trait]
impl Executor for UcastAsSqlExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("ucast.as_sql expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            "ucast.as_sql",
            raw_request,
            // The two-argument form (no `translations`) is rejected outright
            // rather than accepted with a default empty map — spec.md §9
            // "a reimplementation should ... reject the two-argument form
            // with a clear error."
            &["conditions", "dialect", "translations", "cache", "cache_duration", "raise_error"],
            &["conditions", "dialect", "translations"],
            &location,
            ctx,
            CacheOptions::disabled(),
            |_validated| async move {
                let conditions = validate::get_object("ucast.as_sql", raw_request, "conditions", &location)?;
                let dialect = validate::get_string("ucast.as_sql", raw_request, "dialect", &location)?;
                let translations = validate::get_object("ucast.as_sql", raw_request, "translations", &location)?;

                let sql = as_sql_builtin(&Value::Object(conditions.clone()), &dialect, translations)?;
                let mut out = ValueMap::new();
                out.insert("sql".to_string(), sql);
                Ok(Value::Object(out))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CrossQueryCacheConfig, LruCrossQueryCache};
    use serde_json::json;
    use std::sync::Arc;

    fn req(j: serde_json::Value) -> ValueMap {
        match Value::from(j) {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn ctx() -> BuiltinContext {
        BuiltinContext::new(Arc::new(LruCrossQueryCache::new(CrossQueryCacheConfig::default())), 0)
    }

    #[tokio::test]
    async fn as_sql_rejects_missing_translations() {
        let request = Value::Object(req(json!({"conditions": {"name": "bob"}, "dialect": "postgres"})));
        let err = UcastAsSqlExecutor.execute(&request, &ctx()).await.unwrap_err();
        assert!(matches!(err, ExtError::Type(_)));
    }

    #[tokio::test]
    async fn expand_returns_canonical_conditions() {
        let request = Value::Object(req(json!({"conditions": {"name": "bob"}})));
        let result = UcastExpandExecutor.execute(&request, &ctx()).await.unwrap();
        let Value::Object(m) = result else { panic!() };
        assert_eq!(
            m.get("conditions"),
            Some(&Value::from(json!({"operator": "eq", "type": "field", "field": "name", "value": "bob"})))
        );
    }
}
