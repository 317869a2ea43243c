//! `neo4j.query` — §4.4 "Graph-database query". No pooling: "driver
//! connection is per-invocation, scoped to the request" (§4.3).

use std::time::Duration;

use async_trait::async_trait;
use ext_core::kernel::{run_builtin, BuiltinContext, CacheOptions, Executor};
use ext_core::validate;
use ext_core::{ExtError, Value, ValueMap};
use ext_error::{BuiltinError, SourceLocation};
use neo4rs::{BoltType, ConfigBuilder, Graph, Query};

fn value_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(neo4rs::BoltNull),
        Value::Bool(b) => BoltType::Boolean(neo4rs::BoltBoolean::new(*b)),
        Value::String(s) => BoltType::String(neo4rs::BoltString::new(s)),
        // Parameters round-trip through JSON to downcast arbitrary-precision
        // numbers into native numeric kinds (§4.4).
        Value::Number(n) => match n.downcast() {
            ext_core::value::DowncastNumber::Int(i) => BoltType::Integer(neo4rs::BoltInteger::new(i)),
            ext_core::value::DowncastNumber::Float(f) => BoltType::Float(neo4rs::BoltFloat::new(f)),
        },
        Value::Array(items) | Value::Set(items) => BoltType::List(neo4rs::BoltList { value: items.iter().map(value_to_bolt).collect() }),
        Value::Object(m) => {
            let mut map = neo4rs::BoltMap::default();
            for (k, v) in m {
                map.put(neo4rs::BoltString::new(k), value_to_bolt(v));
            }
            BoltType::Map(map)
        }
    }
}

fn bolt_to_value(bolt: &BoltType) -> Value {
    match bolt {
        BoltType::Null(_) => Value::Null,
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::Number(ext_core::Number::from_i64(i.value)),
        BoltType::Float(f) => Value::Number(ext_core::Number::from_f64(f.value)),
        BoltType::String(s) => Value::String(s.value.clone()),
        BoltType::List(l) => Value::Array(l.value.iter().map(bolt_to_value).collect()),
        BoltType::Map(m) => {
            let mut out = ValueMap::new();
            for (k, v) in m.value.iter() {
                out.insert(k.value.clone(), bolt_to_value(v));
            }
            Value::Object(out)
        }
        other => Value::String(format!("{other:?}")),
    }
}

#[derive(Default)]
pub struct Neo4jExecutor;

impl Neo4jExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for Neo4jExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("neo4j.query expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            "neo4j.query",
            raw_request,
            &["uri", "query", "auth", "parameters", "cache", "cache_duration", "raise_error"],
            &["uri", "query", "auth"],
            &location,
            ctx,
            CacheOptions::with_default_ttl(Duration::from_secs(30)),
            |_validated| async move {
                let uri = validate::get_string("neo4j.query", raw_request, "uri", &location)?;
                let cypher = validate::get_string("neo4j.query", raw_request, "query", &location)?;
                let auth = validate::get_object("neo4j.query", raw_request, "auth", &location)?;
                let scheme = validate::get_string_or("neo4j.query", auth, "scheme", "none", &location)?;

                let mut config = ConfigBuilder::default().uri(&uri);
                config = match scheme.as_str() {
                    "basic" => {
                        let user = validate::get_string_or("neo4j.query", auth, "username", "", &location)?;
                        let pass = validate::get_string_or("neo4j.query", auth, "password", "", &location)?;
                        config.user(&user).password(&pass)
                    }
                    "bearer" => {
                        let token = validate::get_string_or("neo4j.query", auth, "token", "", &location)?;
                        config.user("").password(&token)
                    }
                    "kerberos" | "none" => config,
                    other => {
                        return Err(BuiltinError::new("neo4j.query", format!("unsupported auth scheme '{other}'"), location.clone()).into());
                    }
                };

                let graph = Graph::connect(config.build().map_err(|e| BuiltinError::new("neo4j.query", format!("invalid config: {e}"), location.clone()))?)
                    .await
                    .map_err(|e| BuiltinError::new("neo4j.query", format!("connecting: {e}"), location.clone()))?;

                let mut cypher_query = Query::new(cypher);
                if let Some(Value::Object(params)) = raw_request.get("parameters") {
                    for (k, v) in params {
                        cypher_query = cypher_query.param(k, value_to_bolt(v));
                    }
                }

                let mut stream = graph.execute(cypher_query).await.map_err(|e| BuiltinError::new("neo4j.query", format!("query failed: {e}"), location.clone()))?;

                let mut results = Vec::new();
                while let Some(row) = stream.next().await.map_err(|e| BuiltinError::new("neo4j.query", format!("streaming results: {e}"), location.clone()))? {
                    let mut out = ValueMap::new();
                    for key in row.keys() {
                        if let Ok(bolt) = row.get::<BoltType>(key) {
                            out.insert(key.to_string(), bolt_to_value(&bolt));
                        }
                    }
                    results.push(Value::Object(out));
                }

                let mut response = ValueMap::new();
                response.insert("results".to_string(), Value::Array(results));
                Ok(Value::Object(response))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bolt_round_trips_a_string_parameter() {
        let bolt = value_to_bolt(&Value::String("x".to_string()));
        assert_eq!(bolt_to_value(&bolt), Value::String("x".to_string()));
    }

    #[test]
    fn bolt_round_trips_an_integer_parameter() {
        let bolt = value_to_bolt(&Value::Number(ext_core::Number::from_i64(7)));
        assert_eq!(bolt_to_value(&bolt), Value::Number(ext_core::Number::from_i64(7)));
    }
}
