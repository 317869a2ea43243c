//! `redis.query` — §4.4 "Key-value store". No pooling: spec.md §4.3 calls
//! out connection cost as low enough that the key-value backend is
//! "constructed per call from `(address, username, password, db-index,
//! protocol)` with no pooling".

use std::time::Duration;

use async_trait::async_trait;
use ext_core::kernel::{run_builtin, BuiltinContext, CacheOptions, Executor};
use ext_core::validate;
use ext_core::{ExtError, Value, ValueMap};
use ext_error::{BuiltinError, SourceLocation};
use redis::aio::ConnectionManager;
use redis::{Cmd, RedisResult, Value as RedisValue};

const NAME: &str = "redis.query";

/// Only read-only commands are dispatched — `redis.query` is a data source,
/// not a side-effecting sink (§4.4).
const ALLOWED_COMMANDS: &[&str] = &[
    "GET", "MGET", "STRLEN", "EXISTS", "TTL", "PTTL", "TYPE", "HGET", "HGETALL", "HMGET", "HKEYS", "HVALS", "HLEN",
    "HEXISTS", "LRANGE", "LLEN", "LINDEX", "SMEMBERS", "SISMEMBER", "SCARD", "ZRANGE", "ZSCORE", "ZRANK", "ZCARD",
    "ZCOUNT", "KEYS", "SCAN", "DBSIZE", "PING",
];

fn redis_value_to_value(v: &RedisValue) -> Value {
    match v {
        RedisValue::Nil => Value::Null,
        RedisValue::Int(i) => Value::Number(ext_core::Number::from_i64(*i)),
        RedisValue::Double(f) => Value::Number(ext_core::Number::from_f64(*f)),
        RedisValue::BulkString(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        RedisValue::SimpleString(s) => Value::String(s.clone()),
        RedisValue::Okay => Value::Bool(true),
        RedisValue::Boolean(b) => Value::Bool(*b),
        RedisValue::Array(items) | RedisValue::Set(items) => Value::Array(items.iter().map(redis_value_to_value).collect()),
        RedisValue::Map(pairs) => {
            let mut out = ValueMap::new();
            for (k, v) in pairs {
                if let Value::String(key) = redis_value_to_value(k) {
                    out.insert(key, redis_value_to_value(v));
                }
            }
            Value::Object(out)
        }
        _ => Value::Null,
    }
}

#[derive(Default)]
pub struct RedisExecutor;

impl RedisExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for RedisExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("redis.query expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            NAME,
            raw_request,
            &["addr", "command", "args", "auth", "db", "cache", "cache_duration", "raise_error"],
            &["addr", "command", "args"],
            &location,
            ctx,
            CacheOptions::with_default_ttl(Duration::from_secs(10)),
            |_validated| async move {
                let addr = validate::get_string(NAME, raw_request, "addr", &location)?;
                let command = validate::get_string(NAME, raw_request, "command", &location)?;
                let command_upper = command.to_ascii_uppercase();
                if !ALLOWED_COMMANDS.contains(&command_upper.as_str()) {
                    return Err(BuiltinError::new(NAME, format!("command '{command}' is not allow-listed for redis.query"), location.clone()).into());
                }

                let args = match raw_request.get("args") {
                    Some(Value::Array(a)) => a.clone(),
                    _ => Vec::new(),
                };
                let auth = validate::get_object_or(NAME, raw_request, "auth", &ValueMap::new(), &location)?;
                let db = validate::get_int_or(NAME, raw_request, "db", 0, &location)?;

                let mut url = format!("redis://{addr}/{db}");
                if let Some(password) = auth.get("password").and_then(Value::as_str) {
                    let username = auth.get("username").and_then(Value::as_str).unwrap_or("default");
                    url = format!("redis://{username}:{password}@{addr}/{db}");
                }

                let client = redis::Client::open(url).map_err(|e| BuiltinError::new(NAME, format!("invalid redis address: {e}"), location.clone()))?;
                let mut conn = ConnectionManager::new(client).await.map_err(|e| BuiltinError::new(NAME, format!("connecting: {e}"), location.clone()))?;

                let mut cmd = Cmd::new();
                cmd.arg(&command_upper);
                for arg in &args {
                    match arg {
                        // Numeric args received as high-precision numbers are
                        // downcast to double before dispatch, always — unlike
                        // neo4j's native-numeric-kinds handling, redis.query
                        // never sends an integral arg as an integer (§4.4).
                        Value::Number(n) => {
                            cmd.arg(n.as_f64().unwrap_or(0.0));
                        }
                        Value::String(s) => { cmd.arg(s); }
                        Value::Bool(b) => { cmd.arg(if *b { 1 } else { 0 }); }
                        other => { cmd.arg(other.as_str().unwrap_or_default()); }
                    }
                }

                let reply: RedisResult<RedisValue> = cmd.query_async(&mut conn).await;
                let reply = reply.map_err(|e| BuiltinError::new(NAME, format!("command failed: {e}"), location.clone()))?;

                let mut out = ValueMap::new();
                out.insert("results".to_string(), redis_value_to_value(&reply));
                Ok(Value::Object(out))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_rejects_write_commands() {
        assert!(!ALLOWED_COMMANDS.contains(&"SET"));
        assert!(!ALLOWED_COMMANDS.contains(&"DEL"));
    }

    #[test]
    fn allow_list_accepts_get_and_hgetall() {
        assert!(ALLOWED_COMMANDS.contains(&"GET"));
        assert!(ALLOWED_COMMANDS.contains(&"HGETALL"));
    }
}
