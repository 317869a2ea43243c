//! `sql.send` — §4.4 "Per-backend specifics: SQL builtin".
//!
//! Postgres, MySQL, and SQLite share `sqlx`'s driver-agnostic `Any` pool;
//! SQL Server has no `sqlx` driver and goes through `tiberius` behind a
//! `bb8` pool instead. Both paths share the same prepared-statement LRU
//! (`crate::pool::sql::StatementCache`) and the same connection-level
//! `Pool` keyed by `(driver, data_source_name, pool-sizing)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8_tiberius::ConnectionManager as TiberiusConnectionManager;
use ext_core::kernel::{run_builtin, BuiltinContext, CacheOptions, Executor};
use ext_core::validate;
use ext_core::{ExtError, Value, ValueMap};
use ext_error::{BuiltinError, SourceLocation};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::Executor as SqlxExecutor;
use sqlx::{Column, Row, TypeInfo};
use tiberius::{Config as TiberiusConfig, Query as TiberiusQuery, Row as TiberiusRow};

use crate::pool::sql::StatementCache;
use crate::pool::Pool;

const NAME: &str = "sql.send";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SqlPoolKey {
    driver: String,
    data_source_name: String,
    max_open_connections: i64,
    max_idle_connections: i64,
    connection_max_idle_time_ns: i64,
    connection_max_life_time_ns: i64,
}

/// `sqlx` has no SQL Server driver, so that dialect goes through `tiberius`
/// behind a `bb8` pool instead of the driver-agnostic `Any` pool the other
/// three dialects share.
enum SqlConnection {
    Any { pool: sqlx::AnyPool, statements: StatementCache<()> },
    SqlServer { pool: bb8::Pool<TiberiusConnectionManager> },
}

/// Backs `sql.send` for an evaluator process: one client pool shared by
/// every call, regardless of which `data_source_name` a given request
/// names (§4.3 "SQL: `(driver, data-source, pool-sizing parameters)` →
/// live connection + LRU of prepared statements").
pub struct SqlExecutor {
    pools: Pool<SqlPoolKey, SqlConnection>,
}

impl Default for SqlExecutor {
    fn default() -> Self {
        Self { pools: Pool::new() }
    }
}

impl SqlExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    async fn connect(key: &SqlPoolKey) -> Result<SqlConnection, ExtError> {
        if key.driver == "sqlserver" {
            return Self::connect_sqlserver(key).await;
        }

        sqlx::any::install_default_drivers();

        let mut opts = AnyPoolOptions::new();
        if key.max_open_connections > 0 {
            opts = opts.max_connections(key.max_open_connections as u32);
        }
        if key.max_idle_connections > 0 {
            opts = opts.min_connections(key.max_idle_connections as u32);
        }
        if key.connection_max_idle_time_ns > 0 {
            opts = opts.idle_timeout(Some(Duration::from_nanos(key.connection_max_idle_time_ns as u64)));
        }
        if key.connection_max_life_time_ns > 0 {
            opts = opts.max_lifetime(Some(Duration::from_nanos(key.connection_max_life_time_ns as u64)));
        }

        let pool = opts
            .connect(&key.data_source_name)
            .await
            .map_err(|e| BuiltinError::new(NAME, format!("connecting via {}: {e}", key.driver), SourceLocation::unknown()))?;

        Ok(SqlConnection::Any { pool, statements: StatementCache::new(crate::pool::sql::DEFAULT_MAX_PREPARED_STATEMENTS) })
    }

    async fn connect_sqlserver(key: &SqlPoolKey) -> Result<SqlConnection, ExtError> {
        let config = TiberiusConfig::from_ado_string(&key.data_source_name)
            .map_err(|e| BuiltinError::new(NAME, format!("invalid SQL Server connection string: {e}"), SourceLocation::unknown()))?;

        let manager = TiberiusConnectionManager::new(config);
        let mut builder = bb8::Pool::builder();
        if key.max_open_connections > 0 {
            builder = builder.max_size(key.max_open_connections as u32);
        }
        let pool = builder
            .build(manager)
            .await
            .map_err(|e| BuiltinError::new(NAME, format!("building SQL Server pool: {e}"), SourceLocation::unknown()))?;

        Ok(SqlConnection::SqlServer { pool })
    }
}

fn tiberius_column_value(row: &TiberiusRow, index: usize) -> Value {
    // tiberius has no generic "give me this column as whatever it is"
    // accessor, so each numeric/text/bool kind is probed in turn, same
    // order the teacher's own SQL Server adapter falls through.
    if let Ok(Some(v)) = row.try_get::<i32, _>(index) {
        return Value::Number(ext_core::Number::from_i64(v as i64));
    }
    if let Ok(Some(v)) = row.try_get::<i64, _>(index) {
        return Value::Number(ext_core::Number::from_i64(v));
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(index) {
        return Value::Number(ext_core::Number::from_f64(v));
    }
    if let Ok(Some(v)) = row.try_get::<bool, _>(index) {
        return Value::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(index) {
        return Value::String(v.to_string());
    }
    Value::Null
}

fn tiberius_rows_to_value(rows: &[TiberiusRow], row_object: bool) -> Value {
    let decoded: Vec<Value> = rows
        .iter()
        .map(|row| {
            if row_object {
                let mut m = ValueMap::new();
                for (i, col) in row.columns().iter().enumerate() {
                    m.insert(col.name().to_string(), tiberius_column_value(row, i));
                }
                Value::Object(m)
            } else {
                Value::Array((0..row.columns().len()).map(|i| tiberius_column_value(row, i)).collect())
            }
        })
        .collect();

    let mut response = ValueMap::new();
    response.insert("rows".to_string(), Value::Array(decoded));
    Value::Object(response)
}

fn bind_tiberius_args<'a>(mut query: TiberiusQuery<'a>, args: &'a [Value]) -> TiberiusQuery<'a> {
    for arg in args {
        match arg {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::String(s) => query.bind(s.as_str()),
            Value::Number(n) => match n.downcast() {
                ext_core::value::DowncastNumber::Int(i) => query.bind(i),
                ext_core::value::DowncastNumber::Float(f) => query.bind(f),
            },
            other => query.bind(other.as_str().map(str::to_string).unwrap_or_default()),
        };
    }
    query
}

fn column_value(row: &AnyRow, index: usize) -> Value {
    let column = row.column(index);
    // Text columns decode as strings even for drivers that would otherwise
    // hand back a byte sequence (spec.md §4.4's "text columns must be
    // decoded as strings" rule).
    match column.type_info().name() {
        "TEXT" | "VARCHAR" | "CHAR" | "NVARCHAR" | "CITEXT" => {
            match row.try_get::<Option<String>, _>(index) {
                Ok(Some(s)) => Value::String(s),
                Ok(None) => Value::Null,
                Err(_) => Value::Null,
            }
        }
        "INT8" | "INT4" | "INT2" | "BIGINT" | "INTEGER" | "SMALLINT" => match row.try_get::<Option<i64>, _>(index) {
            Ok(Some(n)) => Value::Number(ext_core::Number::from_i64(n)),
            Ok(None) => Value::Null,
            Err(_) => Value::Null,
        },
        "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE" | "NUMERIC" | "DECIMAL" => match row.try_get::<Option<f64>, _>(index) {
            Ok(Some(n)) => Value::Number(ext_core::Number::from_f64(n)),
            Ok(None) => Value::Null,
            Err(_) => Value::Null,
        },
        "BOOL" | "BOOLEAN" => match row.try_get::<Option<bool>, _>(index) {
            Ok(Some(b)) => Value::Bool(b),
            Ok(None) => Value::Null,
            Err(_) => Value::Null,
        },
        _ => match row.try_get::<Option<String>, _>(index) {
            Ok(Some(s)) => Value::String(s),
            Ok(None) => Value::Null,
            Err(_) => Value::Null,
        },
    }
}

fn rows_to_value(rows: &[AnyRow], row_object: bool) -> Value {
    let decoded: Vec<Value> = rows
        .iter()
        .map(|row| {
            if row_object {
                let mut m = ValueMap::new();
                for (i, col) in row.columns().iter().enumerate() {
                    m.insert(col.name().to_string(), column_value(row, i));
                }
                Value::Object(m)
            } else {
                Value::Array((0..row.columns().len()).map(|i| column_value(row, i)).collect())
            }
        })
        .collect();

    let mut response = ValueMap::new();
    response.insert("rows".to_string(), Value::Array(decoded));
    Value::Object(response)
}

fn bind_args<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    args: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::String(s) => query.bind(s.as_str()),
            Value::Number(n) => match n.downcast() {
                ext_core::value::DowncastNumber::Int(i) => query.bind(i),
                ext_core::value::DowncastNumber::Float(f) => query.bind(f),
            },
            other => query.bind(other.as_str().map(str::to_string).unwrap_or_default()),
        };
    }
    query
}

#[async_trait]
impl Executor for SqlExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("sql.send expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            NAME,
            raw_request,
            &[
                "driver",
                "data_source_name",
                "query",
                "args",
                "row_object",
                "max_open_connections",
                "max_idle_connections",
                "connection_max_idle_time",
                "connection_max_life_time",
                "max_prepared_statements",
                "cache",
                "cache_duration",
                "raise_error",
            ],
            &["driver", "data_source_name", "query"],
            &location,
            ctx,
            CacheOptions::with_default_ttl(Duration::from_secs(60)),
            |_validated| async move {
                let driver = validate::get_string(NAME, raw_request, "driver", &location)?;
                let data_source_name = validate::get_string(NAME, raw_request, "data_source_name", &location)?;
                let query = validate::get_string(NAME, raw_request, "query", &location)?;
                let row_object = validate::get_bool_or(NAME, raw_request, "row_object", false, &location)?;
                let max_open_connections = validate::get_int_or(NAME, raw_request, "max_open_connections", 0, &location)?;
                let max_idle_connections = validate::get_int_or(NAME, raw_request, "max_idle_connections", 0, &location)?;
                let connection_max_idle_time_ns = validate::get_duration(NAME, raw_request, "connection_max_idle_time", Duration::ZERO, &location)?.as_nanos() as i64;
                let connection_max_life_time_ns = validate::get_duration(NAME, raw_request, "connection_max_life_time", Duration::ZERO, &location)?.as_nanos() as i64;

                let args: Vec<Value> = match raw_request.get("args") {
                    Some(Value::Array(a)) => a.clone(),
                    None | Some(Value::Null) => Vec::new(),
                    Some(other) => {
                        return Err(ext_error::TypeError::WrongType {
                            builtin: NAME.to_string(),
                            key: "args".to_string(),
                            expected: "array".to_string(),
                            got: other.type_name().to_string(),
                            location: location.clone(),
                        }
                        .into())
                    }
                };

                let key = SqlPoolKey {
                    driver,
                    data_source_name,
                    max_open_connections,
                    max_idle_connections,
                    connection_max_idle_time_ns,
                    connection_max_life_time_ns,
                };

                let conn = conn_or_construct(self, key).await?;

                match &*conn {
                    SqlConnection::Any { pool, statements } => {
                        // Track the statement's lifecycle through the LRU even
                        // though `sqlx::query` re-parses text each call — the
                        // handle type is `()` here; a concrete per-driver
                        // prepared handle would replace it without touching
                        // this call site.
                        let query_text = query.clone();
                        let pool_for_prepare = pool.clone();
                        let (stmt, cache_hit) = statements
                            .acquire(&query, move || async move {
                                pool_for_prepare
                                    .prepare(&query_text)
                                    .await
                                    .map(|_| ())
                                    .map_err(|e| BuiltinError::new(NAME, format!("preparing statement: {e}"), location.clone()).into())
                            })
                            .await?;
                        tracing::Span::current().record("prepared_statement_hit", cache_hit);

                        let mut q = sqlx::query(&query);
                        q = bind_args(q, &args);
                        let result = q.fetch_all(pool).await;
                        // The handle type here is `()`, so there is nothing to
                        // physically close; a concrete per-driver prepared
                        // handle would finalize it here on the `true` return.
                        let _ = stmt.release();

                        let rows = result.map_err(|e| BuiltinError::new(NAME, format!("query failed: {e}"), location.clone()))?;
                        Ok(rows_to_value(&rows, row_object))
                    }
                    SqlConnection::SqlServer { pool } => {
                        let mut handle = pool
                            .get()
                            .await
                            .map_err(|e| BuiltinError::new(NAME, format!("acquiring SQL Server connection: {e}"), location.clone()))?;

                        let mut q = TiberiusQuery::new(query.as_str());
                        q = bind_tiberius_args(q, &args);
                        let stream = q
                            .query(&mut *handle)
                            .await
                            .map_err(|e| BuiltinError::new(NAME, format!("query failed: {e}"), location.clone()))?;
                        let rows = stream
                            .into_first_result()
                            .await
                            .map_err(|e| BuiltinError::new(NAME, format!("reading result set: {e}"), location.clone()))?;

                        Ok(tiberius_rows_to_value(&rows, row_object))
                    }
                }
            },
        )
        .await
    }
}

async fn conn_or_construct(executor: &SqlExecutor, key: SqlPoolKey) -> Result<Arc<SqlConnection>, ExtError> {
    executor.pools.get_or_construct(key.clone(), move || async move { SqlExecutor::connect(&key).await }).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_key_equality_ignores_nothing_but_the_named_fields() {
        let a = SqlPoolKey {
            driver: "sqlite".to_string(),
            data_source_name: "sqlite::memory:".to_string(),
            max_open_connections: 1,
            max_idle_connections: 1,
            connection_max_idle_time_ns: 0,
            connection_max_life_time_ns: 0,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
