//! Builtin Kernel — §4.4.
//!
//! The shared skeleton every builtin follows: validate → extract shared
//! fields (`raise_error`, `cache`, `cache_duration`) → cache check → acquire
//! client and execute (backend-specific, supplied by the caller as a
//! closure) → build response shape → cache insert → emit metrics → return.
//! Concrete builtins (`sql.send`, `dynamodb.get`, …) call [`run_builtin`]
//! with their own validation schema and execution closure; they never
//! reimplement the cache/error/metrics plumbing themselves.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ext_error::{BuiltinError, CancellationError, ExtError, SourceLocation};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::{CacheSubstrate, CrossQueryCache, PerQueryCache};
use crate::validate::{self, Validated};
use crate::value::{Value, ValueMap};

/// Per-request metrics sink hook point (spec.md §2 item 8, §11 statement
/// cache counters). A concrete `prometheus`-backed implementation lives in
/// `ext-observers`; `ext-core` only defines the seam so it never needs to
/// depend on the observers crate.
pub trait MetricsSink: Send + Sync {
    fn record_latency(&self, builtin: &str, duration: Duration);
    fn record_cache_hit(&self, builtin: &str, cross_query: bool);
    fn record_cache_miss(&self, builtin: &str);
}

/// Discards every observation. Used as the default sink in tests and by
/// callers that have not wired a real sink yet.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_latency(&self, _builtin: &str, _duration: Duration) {}
    fn record_cache_hit(&self, _builtin: &str, _cross_query: bool) {}
    fn record_cache_miss(&self, _builtin: &str) {}
}

/// Per-evaluation state shared by every builtin call the VM makes during
/// one query (spec.md §5: "shares pools and the cross-query cache with all
/// others" but per-query state — the per-query cache — is scoped to this
/// single evaluation and discarded when it ends).
pub struct BuiltinContext {
    pub cancellation: CancellationToken,
    /// The host's current-time field, in nanoseconds since epoch — never
    /// the system clock, so time-mocked tests stay reproducible.
    pub now_nanos: i64,
    pub cross_query: Arc<dyn CrossQueryCache>,
    pub per_query: Mutex<PerQueryCache>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl BuiltinContext {
    pub fn new(cross_query: Arc<dyn CrossQueryCache>, now_nanos: i64) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            now_nanos,
            cross_query,
            per_query: Mutex::new(PerQueryCache::new()),
            metrics: Arc::new(NoopMetrics),
        }
    }
}

/// Binds a builtin's executor into the registry's VM dispatch table
/// (spec.md §4.6 "implementation registration").
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    pub cross_query_capable: bool,
    pub default_ttl: Duration,
}

impl CacheOptions {
    pub const fn disabled() -> Self {
        Self { cross_query_capable: false, default_ttl: Duration::from_secs(0) }
    }

    pub const fn with_default_ttl(default_ttl: Duration) -> Self {
        Self { cross_query_capable: true, default_ttl }
    }
}

fn error_response_value(builtin: &str, err: &ExtError, location: &SourceLocation) -> Value {
    let mut inner = ValueMap::new();
    inner.insert("message".to_string(), Value::String(err.to_string()));

    // `code` here is the backend-specific diagnostic (SQL state, AWS error
    // code, HTTP status), distinct from `error_code()`'s internal taxonomy
    // tag — only `BuiltinError` carries one.
    if let ExtError::Builtin(BuiltinError { code, severity, detail, .. }) = err {
        if let Some(code) = code {
            inner.insert("code".to_string(), Value::String(code.clone()));
        }
        if let Some(severity) = severity {
            inner.insert("severity".to_string(), Value::String(severity.clone()));
        }
        if let Some(detail) = detail {
            inner.insert("detail".to_string(), Value::String(detail.clone()));
        }
    }

    inner.insert("kind".to_string(), Value::String(err.error_code().to_string()));
    inner.insert("builtin".to_string(), Value::String(builtin.to_string()));
    inner.insert("location".to_string(), Value::String(location.to_string()));

    let mut outer = ValueMap::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

/// Inverse of [`error_response_value`] for the one case that needs it: a
/// per-query cache hit on a captured error, with `raise_error: true`, must
/// surface the original failure rather than a generic placeholder (the
/// per-query cache is always consulted, error entries included — spec.md
/// §3/§4.2). `ExtError` itself isn't `Clone` (the backend-agnostic
/// `Internal` variant can carry a boxed source error), so the cache keeps
/// only the rendered `Value` and this rebuilds an equivalent `BuiltinError`
/// from it rather than storing the error twice.
fn reconstruct_cached_error(name: &str, error_value: &Value, location: &SourceLocation) -> ExtError {
    let fallback = || BuiltinError::new(name, "cached error replayed within this evaluation", location.clone()).into();

    let Some(Value::Object(inner)) = error_value.as_object().and_then(|outer| outer.get("error")) else {
        return fallback();
    };
    let Some(kind) = inner.get("kind").and_then(Value::as_str) else {
        return fallback();
    };
    if kind != "builtin_error" {
        // A non-`BuiltinError` kind (type/cancellation/compilation/config/
        // internal) was never downgradable in the first place, so it could
        // only have been cached here as a `raise_error: false` response
        // replayed verbatim; surface its message as-is.
        let message = inner.get("message").and_then(Value::as_str).unwrap_or("cached error replayed within this evaluation");
        return ExtError::internal(message.to_string());
    }

    let builtin = inner.get("builtin").and_then(Value::as_str).unwrap_or(name);
    let raw_message = inner.get("message").and_then(Value::as_str).unwrap_or("cached error replayed within this evaluation");
    // `message` was rendered from `BuiltinError`'s `"{builtin}: {message}"`
    // Display impl; strip that prefix back off so reconstructing doesn't
    // double it up.
    let message = raw_message.strip_prefix(&format!("{builtin}: ")).unwrap_or(raw_message);

    let mut rebuilt = BuiltinError::new(builtin, message, location.clone());
    if let Some(code) = inner.get("code").and_then(Value::as_str) {
        rebuilt = rebuilt.with_code(code);
    }
    if let Some(severity) = inner.get("severity").and_then(Value::as_str) {
        rebuilt = rebuilt.with_severity(severity);
    }
    if let Some(detail) = inner.get("detail").and_then(Value::as_str) {
        rebuilt = rebuilt.with_detail(detail);
    }
    rebuilt.into()
}

/// Runs the shared kernel contract around a backend-specific execution
/// closure.
///
/// `body` receives the validated request and returns the builtin's success
/// value (e.g. `{row: …}`); errors from `body` are classified through the
/// standard `raise_error`/downgrade policy (§7) before this function
/// returns.
#[allow(clippy::too_many_arguments)]
pub async fn run_builtin<F, Fut>(
    name: &'static str,
    raw_request: &ValueMap,
    allowed: &[&str],
    required: &[&str],
    location: &SourceLocation,
    ctx: &BuiltinContext,
    cache_opts: CacheOptions,
    body: F,
) -> Result<Value, ExtError>
where
    F: FnOnce(Validated) -> Fut,
    Fut: Future<Output = Result<Value, ExtError>>,
{
    // `prepared_statement_hit` is declared empty here so `sql.send` (the
    // only builtin with a statement cache) can record into it later;
    // every other builtin simply never touches the field.
    let span = tracing::info_span!("builtin", name, prepared_statement_hit = tracing::field::Empty);
    async move { run_builtin_inner(name, raw_request, allowed, required, location, ctx, cache_opts, body).await }
        .instrument(span)
        .await
}

#[allow(clippy::too_many_arguments)]
async fn run_builtin_inner<F, Fut>(
    name: &'static str,
    raw_request: &ValueMap,
    allowed: &[&str],
    required: &[&str],
    location: &SourceLocation,
    ctx: &BuiltinContext,
    cache_opts: CacheOptions,
    body: F,
) -> Result<Value, ExtError>
where
    F: FnOnce(Validated) -> Fut,
    Fut: Future<Output = Result<Value, ExtError>>,
{
    if ctx.cancellation.is_cancelled() {
        return Err(CancellationError::new(name).into());
    }

    let validated = validate::validate(name, raw_request, allowed, required, location)?;

    let raise_error = validate::get_bool_or(name, raw_request, "raise_error", true, location)?;
    let cache_requested = validate::get_bool_or(name, raw_request, "cache", false, location)?;
    let cache_enabled = cache_opts.cross_query_capable && cache_requested;
    let ttl = validate::get_duration(name, raw_request, "cache_duration", cache_opts.default_ttl, location)?;

    let check = {
        let mut per_query = ctx.per_query.lock();
        let mut substrate = CacheSubstrate { cross_query: ctx.cross_query.as_ref(), per_query: &mut per_query };
        substrate.check(raw_request, cache_enabled, name, ctx.now_nanos)
    };

    if let Some(outcome) = check.outcome {
        ctx.metrics.record_cache_hit(name, cache_enabled);
        return match outcome {
            crate::cache::CachedOutcome::Success(value) => Ok(value),
            crate::cache::CachedOutcome::Error(error_value) => {
                if raise_error {
                    Err(reconstruct_cached_error(name, &error_value, location))
                } else {
                    Ok(error_value)
                }
            }
        };
    }
    ctx.metrics.record_cache_miss(name);

    let start = std::time::Instant::now();
    let outcome = body(validated).await;
    ctx.metrics.record_latency(name, start.elapsed());

    if ctx.cancellation.is_cancelled() {
        return Err(CancellationError::new(name).into());
    }

    match outcome {
        Ok(value) => {
            let mut per_query = ctx.per_query.lock();
            let mut substrate = CacheSubstrate { cross_query: ctx.cross_query.as_ref(), per_query: &mut per_query };
            substrate.insert(raw_request, Some(&value), None, cache_enabled, ttl, name, ctx.now_nanos);
            Ok(value)
        }
        Err(err) => {
            let downgrade = !raise_error && err.is_downgradable();
            let error_value = error_response_value(name, &err, location);

            {
                let mut per_query = ctx.per_query.lock();
                let mut substrate = CacheSubstrate { cross_query: ctx.cross_query.as_ref(), per_query: &mut per_query };
                substrate.insert(raw_request, None, Some(&error_value), cache_enabled, ttl, name, ctx.now_nanos);
            }

            if downgrade {
                Ok(error_value)
            } else {
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CrossQueryCacheConfig, LruCrossQueryCache};
    use serde_json::json;

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
    async fn successful_call_populates_cache_and_returns_value() {
        let context = ctx();
        let request = req(json!({"query": "select 1", "cache": true}));
        let location = SourceLocation::unknown();

        let first = run_builtin("sql.send", &request, &["query", "cache", "raise_error", "cache_duration"], &["query"], &location, &context, CacheOptions::with_default_ttl(Duration::from_secs(60)), |_v| async {
            Ok(Value::String("ok".to_string()))
        })
        .await
        .unwrap();
        assert_eq!(first, Value::String("ok".to_string()));

        let second = run_builtin("sql.send", &request, &["query", "cache", "raise_error", "cache_duration"], &["query"], &location, &context, CacheOptions::with_default_ttl(Duration::from_secs(60)), |_v| async {
            panic!("body should not run on a cache hit")
        })
        .await
        .unwrap();
        assert_eq!(second, Value::String("ok".to_string()));
    }

    #[tokio::test]
    async fn raise_error_false_downgrades_builtin_error_to_data() {
        let context = ctx();
        let request = req(json!({"query": "select fail()", "raise_error": false}));
        let location = SourceLocation::unknown();

        let result = run_builtin("sql.send", &request, &["query", "raise_error"], &["query"], &location, &context, CacheOptions::disabled(), |_v| async {
            Err(BuiltinError::new("sql.send", "boom", SourceLocation::unknown()).into())
        })
        .await
        .unwrap();

        let Value::Object(m) = result else { panic!() };
        assert!(m.contains_key("error"));
    }

    #[tokio::test]
    async fn raise_error_true_surfaces_the_error() {
        let context = ctx();
        let request = req(json!({"query": "select fail()"}));
        let location = SourceLocation::unknown();

        let result = run_builtin("sql.send", &request, &["query", "raise_error"], &["query"], &location, &context, CacheOptions::disabled(), |_v| async {
            Err(BuiltinError::new("sql.send", "boom", SourceLocation::unknown()).into())
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cached_error_replay_preserves_the_original_message_and_code() {
        let context = ctx();
        let request = req(json!({"query": "select fail()"}));
        let location = SourceLocation::unknown();

        // First call fails and propagates, but the per-query cache still
        // captures the error outcome (insert runs regardless of
        // raise_error — only the return path differs).
        let first = run_builtin("sql.send", &request, &["query", "raise_error"], &["query"], &location, &context, CacheOptions::disabled(), |_v| async {
            Err(BuiltinError::new("sql.send", "connection refused", SourceLocation::unknown()).with_code("08001").into())
        })
        .await;
        assert!(first.is_err());

        // Second call, identical request: must hit the per-query cache and
        // replay the original failure, not a generic placeholder message.
        let second = run_builtin("sql.send", &request, &["query", "raise_error"], &["query"], &location, &context, CacheOptions::disabled(), |_v| async {
            panic!("body should not run on a cache hit")
        })
        .await;

        let err = second.expect_err("cached error must still raise");
        let ExtError::Builtin(BuiltinError { message, code, .. }) = err else { panic!("expected a BuiltinError") };
        assert_eq!(message, "connection refused");
        assert_eq!(code.as_deref(), Some("08001"));
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits_before_validation() {
        let context = ctx();
        context.cancellation.cancel();
        let request = req(json!({"query": "select 1"}));
        let location = SourceLocation::unknown();

        let result = run_builtin("sql.send", &request, &["query"], &["query"], &location, &context, CacheOptions::disabled(), |_v| async {
            panic!("body should not run once cancelled")
        })
        .await;

        assert!(matches!(result, Err(ExtError::Cancelled(_))));
    }
}
