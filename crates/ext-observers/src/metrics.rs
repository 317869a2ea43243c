//! Builtin metrics sink (spec.md §2 item 8, §11 "Statement-cache metrics").
//!
//! Behind the `metrics` feature this wires a real `prometheus`-backed
//! `MetricsSink` impl, registered against `prometheus::default_registry()`
//! the same way the teacher's `fraiseql_observers::metrics::registry`
//! registers its own counters — one global `OnceLock` singleton, one field
//! per metric. Without the feature, `ext-core::NoopMetrics` is the only
//! sink available.

use std::time::Duration;

use ext_core::kernel::MetricsSink;

#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "metrics")]
use prometheus::{HistogramVec, IntCounterVec, Opts, Result as PrometheusResult};

#[cfg(feature = "metrics")]
static GLOBAL_REGISTRY: OnceLock<BuiltinMetrics> = OnceLock::new();

/// Prometheus-backed implementation of `ext_core::kernel::MetricsSink`, plus
/// the prepared-statement counters `ext-db`'s SQL builtin reports into
/// directly (they have no seam on `MetricsSink` since they're not per-call
/// latency/cache events).
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct BuiltinMetrics {
    call_latency_seconds: HistogramVec,
    cache_hits_total: IntCounterVec,
    cache_misses_total: IntCounterVec,
    sql_statement_cache_hits_total: IntCounterVec,
    sql_statement_cache_misses_total: IntCounterVec,
}

#[cfg(feature = "metrics")]
impl BuiltinMetrics {
    pub fn new() -> PrometheusResult<Self> {
        let registry = prometheus::default_registry();

        let call_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("ext_builtin_call_latency_seconds", "Builtin call latency in seconds"),
            &["builtin"],
        )?;
        registry.register(Box::new(call_latency_seconds.clone()))?;

        let cache_hits_total = IntCounterVec::new(Opts::new("ext_builtin_cache_hits_total", "Builtin cache hits"), &["builtin", "tier"])?;
        registry.register(Box::new(cache_hits_total.clone()))?;

        let cache_misses_total = IntCounterVec::new(Opts::new("ext_builtin_cache_misses_total", "Builtin cache misses"), &["builtin"])?;
        registry.register(Box::new(cache_misses_total.clone()))?;

        let sql_statement_cache_hits_total =
            IntCounterVec::new(Opts::new("ext_sql_statement_cache_hits_total", "Prepared statement cache hits"), &["data_source"])?;
        registry.register(Box::new(sql_statement_cache_hits_total.clone()))?;

        let sql_statement_cache_misses_total =
            IntCounterVec::new(Opts::new("ext_sql_statement_cache_misses_total", "Prepared statement cache misses"), &["data_source"])?;
        registry.register(Box::new(sql_statement_cache_misses_total.clone()))?;

        Ok(Self {
            call_latency_seconds,
            cache_hits_total,
            cache_misses_total,
            sql_statement_cache_hits_total,
            sql_statement_cache_misses_total,
        })
    }

    pub fn global() -> &'static Self {
        GLOBAL_REGISTRY.get_or_init(|| Self::new().expect("metrics registration is infallible after the first call"))
    }

    pub fn record_sql_statement_cache_hit(&self, data_source: &str) {
        self.sql_statement_cache_hits_total.with_label_values(&[data_source]).inc();
    }

    pub fn record_sql_statement_cache_miss(&self, data_source: &str) {
        self.sql_statement_cache_misses_total.with_label_values(&[data_source]).inc();
    }
}

#[cfg(feature = "metrics")]
impl MetricsSink for BuiltinMetrics {
    fn record_latency(&self, builtin: &str, duration: Duration) {
        self.call_latency_seconds.with_label_values(&[builtin]).observe(duration.as_secs_f64());
    }

    fn record_cache_hit(&self, builtin: &str, cross_query: bool) {
        let tier = if cross_query { "cross_query" } else { "per_query" };
        self.cache_hits_total.with_label_values(&[builtin, tier]).inc();
    }

    fn record_cache_miss(&self, builtin: &str) {
        self.cache_misses_total.with_label_values(&[builtin]).inc();
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    // Both tests touch `prometheus::default_registry()`, a process-wide
    // singleton; each metric name may only be registered once, so the
    // whole suite shares the one `global()` instance rather than each test
    // constructing its own via `new()`.

    #[test]
    fn global_singleton_survives_repeated_calls() {
        let a = BuiltinMetrics::global() as *const BuiltinMetrics;
        let b = BuiltinMetrics::global() as *const BuiltinMetrics;
        assert_eq!(a, b);
    }

    #[test]
    fn recording_does_not_panic() {
        let metrics = BuiltinMetrics::global();
        metrics.record_latency("sql.send", Duration::from_millis(5));
        metrics.record_cache_hit("sql.send", true);
        metrics.record_cache_miss("sql.send");
        metrics.record_sql_statement_cache_hit("postgres://db");
    }
}
