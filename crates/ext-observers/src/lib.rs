//! Metrics, tracing spans, and the decision-log sink contract for the
//! builtin framework. Kept separate from `ext-core` so the kernel never
//! needs a `prometheus` dependency of its own.

pub mod decision_log;
pub mod metrics;
pub mod tracing_span;
