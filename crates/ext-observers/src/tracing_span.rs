//! Per-builtin span naming helper.
//!
//! `ext_core::kernel::run_builtin` already opens an `info_span!("builtin",
//! name)` around every call; this module exists for callers (the umbrella
//! crate's registry wiring, the host adapter) that want to nest additional
//! spans — e.g. one span per evaluation wrapping every builtin call it
//! makes — using the same field names so traces line up.

use tracing::Span;

/// Opens a span for one whole evaluation (many builtin calls share it as
/// their parent), tagged with the host's request id.
pub fn evaluation_span(request_id: &str) -> Span {
    tracing::info_span!("evaluation", request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    #[test]
    fn evaluation_span_carries_the_request_id_field() {
        let subscriber = Registry::default().with(tracing_subscriber::fmt::layer().with_test_writer());
        with_default(subscriber, || {
            let span = evaluation_span("req-123");
            let _enter = span.enter();
            tracing::info!("inside evaluation span");
        });
    }
}
