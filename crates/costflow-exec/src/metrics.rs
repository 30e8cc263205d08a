//! Metric hooks.
//!
//! Emitted as trace-level `tracing` events; exporters belong to the binary
//! that installs the subscriber.

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::trace_span!("costflow", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}
