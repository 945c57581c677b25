//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use canvax_core::protocol::EventKind;

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

pub fn record_session_created() {
    metrics::counter!("canvas_sessions_created_total").increment(1);
}

/// Record a client attaching through `transport`.
pub fn record_client_connect(transport: &str) {
    let labels = [("transport", transport.to_string())];
    metrics::gauge!("canvas_clients_active", &labels).increment(1.0);
}

pub fn record_client_disconnect(transport: &str) {
    let labels = [("transport", transport.to_string())];
    metrics::gauge!("canvas_clients_active", &labels).decrement(1.0);
}

/// Record an accepted event by its classified kind. The raw `type` tag is
/// client-chosen and never used as a label.
pub fn record_event(kind: EventKind) {
    let labels = [("kind", kind.as_str())];
    metrics::counter!("canvas_events_total", &labels).increment(1);
}

/// Record an inbound frame discarded as undecodable.
pub fn record_decode_error() {
    metrics::counter!("canvas_decode_errors_total").increment(1);
}

/// Record feed events a slow client missed.
pub fn record_feed_lag(skipped: u64) {
    metrics::counter!("canvas_feed_dropped_total").increment(skipped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // The metrics crate falls back to a no-op recorder when none is installed.
        record_session_created();
        record_client_connect("websocket");
        record_client_disconnect("websocket");
        record_event(EventKind::Stroke);
        record_event(EventKind::Clear);
        record_decode_error();
        record_feed_lag(5);
    }
}
