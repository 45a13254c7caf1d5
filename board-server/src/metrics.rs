//! Prometheus metrics for the sync server.
//!
//! Provides metrics collection and a Prometheus-compatible `/metrics` endpoint.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

const WS_CONNECTIONS_ACTIVE: &str = "sketchboard_ws_connections_active";
const WS_MESSAGES_TOTAL: &str = "sketchboard_ws_messages_total";
const SESSIONS_ACTIVE: &str = "sketchboard_sessions_active";
const FANOUT_DELIVERIES_TOTAL: &str = "sketchboard_fanout_deliveries_total";
const DROPPED_EVENTS_TOTAL: &str = "sketchboard_dropped_events_total";
const VALIDATION_FAILURES_TOTAL: &str = "sketchboard_validation_failures_total";
const RATE_LIMITED_TOTAL: &str = "sketchboard_rate_limited_total";

/// Initialize metrics and return the Prometheus handle.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed
/// (e.g., if another recorder is already installed).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Increment active WebSocket connections.
pub fn inc_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement active WebSocket connections.
pub fn dec_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a WebSocket message.
///
/// # Arguments
///
/// * `direction` - "inbound" or "outbound"
/// * `msg_type` - Message type (e.g., "join_session", "update_canvas", "ping")
pub fn record_ws_message(direction: &str, msg_type: &str) {
    counter!(
        WS_MESSAGES_TOTAL,
        "direction" => direction.to_string(),
        "type" => msg_type.to_string()
    )
    .increment(1);
}

/// Update live session count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: usize) {
    gauge!(SESSIONS_ACTIVE).set(count as f64);
}

/// Record how many recipients one fan-out reached.
pub fn record_fanout(msg_type: &str, delivered: usize) {
    counter!(
        FANOUT_DELIVERIES_TOTAL,
        "type" => msg_type.to_string()
    )
    .increment(delivered as u64);
}

/// Record an event the engine dropped.
///
/// # Arguments
///
/// * `msg_type` - Event type
/// * `reason` - "unknown_session", "not_attached" or "closed_recipient"
pub fn record_dropped_event(msg_type: &str, reason: &str) {
    counter!(
        DROPPED_EVENTS_TOTAL,
        "type" => msg_type.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record an input validation failure.
///
/// # Arguments
///
/// * `validation_type` - Type of validation that failed (session_key, message_size, etc.)
pub fn record_validation_failure(validation_type: &str) {
    counter!(
        VALIDATION_FAILURES_TOTAL,
        "type" => validation_type.to_string()
    )
    .increment(1);
}

/// Record a rate-limited request.
pub fn record_rate_limited(source: &str) {
    counter!(
        RATE_LIMITED_TOTAL,
        "source" => source.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; they must not panic.
    #[test]
    fn test_recording_without_recorder() {
        inc_ws_connections();
        record_ws_message("inbound", "ping");
        set_active_sessions(3);
        record_fanout("update_canvas", 2);
        record_dropped_event("cursor_move", "unknown_session");
        record_validation_failure("session_key");
        record_rate_limited("websocket");
        dec_ws_connections();
    }
}
