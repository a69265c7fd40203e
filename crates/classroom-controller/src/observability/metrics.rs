//! Metric definitions for the classroom controller.
//!
//! Prometheus naming: `classroom_` prefix, `_total` counters, `_seconds`
//! histograms. See the module table in [`super`] for label bounds.

use axum::{routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle that renders
/// `/metrics`.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Operations include collaborator round trips; bucket up to a few seconds.
        .set_buckets_for_metric(
            Matcher::Prefix("classroom_operation".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set operation duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Router serving `GET /metrics` in Prometheus text format.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

/// Metric: `classroom_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("classroom_rooms_active").set(count as f64);
}

/// Record one completed public operation.
///
/// Metrics: `classroom_operations_total{operation,status}`,
/// `classroom_operation_duration_seconds{operation}`
pub fn record_operation(operation: &'static str, status: &'static str, duration: Duration) {
    counter!("classroom_operations_total", "operation" => operation, "status" => status)
        .increment(1);
    histogram!("classroom_operation_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}

/// Metric: `classroom_tickets_created_total{kind}`
pub fn record_ticket_created(kind: &'static str) {
    counter!("classroom_tickets_created_total", "kind" => kind).increment(1);
}

/// Metric: `classroom_tickets_resolved_total{kind,outcome}`
pub fn record_ticket_resolved(kind: &'static str, outcome: &'static str) {
    counter!("classroom_tickets_resolved_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}

/// Metric: `classroom_notifications_failed_total{delivery}`
pub fn record_notification_failed(delivery: &'static str) {
    counter!("classroom_notifications_failed_total", "delivery" => delivery).increment(1);
}

/// Metric: `classroom_actor_mailbox_depth{actor_type}`
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("classroom_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}

/// Metric: `classroom_actor_panics_total{actor_type}`
///
/// Any non-zero value is a bug.
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("classroom_actor_panics_total", "actor_type" => actor_type).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::DebuggingRecorder;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_rooms_active(3);
            record_operation("join", "success", Duration::from_millis(4));
            record_ticket_created("speech_request");
            record_ticket_resolved("speech_request", "approved");
            record_notification_failed("best_effort");
            set_actor_mailbox_depth("room", 12);
            record_actor_panic("room");
        });

        let names: HashSet<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        for expected in [
            "classroom_rooms_active",
            "classroom_operations_total",
            "classroom_operation_duration_seconds",
            "classroom_tickets_created_total",
            "classroom_tickets_resolved_total",
            "classroom_notifications_failed_total",
            "classroom_actor_mailbox_depth",
            "classroom_actor_panics_total",
        ] {
            assert!(names.contains(expected), "missing metric {expected}");
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        set_rooms_active(0);
        record_operation("leave", "not_found", Duration::ZERO);
        record_ticket_resolved("role_upgrade", "expired");
    }
}
