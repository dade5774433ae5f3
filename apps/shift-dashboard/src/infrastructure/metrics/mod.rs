//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Refresh**: Pipeline runs, failures, and duration
//! - **Records**: Malformed rows skipped by the record source
//! - **Subscribers**: Snapshot deliveries to push subscribers
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "shift_dashboard_refresh_total",
        "Total refresh pipeline runs by outcome"
    );
    describe_histogram!(
        "shift_dashboard_refresh_seconds",
        "Duration of successful refresh pipelines"
    );
    describe_counter!(
        "shift_dashboard_rows_skipped_total",
        "Malformed source rows skipped during refresh"
    );
    describe_counter!(
        "shift_dashboard_reports_sent_total",
        "Snapshot deliveries to push subscribers"
    );
    describe_gauge!(
        "shift_dashboard_subscribers",
        "Number of active push subscribers"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a successful refresh and its duration.
pub fn record_refresh_success(elapsed: Duration) {
    counter!("shift_dashboard_refresh_total", "outcome" => "success").increment(1);
    histogram!("shift_dashboard_refresh_seconds").record(elapsed.as_secs_f64());
}

/// Record a failed refresh.
pub fn record_refresh_failure() {
    counter!("shift_dashboard_refresh_total", "outcome" => "failure").increment(1);
}

/// Record malformed rows skipped by the record source.
pub fn record_rows_skipped(count: usize) {
    if count > 0 {
        counter!("shift_dashboard_rows_skipped_total").increment(count as u64);
    }
}

/// Record snapshot deliveries to push subscribers.
pub fn record_reports_sent(receivers: usize) {
    counter!("shift_dashboard_reports_sent_total").increment(receivers as u64);
}

/// Update the active push subscriber count.
pub fn set_subscribers(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("shift_dashboard_subscribers").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_absent_until_initialized() {
        // The recorder is process-global, so this only asserts the
        // accessor contract, not installation.
        let _ = get_metrics_handle();
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_refresh_success(Duration::from_millis(10));
        record_refresh_failure();
        record_rows_skipped(3);
        record_reports_sent(2);
        set_subscribers(1);
    }
}
