//! Prometheus metrics for group-service.
//!
//! Domain collectors live in the default `prometheus` registry. HTTP request
//! metrics recorded through the `metrics` facade by the shared middleware are
//! rendered by the installed exporter handle and appended to the same output.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use service_core::error::AppError;
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Hierarchy mutations by kind (insert, update, delete) and outcome.
pub static HIERARCHY_MUTATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "group_hierarchy_mutations_total",
        "Total number of hierarchy mutations",
        &["kind", "outcome"]
    )
    .expect("Failed to register hierarchy_mutations_total")
});

/// Membership change events handed to the emitter, by action.
pub static MEMBERSHIP_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "group_membership_events_total",
        "Total number of membership change events emitted",
        &["action"]
    )
    .expect("Failed to register membership_events_total")
});

/// Emission failures after a committed mutation.
pub static EVENT_PUBLISH_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "group_event_publish_failures_total",
        "Total number of membership events that could not be published",
        &["emitter"]
    )
    .expect("Failed to register event_publish_failures_total")
});

/// Enumeration duration by scope (user, users, all).
pub static ENUMERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "group_enumeration_duration_seconds",
        "Effective membership enumeration duration in seconds",
        &["scope"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register enumeration_duration")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "group_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "group_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Install the `metrics` recorder and force every collector into the registry.
///
/// Calling this more than once is harmless.
pub fn init_metrics() -> Result<(), AppError> {
    if METRICS_HANDLE.get().is_none() {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to install Prometheus recorder: {}",
                e
            ))
        })?;
        let _ = METRICS_HANDLE.set(handle);
    }

    Lazy::force(&HIERARCHY_MUTATIONS_TOTAL);
    Lazy::force(&MEMBERSHIP_EVENTS_TOTAL);
    Lazy::force(&EVENT_PUBLISH_FAILURES_TOTAL);
    Lazy::force(&ENUMERATION_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&ERRORS_TOTAL);
    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    output.push_str(&encoder.encode_to_string(&metric_families).unwrap_or_default());
    output
}
