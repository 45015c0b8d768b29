//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `grafana_operator_reconciliations_total{controller}` - Reconcile invocations per controller
//! - `grafana_operator_reconciliation_errors_total{controller}` - Reconciles that returned an error
//! - `grafana_operator_reconciliation_duration_seconds{controller}` - Reconcile duration
//! - `grafana_operator_grafana_api_requests_total{operation}` - Calls to Grafana and grafana.com
//! - `grafana_operator_grafana_api_errors_total{operation}` - Failed calls
//! - `grafana_operator_grafana_api_duration_seconds{operation}` - Call duration
//! - `grafana_operator_instance_stage{instance}` - Position of the last stage run per instance
//! - `grafana_operator_artifact_instance_failures_total{kind}` - Per-instance artifact sync failures

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "grafana_operator_reconciliations_total",
            "Total number of reconciliations by controller",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "grafana_operator_reconciliation_errors_total",
            "Total number of reconciliation errors by controller",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "grafana_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static GRAFANA_API_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "grafana_operator_grafana_api_requests_total",
            "Total number of Grafana API requests by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create GRAFANA_API_REQUESTS_TOTAL metric - this should never happen")
});

static GRAFANA_API_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "grafana_operator_grafana_api_errors_total",
            "Total number of failed Grafana API requests by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create GRAFANA_API_ERRORS_TOTAL metric - this should never happen")
});

static GRAFANA_API_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "grafana_operator_grafana_api_duration_seconds",
            "Duration of Grafana API requests in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["operation"],
    )
    .expect("Failed to create GRAFANA_API_DURATION metric - this should never happen")
});

static INSTANCE_STAGE: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "grafana_operator_instance_stage",
            "Position of the last provisioning stage run for each instance (8 = complete)",
        ),
        &["instance"],
    )
    .expect("Failed to create INSTANCE_STAGE metric - this should never happen")
});

static ARTIFACT_INSTANCE_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "grafana_operator_artifact_instance_failures_total",
            "Total number of per-instance artifact sync failures by artifact kind",
        ),
        &["kind"],
    )
    .expect("Failed to create ARTIFACT_INSTANCE_FAILURES_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(GRAFANA_API_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GRAFANA_API_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GRAFANA_API_DURATION.clone()))?;
    REGISTRY.register(Box::new(INSTANCE_STAGE.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_INSTANCE_FAILURES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors(controller: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[controller])
        .inc();
}

pub fn observe_reconciliation_duration(controller: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[controller])
        .observe(duration);
}

pub fn increment_grafana_api_requests(operation: &str) {
    GRAFANA_API_REQUESTS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn increment_grafana_api_errors(operation: &str) {
    GRAFANA_API_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn observe_grafana_api_duration(operation: &str, duration: f64) {
    GRAFANA_API_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn set_instance_stage(instance: &str, position: usize) {
    INSTANCE_STAGE
        .with_label_values(&[instance])
        .set(position as i64);
}

/// Drop an instance's stage series; false when there was none
pub fn remove_instance_stage(instance: &str) -> bool {
    INSTANCE_STAGE.remove_label_values(&[instance]).is_ok()
}

pub fn increment_artifact_instance_failures(kind: &str) {
    ARTIFACT_INSTANCE_FAILURES_TOTAL
        .with_label_values(&[kind])
        .inc();
}
