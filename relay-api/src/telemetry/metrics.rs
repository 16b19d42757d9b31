//! Prometheus Metrics Definitions
//!
//! Defines all RELAY metrics with their labels and exposes a /metrics
//! endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use relay_core::{EntityId, EntityType};
use relay_storage::ChangeObserver;

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0,
];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<RelayMetrics>> = Lazy::new(RelayMetrics::new);

/// Container for all RELAY metrics.
#[derive(Clone)]
pub struct RelayMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Committed entity changes - labels: entity
    pub entity_changes_total: CounterVec,

    /// Pending handoffs rejected by the expiry sweep
    pub handoffs_expired_total: Counter,

    /// Expiry sweeps that failed before resolving any handoff
    pub expiry_sweep_errors_total: Counter,
}

impl RelayMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "relay_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_failed("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "relay_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_failed("http_request_duration_seconds", e))?,

            entity_changes_total: register_counter_vec!(
                "relay_entity_changes_total",
                "Total committed changes per entity type",
                &["entity"]
            )
            .map_err(|e| registration_failed("entity_changes_total", e))?,

            handoffs_expired_total: register_counter!(
                "relay_handoffs_expired_total",
                "Total pending handoffs rejected as expired"
            )
            .map_err(|e| registration_failed("handoffs_expired_total", e))?,

            expiry_sweep_errors_total: register_counter!(
                "relay_expiry_sweep_errors_total",
                "Total failed handoff expiry sweeps"
            )
            .map_err(|e| registration_failed("expiry_sweep_errors_total", e))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        self.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_entity_change(&self, entity_type: EntityType) {
        self.entity_changes_total
            .with_label_values(&[entity_type.as_db_str()])
            .inc();
    }

    pub fn record_expired_handoffs(&self, count: usize) {
        self.handoffs_expired_total.inc_by(count as f64);
    }

    pub fn record_sweep_error(&self) {
        self.expiry_sweep_errors_total.inc();
    }
}

fn registration_failed(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Run `f` against the global metrics, if they initialized.
pub fn with_metrics(f: impl FnOnce(&RelayMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Change observer that counts committed changes per entity type.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl ChangeObserver for MetricsObserver {
    fn entity_changed(&self, entity_type: EntityType, _id: EntityId) {
        with_metrics(|m| m.record_entity_change(entity_type));
    }
}

/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the registry so our families are present on the first scrape
    with_metrics(|_| {});

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;
    use relay_core::new_entity_id;

    fn metrics() -> Result<&'static RelayMetrics, String> {
        METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))
    }

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = metrics()?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_http_request() -> Result<(), String> {
        let metrics = metrics()?;
        metrics.record_http_request("GET", "/api/v1/tasks/:id", 200, 0.002);
        let count = metrics
            .http_requests_total
            .with_label_values(&["GET", "/api/v1/tasks/:id", "200"])
            .get();
        assert!(count >= 1.0);
        Ok(())
    }

    #[test]
    fn test_observer_counts_changes() -> Result<(), String> {
        let metrics = metrics()?;
        let before = metrics
            .entity_changes_total
            .with_label_values(&["handoff"])
            .get();
        MetricsObserver.entity_changed(EntityType::Handoff, new_entity_id());
        let after = metrics
            .entity_changes_total
            .with_label_values(&["handoff"])
            .get();
        assert!(after >= before + 1.0);
        Ok(())
    }
}
