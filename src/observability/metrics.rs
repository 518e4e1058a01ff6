//! # Metrics Collection
//!
//! Prometheus metrics for secret store operations.

use crate::config::ObservabilityConfig;
use crate::errors::{AuthStoreError, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder for secret store activity
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Register metric descriptions with the installed exporter
    pub fn register_store_metrics(&self) {
        describe_counter!(
            "authstore_operations_total",
            Unit::Count,
            "Secret store operations by backend, operation and outcome"
        );
        describe_histogram!(
            "authstore_operation_duration_seconds",
            Unit::Seconds,
            "Secret store operation latency"
        );
        describe_counter!(
            "authstore_bulk_deleted_total",
            Unit::Count,
            "Authentications removed by bulk deletes"
        );
        describe_counter!(
            "authstore_bulk_delete_failures_total",
            Unit::Count,
            "Authentications a bulk delete failed to remove"
        );
    }

    /// Record one store operation with its outcome and latency
    pub fn record_store_operation(
        &self,
        backend: &str,
        operation: &str,
        success: bool,
        duration: f64,
    ) {
        let status = if success { "success" } else { "error" };
        let labels = [
            ("backend", backend.to_string()),
            ("operation", operation.to_string()),
            ("status", status.to_string()),
        ];
        counter!("authstore_operations_total", &labels).increment(1);

        let duration_labels = [("backend", backend.to_string()), ("operation", operation.to_string())];
        histogram!("authstore_operation_duration_seconds", &duration_labels).record(duration);
    }

    /// Record the partial outcome of a bulk delete
    pub fn record_bulk_delete(&self, backend: &str, deleted: usize, failed: usize) {
        let labels = [("backend", backend.to_string())];
        counter!("authstore_bulk_deleted_total", &labels).increment(deleted as u64);
        if failed > 0 {
            counter!("authstore_bulk_delete_failures_total", &labels).increment(failed as u64);
        }
    }
}

/// Install the Prometheus exporter
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        AuthStoreError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            AuthStoreError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    MetricsRecorder::new().register_store_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}
