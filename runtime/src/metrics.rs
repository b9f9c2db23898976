//! Prometheus metrics for the loyalty protocol.
//!
//! Metric names are registered once via [`register_metrics`]; recording goes
//! through the static [`ProtocolMetrics`] helpers so call sites never
//! hard-code names. Without an installed recorder every call is a no-op.
//!
//! # Example
//!
//! ```rust,no_run
//! use stampcard_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsServer")
            .field("addr", &self.addr)
            .field("started", &self.handle.is_some())
            .finish()
    }
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the Prometheus recorder and start serving `/metrics`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and returns `Ok(())` without a render handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if let Err(e) = metrics::set_global_recorder(recorder) {
            let err_msg = e.to_string();
            tracing::warn!(error = %err_msg, "Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            // `ExporterError` (metrics-exporter-prometheus 0.15) implements neither
            // `Display` nor `Debug`, so it cannot be rendered in the log.
            if exporter.await.is_err() {
                tracing::warn!("Metrics exporter stopped");
            }
        });

        register_metrics();
        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions with the installed recorder.
pub fn register_metrics() {
    describe_counter!(
        "stampcard_enrollments_total",
        "Total number of cards created by enrollment"
    );
    describe_counter!(
        "stampcard_stamps_added_total",
        "Total number of stamps added to cards"
    );
    describe_counter!(
        "stampcard_redemptions_total",
        "Total number of rewards redeemed"
    );
    describe_counter!(
        "stampcard_transaction_retries_total",
        "Total number of transaction re-executions after a conflict"
    );
    describe_counter!(
        "stampcard_side_effect_failures_total",
        "Total number of post-commit side effects that failed"
    );
    describe_counter!(
        "stampcard_handler_panics_total",
        "Total number of post-commit event handlers that panicked"
    );
    describe_counter!(
        "stampcard_events_dropped_total",
        "Total number of post-commit events dropped because the dispatch queue was full"
    );
    describe_histogram!(
        "stampcard_code_generation_attempts",
        "Number of candidate codes drawn before a free one was found"
    );
}

/// Loyalty protocol metrics recorder.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolMetrics;

impl ProtocolMetrics {
    /// Record a committed enrollment.
    pub fn record_enrollment() {
        counter!("stampcard_enrollments_total").increment(1);
    }

    /// Record stamps added by one committed stamp transaction.
    pub fn record_stamps(added: u32) {
        counter!("stampcard_stamps_added_total").increment(u64::from(added));
    }

    /// Record a committed redemption.
    pub fn record_redemption() {
        counter!("stampcard_redemptions_total").increment(1);
    }

    /// Record how many draws code generation needed.
    pub fn record_code_generation(attempts: u32) {
        histogram!("stampcard_code_generation_attempts").record(f64::from(attempts));
    }

    /// Record a failed side effect, labelled by effect name.
    pub fn record_side_effect_failure(effect: &'static str) {
        counter!("stampcard_side_effect_failures_total", "effect" => effect).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        ProtocolMetrics::record_enrollment();
        ProtocolMetrics::record_stamps(3);
        ProtocolMetrics::record_redemption();
        ProtocolMetrics::record_code_generation(2);
        ProtocolMetrics::record_side_effect_failure("notification");
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let mut server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(server.start().is_ok());

        ProtocolMetrics::record_enrollment();
        ProtocolMetrics::record_stamps(2);

        // Another test may have installed the global recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("stampcard_enrollments_total"));
            assert!(rendered.contains("stampcard_stamps_added_total"));
        }
    }
}
