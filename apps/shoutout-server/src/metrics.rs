//! Prometheus metrics for shoutout-server.
//!
//! Exposes engine metrics in Prometheus format at the `/metrics` endpoint.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder and return a handle for rendering.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    shoutout_engine::metrics::describe();
    Ok(handle)
}
