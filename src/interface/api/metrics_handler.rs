//! Prometheus metrics handler

use crate::domain::shared::{BridgeError, Result};
use crate::infrastructure::metrics::{self, FUNCTION_CALL_DURATION};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Handler latencies are bounded by the dispatch timeout, so buckets stop at 10s
const FUNCTION_CALL_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

fn builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(FUNCTION_CALL_DURATION.to_string()),
            FUNCTION_CALL_BUCKETS,
        )
        .map_err(|e| BridgeError::Configuration(e.to_string()))
}

/// Initialize the Prometheus metrics exporter as the global recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = builder()?
        .install_recorder()
        .map_err(|e| BridgeError::Configuration(e.to_string()))?;
    metrics::describe();
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally
pub fn detached_handle() -> Result<PrometheusHandle> {
    Ok(builder()?.build_recorder().handle())
}

/// HTTP metrics handler
pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    let metrics = prometheus_handle.render();
    (StatusCode::OK, metrics).into_response()
}
