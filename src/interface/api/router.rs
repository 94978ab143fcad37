//! API Router configuration

use super::health_handler::health_check;
use super::media_stream::media_stream_handler;
use super::metrics_handler::metrics_handler;
use super::AppState;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the HTTP router.
///
/// The media stream is served on `media_path` and on `/`.
pub fn build_router(state: AppState, media_path: &str, prometheus_handle: PrometheusHandle) -> Router {
    let mut media_routes = Router::new().route("/", get(media_stream_handler));
    if media_path != "/" {
        media_routes = media_routes.route(media_path, get(media_stream_handler));
    }

    let health_routes = Router::new().route("/health", get(health_check));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    Router::new()
        .merge(media_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(metrics_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
