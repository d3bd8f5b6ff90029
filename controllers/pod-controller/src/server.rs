//! Health and metrics HTTP server.
//!
//! - `/healthz`: always 200 while the process is up
//! - `/readyz`: 200 once the informer cache has synced, 503 before
//! - `/metrics`: Prometheus text exposition

use crate::error::ControllerError;
use crate::metrics::Metrics;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use informer::SyncHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug, Clone)]
struct AppState {
    metrics: Arc<Metrics>,
    synced: SyncHandle,
}

/// Builds the health/metrics router.
pub fn router(metrics: Arc<Metrics>, synced: SyncHandle) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(render_metrics))
        .with_state(AppState { metrics, synced })
        .layer(TraceLayer::new_for_http())
}

/// Serves the router on `addr` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns [`ControllerError::Server`] if the listener cannot be bound or
/// the server fails.
pub async fn serve(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    synced: SyncHandle,
    shutdown: CancellationToken,
) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(ControllerError::Server)?;
    info!("Health and metrics server listening on {}", addr);

    axum::serve(listener, router(metrics, synced))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(ControllerError::Server)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.synced.has_synced() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "cache not synced")
    }
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
