//! Observability HTTP endpoints.
//!
//! - `GET /healthz` - process alive, always 200
//! - `GET /readyz` - 200 when [`Readiness`] holds, 503 otherwise
//! - `GET /metrics` - Prometheus text format

use super::{metrics_handler, IngestMetrics, TelemetryError};
use crate::health::Readiness;
use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub readiness: Readiness,
    pub metrics: IngestMetrics,
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /readyz
pub async fn readyz(State(readiness): State<Readiness>) -> impl IntoResponse {
    if readiness.is_ready().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve the observability endpoints until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<(), TelemetryError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TelemetryError::Server(format!("failed to bind {}: {}", addr, e)))?;

    tracing::info!(address = %addr, "Observability endpoints listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| TelemetryError::Server(e.to_string()))
}
