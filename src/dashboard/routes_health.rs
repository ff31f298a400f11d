//! # Health & Observability Endpoints
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /healthz` | Liveness: process is alive |
//! | `GET /readyz` | Readiness: status store reachable |
//! | `GET /metrics` | Prometheus scraping endpoint |
//!
//! The readiness probe runs the store health check with a 2-second timeout and
//! answers 503 when it fails.

use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;

pub(super) async fn handler_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(super) async fn handler_readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let check =
        tokio::time::timeout(std::time::Duration::from_secs(2), state.store.health_check()).await;

    match check {
        Ok(Ok(())) => (StatusCode::OK, "ok"),
        Ok(Err(_)) => (StatusCode::SERVICE_UNAVAILABLE, "store unreachable"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "store timeout"),
    }
}

pub(super) async fn handler_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.prom_metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                "content-type",
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => super::error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
