//! Health, status, and metrics endpoints for the I/O plane.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::state::AppState;

/// `GET /health` — lightweight probe with queue depths.
pub async fn health(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "queue": state.queue.stats(),
    }))
    .into_response()
}

/// `GET /status` — per-processor and per-sender stats.
pub async fn status(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "processors": state.processors.stats(),
        "senders": state.senders.stats(),
        "queue": state.queue.stats(),
        "reports_depth": state.reports.len(),
    }))
    .into_response()
}

/// `GET /metrics` — Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
        .into_response()
}
