pub mod admin;
pub mod webhook;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the I/O plane router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/:kind", post(webhook::ingest))
        .route("/health", get(admin::health))
        .route("/status", get(admin::status))
        .route("/metrics", get(admin::metrics))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
