//! Consul-compatible HTTP surface for the registry.
//!
//! - `PUT|POST /v1/agent/service/register`   — upsert a service record
//! - `PUT  /v1/agent/service/deregister/:id` — remove by id
//! - `GET  /v1/agent/services`               — agent-local listing
//! - `GET  /v1/catalog/services`             — full id→record mapping
//! - `GET  /v1/health/service/:id`           — record + synthesized checks
//! - `GET  /health`                          — process probe (storage-aware)
//! - `GET  /metrics`                         — Prometheus text format

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use axum::Router;
use serde::Deserialize;

use aegis_domain::{Error, FieldIssue, ServiceRecord};

use crate::state::AppState;

/// Build the registry router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/agent/service/register",
            put(register).post(register),
        )
        .route("/v1/agent/service/deregister/:id", put(deregister))
        .route("/v1/agent/services", get(catalog))
        .route("/v1/catalog/services", get(catalog))
        .route("/v1/health/service/:id", get(service_health))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error shaping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `{ "error": "<kind>", "message": "<detail>" }`
fn api_error(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": kind, "message": message.into() })),
    )
        .into_response()
}

/// Validation failures additionally carry per-field details.
fn validation_error(details: Vec<FieldIssue>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": "validation",
            "message": "invalid request body",
            "details": details,
        })),
    )
        .into_response()
}

fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Backpressure(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.kind(), err.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Register
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Register request body. Fields are optional at the serde level so a
/// missing field yields a per-field validation detail instead of an
/// opaque deserialization error.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    /// Accepted for Consul-client compatibility; the registry derives
    /// health from heartbeats, not submitted checks.
    #[serde(default)]
    #[allow(dead_code)]
    pub check: Option<serde_json::Value>,
}

impl RegisterRequest {
    fn into_record(self) -> Result<ServiceRecord, Vec<FieldIssue>> {
        let mut details = Vec::new();
        if self.id.as_deref().map_or(true, |s| s.trim().is_empty()) {
            details.push(FieldIssue::new("id", "required"));
        }
        if self.name.as_deref().map_or(true, |s| s.trim().is_empty()) {
            details.push(FieldIssue::new("name", "required"));
        }
        if self.address.as_deref().map_or(true, |s| s.trim().is_empty()) {
            details.push(FieldIssue::new("address", "required"));
        }
        match self.port {
            None | Some(0) => details.push(FieldIssue::new("port", "required, 1..=65535")),
            Some(_) => {}
        }
        if !details.is_empty() {
            return Err(details);
        }

        let mut record = ServiceRecord::new(
            self.id.unwrap_or_default(),
            self.name.unwrap_or_default(),
            self.address.unwrap_or_default(),
            self.port.unwrap_or_default(),
        );
        record.tags = self.tags;
        record.meta = self.meta;
        Ok(record)
    }
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return api_error(StatusCode::BAD_REQUEST, "validation", rejection.body_text())
        }
    };

    let record = match request.into_record() {
        Ok(record) => record,
        Err(details) => return validation_error(details),
    };

    match state.registry.register(record).await {
        Ok(()) => Json(serde_json::json!({ "status": "registered" })).into_response(),
        Err(e) => error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deregister / listings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn deregister(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.deregister(&id).await {
        Ok(()) => Json(serde_json::json!({ "status": "deregistered" })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn catalog(State(state): State<AppState>) -> Response {
    let started = std::time::Instant::now();
    let listing = state.registry.list();
    state.metrics.observe("list", "ok", started.elapsed());
    Json(listing).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Health
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn service_health(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let started = std::time::Instant::now();
    let lookup = state.registry.get(&id);
    state.metrics.observe(
        "get",
        if lookup.is_ok() { "ok" } else { "not_found" },
        started.elapsed(),
    );
    match lookup {
        Ok(record) => {
            let output = format!("last heartbeat {}", record.last_seen.to_rfc3339());
            Json(serde_json::json!({
                "service": record,
                "checks": [{ "status": record.health, "output": output }],
            }))
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Process-level probe. The response is 200 even when the storage backend
/// is down; `status: "degraded"` tells the orchestrator reads are being
/// served from memory only.
pub async fn health(State(state): State<AppState>) -> Response {
    let storage_ok = state.registry.storage_healthy().await;
    let status = if storage_ok { "ok" } else { "degraded" };
    Json(serde_json::json!({
        "status": status,
        "redis": if storage_ok { "ok" } else { "unreachable" },
        "services": state.registry.len(),
    }))
    .into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_reports_all_missing_fields() {
        let request = RegisterRequest {
            id: None,
            name: Some("aip".into()),
            address: None,
            port: Some(0),
            tags: vec![],
            meta: HashMap::new(),
            check: None,
        };
        let details = request.into_record().unwrap_err();
        let fields: Vec<&str> = details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["id", "address", "port"]);
    }

    #[test]
    fn register_request_builds_record() {
        let request = RegisterRequest {
            id: Some("svc-1".into()),
            name: Some("aip".into()),
            address: Some("10.0.0.1".into()),
            port: Some(8080),
            tags: vec!["ai".into()],
            meta: HashMap::from([("version".into(), "1.0".into())]),
            check: None,
        };
        let record = request.into_record().unwrap();
        assert_eq!(record.id, "svc-1");
        assert_eq!(record.port, 8080);
        assert_eq!(record.tags, vec!["ai".to_string()]);
        assert_eq!(record.meta["version"], "1.0");
    }
}
