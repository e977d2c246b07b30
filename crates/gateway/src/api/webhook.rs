//! Channel webhook surface — `POST /webhook/{kind}`.
//!
//! External gateways push one envelope per message; the matching
//! processor classifies it and the event lands on the inbound queue.
//! Responses carry the classification so the pushing gateway can act on
//! it immediately, without waiting for the controller.

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use aegis_domain::{ChannelKind, Error};

use crate::state::AppState;

/// The channel-agnostic envelope; `body` is the per-channel payload.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub source: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub tag: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub timestamp: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
}

/// `{ "error": "<kind>", "message": "<detail>" }`
fn api_error(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": kind, "message": message.into() })),
    )
        .into_response()
}

pub async fn ingest(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    body: Result<Json<WebhookEnvelope>, JsonRejection>,
) -> Response {
    let started = Instant::now();

    // 1. Resolve the channel kind; unknown paths are 404.
    let kind: ChannelKind = match kind.parse() {
        Ok(kind) => kind,
        Err(_) => {
            return api_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("unknown channel kind: {kind}"),
            )
        }
    };

    // 2. Malformed JSON is a validation failure.
    let Json(envelope) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return api_error(StatusCode::BAD_REQUEST, "validation", rejection.body_text())
        }
    };

    // 3. Find the processor (absent or disabled → 404).
    let Some(processor) = state.processors.get(kind) else {
        return api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("channel {kind} is not enabled"),
        );
    };

    // 4. Parse → sanitize → classify.
    let event = match processor.process(&envelope.body) {
        Ok(event) => event,
        Err(e @ Error::Validation(_)) => {
            state
                .metrics
                .parse_failures
                .with_label_values(&[kind.as_str()])
                .inc();
            return api_error(StatusCode::BAD_REQUEST, e.kind(), e.to_string());
        }
        Err(e) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.to_string());
        }
    };

    let request_id = envelope.id.unwrap_or_else(|| event.id.clone());
    let classification = event.classification.clone();

    // 5. Enqueue for the controller; a full queue is backpressure, and
    //    the pushing gateway owns the retry.
    if let Err(e) = state.queue.inbound.enqueue(event) {
        state
            .metrics
            .queue_drops
            .with_label_values(&["inbound"])
            .inc();
        return api_error(StatusCode::SERVICE_UNAVAILABLE, e.kind(), e.to_string());
    }

    state.metrics.events.with_label_values(&[kind.as_str()]).inc();
    state
        .metrics
        .webhook_latency
        .with_label_values(&[kind.as_str()])
        .observe(started.elapsed().as_secs_f64());

    Json(serde_json::json!({
        "success": true,
        "request_id": request_id,
        "data": {
            "threat_level": classification.threat_level,
            "confidence": classification.confidence,
            "scores": classification.scores,
            "indicators": classification.indicators,
            "recommendations": classification.recommendations,
        },
    }))
    .into_response()
}
