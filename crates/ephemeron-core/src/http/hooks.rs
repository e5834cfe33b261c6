//! Public router: registry webhook.
//!
//! `POST /v1/hook/registry-event` with `Authorization: Token <HOOK_TOKEN>`.
//! - token 不一致 → 401 `{}`
//! - body が decode できない → 400
//! - それ以外 → 200 `{}`（event ごとの失敗はログのみ）

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use serde_json::json;

use crate::app::Ingestor;
use crate::domain::EventEnvelope;
use crate::metrics;

pub const HOOK_PATH: &str = "/v1/hook/registry-event";

#[derive(Clone)]
pub struct HookState {
    ingestor: Arc<Ingestor>,
    expected_auth: Arc<str>,
}

impl HookState {
    pub fn new(ingestor: Arc<Ingestor>, hook_token: &str) -> Self {
        Self {
            ingestor,
            expected_auth: format!("Token {hook_token}").into(),
        }
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == &*self.expected_auth)
    }
}

pub fn hook_router(state: HookState) -> Router {
    Router::new()
        .route(HOOK_PATH, post(registry_event))
        .with_state(state)
}

async fn registry_event(
    State(state): State<HookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.is_authorized(&headers) {
        tracing::warn!("unauthorized webhook request");
        return respond(StatusCode::UNAUTHORIZED, Json(json!({})));
    }

    let envelope: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(error = %e, "failed to decode webhook body");
            return respond(StatusCode::BAD_REQUEST, "bad request");
        }
    };

    let summary = state.ingestor.ingest(&envelope).await;
    tracing::debug!(
        tracked = summary.tracked,
        ignored = summary.ignored,
        failed = summary.failed,
        "webhook processed"
    );
    respond(StatusCode::OK, Json(json!({})))
}

fn respond(status: StatusCode, body: impl IntoResponse) -> Response {
    metrics::record_webhook_status(status);
    (status, body).into_response()
}
