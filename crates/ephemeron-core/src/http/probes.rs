//! Internal router: probes and metrics.
//!
//! - `GET /healthz`: プロセスが動いていれば 200
//! - `GET /readyz`: tracking store が ping に応答すれば 200、だめなら 503
//! - `GET /metrics`: Prometheus text format

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::Serialize;

use crate::metrics::metrics_handler;
use crate::ports::TrackingStore;

#[derive(Debug, Serialize)]
struct ProbeResponse {
    status: &'static str,
}

pub fn probe_router(store: Arc<dyn TrackingStore>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(store)
}

async fn healthz() -> Json<ProbeResponse> {
    Json(ProbeResponse { status: "ok" })
}

async fn readyz(
    State(store): State<Arc<dyn TrackingStore>>,
) -> (StatusCode, Json<ProbeResponse>) {
    match store.ping().await {
        Ok(()) => (StatusCode::OK, Json(ProbeResponse { status: "ok" })),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ProbeResponse {
                    status: "not ready",
                }),
            )
        }
    }
}
