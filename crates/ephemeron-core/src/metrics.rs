//! Prometheus metrics.
//!
//! `/metrics` は internal listener にだけ載せる（public には出さない）。

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

use crate::domain::ReapReport;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static IMAGES_TRACKED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ephemeron_images_tracked_total",
        "Total number of images tracked from push events",
    )
    .expect("metric creation failed")
});

pub static IMAGES_REAPED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ephemeron_images_reaped_total",
        "Total number of expired images removed from the registry",
    )
    .expect("metric creation failed")
});

pub static REAP_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ephemeron_reap_errors_total",
        "Total number of image deletions that failed",
    )
    .expect("metric creation failed")
});

pub static BYTES_RECLAIMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ephemeron_bytes_reclaimed_total",
        "Total bytes reclaimed by reaping (as reported at push time)",
    )
    .expect("metric creation failed")
});

pub static REAP_CYCLES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ephemeron_reap_cycles_total",
            "Total reap cycles by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static IMAGES_CURRENT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "ephemeron_images_current",
        "Number of images currently tracked",
    )
    .expect("metric creation failed")
});

pub static WEBHOOK_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ephemeron_webhook_requests_total",
            "Total webhook requests by response status",
        ),
        &["status"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(IMAGES_TRACKED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMAGES_REAPED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REAP_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_RECLAIMED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REAP_CYCLES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMAGES_CURRENT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(WEBHOOK_REQUESTS.clone()))
            .expect("metric registration failed");
    });
}

/// Fold one finished cycle into the counters.
pub fn record_reap_report(report: &ReapReport) {
    let outcome = if report.skipped {
        "skipped"
    } else if report.has_failures() {
        "partial"
    } else {
        "ok"
    };
    REAP_CYCLES.with_label_values(&[outcome]).inc();
    IMAGES_REAPED.inc_by(report.deleted as u64);
    REAP_ERRORS.inc_by(report.failed as u64);
    BYTES_RECLAIMED.inc_by(report.bytes_reclaimed);
}

pub fn record_reap_cycle_error() {
    REAP_CYCLES.with_label_values(&["error"]).inc();
}

pub fn record_webhook_status(status: StatusCode) {
    WEBHOOK_REQUESTS
        .with_label_values(&[status.as_str()])
        .inc();
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}
