//! Prometheus metrics for the LFS proxy.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no OIDs or repository names, but they do expose aggregate
//! traffic. Restrict `/metrics` to the scraper at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use lfs_cache::FallthroughHook;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{Arc, LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Batch metrics
pub static BATCH_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lfs_batch_requests_total",
            "Total batch requests by operation",
        ),
        &["operation"],
    )
    .expect("metric creation failed")
});

pub static BATCH_OBJECTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lfs_batch_objects_total",
            "Total batch objects by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("metric creation failed")
});

// Transfer metrics
pub static UPLOAD_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "lfs_proxy_upload_bytes_total",
        "Total bytes stored through the upload proxy",
    )
    .expect("metric creation failed")
});

pub static DOWNLOAD_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "lfs_proxy_download_bytes_total",
        "Total bytes served through the download proxy",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "lfs_proxy_upload_duration_seconds",
            "Time taken to stream one object into storage",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lfs_proxy_upload_errors_total",
            "Total proxy upload errors by error type",
        ),
        &["error_type"],
    )
    .expect("metric creation failed")
});

pub static VERIFY_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "lfs_verify_completed_total",
        "Total objects transitioned to uploaded by verify",
    )
    .expect("metric creation failed")
});

// Trust layer metrics
pub static AUTH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lfs_auth_failures_total",
            "Total rejected LFS requests by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static CACHE_FALLTHROUGHS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lfs_cache_fallthroughs_total",
            "Total reads served from the database because the cache failed",
        ),
        &["component"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(BATCH_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BATCH_OBJECTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOAD_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(VERIFY_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUTH_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_FALLTHROUGHS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
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

/// Helper to record upload errors by type.
pub fn record_upload_error(error_type: &str) {
    UPLOAD_ERRORS.with_label_values(&[error_type]).inc();
}

pub fn record_auth_failure(reason: &str) {
    AUTH_FAILURES.with_label_values(&[reason]).inc();
}

pub fn record_batch_object(operation: &str, outcome: &str) {
    BATCH_OBJECTS.with_label_values(&[operation, outcome]).inc();
}

/// Hook for the cached metadata views: counts every cache fall-through.
pub fn cache_fallthrough_hook() -> FallthroughHook {
    Arc::new(|component| CACHE_FALLTHROUGHS.with_label_values(&[component]).inc())
}
