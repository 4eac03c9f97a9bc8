use prometheus::{TextEncoder, Encoder, Registry, IntCounter, IntCounterVec, Histogram, HistogramOpts, opts};
use once_cell::sync::Lazy;
use axum::{response::IntoResponse, http::StatusCode};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(opts!("http_requests_total", "HTTP request count"), &["method", "path", "status"]).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static SUBMISSIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("waiver_submissions_total", "Accepted fresh submissions").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static REDELIVERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("waiver_redeliveries_total", "Duplicate submissions served from existing artifacts").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static DOCUMENTS_GENERATED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("waiver_documents_generated_total", "Documents rendered and stored").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static DOCUMENT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("waiver_document_failures_total", "Per-activity document generation failures").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(opts!("waiver_notifications_total", "Notification attempts by outcome"), &["outcome"]).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static PIPELINE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new("waiver_pipeline_duration_seconds", "Background generation+delivery duration")).unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&metric_families, &mut buf).is_err() { return StatusCode::INTERNAL_SERVER_ERROR.into_response(); }
    ([("Content-Type", "text/plain; version=0.0.4")], buf).into_response()
}
