//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the curator server:
//! - HTTP request metrics (latency, counts, auth failures)
//! - Batch progress (next batch number, assignments per worker), collected
//!   from the stores when `/metrics` is scraped
//! - Core allocation and review metrics, registered from `curator_core`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "curator_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("curator_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "curator_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "curator_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Batch Progress (collected dynamically)
// =============================================================================

/// Next batch number the counter will hand out.
pub static NEXT_BATCH_NUMBER: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "curator_next_batch_number",
        "Next batch number the counter will hand out",
    )
    .unwrap()
});

/// Batches recorded in the ledger per worker.
pub static ASSIGNED_BATCHES: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "curator_assigned_batches",
            "Batches assigned to each worker",
        ),
        &["worker"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Batches
    registry
        .register(Box::new(NEXT_BATCH_NUMBER.clone()))
        .unwrap();
    registry
        .register(Box::new(ASSIGNED_BATCHES.clone()))
        .unwrap();

    // Core metrics (allocation, fetch, archive)
    for metric in curator_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Refresh the batch gauges from the counter and ledger.
///
/// Store errors leave the previous values in place.
pub fn collect_dynamic_metrics(state: &AppState) {
    let allocator = state.allocator();

    if let Ok(next) = allocator.peek_next() {
        NEXT_BATCH_NUMBER.set(i64::try_from(next.value()).unwrap_or(i64::MAX));
    }

    if let Ok(snapshot) = allocator.snapshot() {
        ASSIGNED_BATCHES.reset();
        for (worker, batches) in &snapshot {
            ASSIGNED_BATCHES
                .with_label_values(&[worker.as_str()])
                .set(batches.len() as i64);
        }
    }
}

static WORKER_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/workers/[^/]+").unwrap());
static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace worker names and batch numbers).
pub fn normalize_path(path: &str) -> String {
    let result = WORKER_SEGMENT.replace_all(path, "/workers/{worker}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{batch}$1");
    result.to_string()
}
