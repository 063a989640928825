//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Allocation (attempts by result, rollbacks, fetch latency)
//! - Review (edited cells, archived files, mirror failures)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Allocation Metrics
// =============================================================================

/// Allocation attempts total by result.
pub static ALLOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("curator_allocations_total", "Total batch allocation attempts"),
        &["result"], // "committed" or an AllocationError kind
    )
    .unwrap()
});

/// Reservations rolled back after a failed or empty fetch.
pub static ROLLBACKS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "curator_rollbacks_total",
        "Total batch reservations rolled back",
    )
    .unwrap()
});

/// Fetch duration in seconds.
pub static FETCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("curator_fetch_duration_seconds", "Duration of batch fetches")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["fetcher", "result"], // result: "success", "failed", "timeout"
    )
    .unwrap()
});

// =============================================================================
// Review Metrics
// =============================================================================

/// Cells newly marked as edited on save.
pub static EDITED_CELLS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "curator_edited_cells_total",
        "Total cells changed by reviewers",
    )
    .unwrap()
});

/// Files archived total by category.
pub static ARCHIVED_FILES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("curator_archived_files_total", "Total reviewed files archived"),
        &["category"], // "accepted", "rejected"
    )
    .unwrap()
});

/// Remote mirror uploads that failed.
pub static MIRROR_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "curator_mirror_failures_total",
        "Total archive mirror uploads that failed",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Allocation
        Box::new(ALLOCATIONS.clone()),
        Box::new(ROLLBACKS.clone()),
        Box::new(FETCH_DURATION.clone()),
        // Review
        Box::new(EDITED_CELLS.clone()),
        Box::new(ARCHIVED_FILES.clone()),
        Box::new(MIRROR_FAILURES.clone()),
    ]
}
