//! Admin API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use curator_core::{BatchNumber, WorkerId};

use super::error::ApiResult;
use super::middleware::AuthUser;
use crate::state::AppState;

/// One worker's row in the ledger view
#[derive(Debug, Serialize)]
pub struct WorkerAssignments {
    pub worker: WorkerId,
    pub batches: Vec<BatchNumber>,
    /// Number of batches handed to this worker so far
    pub count: usize,
}

/// Ledger overview
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub next_batch_number: BatchNumber,
    pub total_assigned: usize,
    pub workers: Vec<WorkerAssignments>,
}

/// Result of a forced allocation
#[derive(Debug, Serialize)]
pub struct AllocateResponse {
    pub worker: WorkerId,
    pub batch: BatchNumber,
    pub rows: usize,
    pub duration_ms: u64,
}

/// All assignments with per-worker counts, busiest workers first
pub async fn get_ledger(State(state): State<Arc<AppState>>) -> ApiResult<Json<LedgerResponse>> {
    let allocator = state.allocator();
    let next_batch_number = allocator.peek_next()?;

    let mut workers: Vec<WorkerAssignments> = allocator
        .snapshot()?
        .into_iter()
        .map(|(worker, batches)| WorkerAssignments {
            count: batches.len(),
            worker,
            batches,
        })
        .collect();
    workers.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.worker.cmp(&b.worker)));

    Ok(Json(LedgerResponse {
        next_batch_number,
        total_assigned: workers.iter().map(|w| w.count).sum(),
        workers,
    }))
}

/// Allocate a batch for a worker without opening their session
pub async fn allocate_for_worker(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(worker): Path<String>,
) -> ApiResult<(StatusCode, Json<AllocateResponse>)> {
    let worker = WorkerId::new(worker)?;
    info!(%caller, %worker, "Admin allocation requested");

    let allocation = state.allocator().allocate(&worker).await?;

    Ok((
        StatusCode::CREATED,
        Json(AllocateResponse {
            worker: allocation.worker,
            batch: allocation.batch,
            rows: allocation.rows,
            duration_ms: allocation.duration_ms,
        }),
    ))
}
