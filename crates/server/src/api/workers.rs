//! Worker review API handlers.
//!
//! Every route is scoped to one worker. The first request for a worker opens
//! its review session, which checks out a batch if the worker has none.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use curator_core::{
    ArchiveOutcome, BatchFileEntry, BatchNumber, CellRef, PairColumn, PairRow, ReviewError,
    ReviewSession, ReviewState, SaveOutcome, WorkerId,
};

use super::error::ApiResult;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Overview of a worker's session
#[derive(Debug, Serialize)]
pub struct WorkerSummary {
    pub worker: WorkerId,
    /// The open file, if any
    pub current: Option<CurrentSummary>,
    /// Batch files still checked out
    pub files: Vec<BatchFileEntry>,
    /// Every batch the ledger records for this worker, oldest first
    pub assigned_batches: Vec<BatchNumber>,
}

#[derive(Debug, Serialize)]
pub struct CurrentSummary {
    pub batch: BatchNumber,
    pub state: ReviewState,
    pub rows: usize,
    pub edited_cells: usize,
}

/// The open file with its content
#[derive(Debug, Serialize)]
pub struct CurrentFileResponse {
    pub batch: BatchNumber,
    pub file_name: String,
    pub state: ReviewState,
    pub rows: Vec<PairRow>,
    pub edited_cells: Vec<CellRef>,
}

/// Request body for editing one cell
#[derive(Debug, Deserialize)]
pub struct EditCellBody {
    pub row: usize,
    pub column: PairColumn,
    pub value: String,
}

/// Request body for replacing every row
#[derive(Debug, Deserialize)]
pub struct ReplaceRowsBody {
    pub rows: Vec<PairRow>,
}

#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub batch: BatchNumber,
    pub state: ReviewState,
}

fn worker_id(name: String) -> ApiResult<WorkerId> {
    Ok(WorkerId::new(name)?)
}

fn current_file(session: &ReviewSession) -> ApiResult<CurrentFileResponse> {
    let current = session.current().ok_or(ReviewError::NoCurrentFile)?;
    Ok(CurrentFileResponse {
        batch: current.batch,
        file_name: current.batch.file_name(),
        state: current.state,
        rows: current.rows.to_vec(),
        edited_cells: current.edit_log.cells().copied().collect(),
    })
}

fn edit_response(session: &ReviewSession) -> ApiResult<EditResponse> {
    let current = session.current().ok_or(ReviewError::NoCurrentFile)?;
    Ok(EditResponse {
        batch: current.batch,
        state: current.state,
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Session overview, resuming or starting the worker's session
pub async fn get_worker(
    State(state): State<Arc<AppState>>,
    Path(worker): Path<String>,
) -> ApiResult<Json<WorkerSummary>> {
    let worker = worker_id(worker)?;
    let session = state.session(&worker).await?;
    let assigned_batches = state.allocator().assignments_for(&worker)?;

    Ok(Json(WorkerSummary {
        current: session.current().map(|c| CurrentSummary {
            batch: c.batch,
            state: c.state,
            rows: c.rows.len(),
            edited_cells: c.edit_log.len(),
        }),
        files: session.list_files()?,
        assigned_batches,
        worker,
    }))
}

/// List the worker's checked-out files
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(worker): Path<String>,
) -> ApiResult<Json<Vec<BatchFileEntry>>> {
    let worker = worker_id(worker)?;
    let session = state.session(&worker).await?;
    Ok(Json(session.list_files()?))
}

/// Download a checked-out file as it is on disk
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path((worker, batch)): Path<(String, u64)>,
) -> ApiResult<impl IntoResponse> {
    let worker = worker_id(worker)?;
    let batch = BatchNumber(batch);
    let session = state.session(&worker).await?;
    let entry = session
        .list_files()?
        .into_iter()
        .find(|f| f.batch == batch)
        .ok_or(ReviewError::FileNotFound { batch })?;

    let bytes = tokio::fs::read(&entry.path)
        .await
        .map_err(ReviewError::from)?;
    let disposition = format!("attachment; filename=\"{}\"", entry.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// Switch to another checked-out file; unsaved edits are dropped
pub async fn select_file(
    State(state): State<Arc<AppState>>,
    Path((worker, batch)): Path<(String, u64)>,
) -> ApiResult<Json<CurrentFileResponse>> {
    let worker = worker_id(worker)?;
    let mut session = state.session(&worker).await?;
    session.select(BatchNumber(batch))?;
    Ok(Json(current_file(&session)?))
}

/// The open file's rows and edited cells
pub async fn get_current(
    State(state): State<Arc<AppState>>,
    Path(worker): Path<String>,
) -> ApiResult<Json<CurrentFileResponse>> {
    let worker = worker_id(worker)?;
    let session = state.session(&worker).await?;
    Ok(Json(current_file(&session)?))
}

/// Edit one cell in memory
pub async fn edit_cell(
    State(state): State<Arc<AppState>>,
    Path(worker): Path<String>,
    Json(body): Json<EditCellBody>,
) -> ApiResult<Json<EditResponse>> {
    let worker = worker_id(worker)?;
    let mut session = state.session(&worker).await?;
    session.edit_cell(body.row, body.column, body.value)?;
    Ok(Json(edit_response(&session)?))
}

/// Replace all rows in memory
pub async fn replace_rows(
    State(state): State<Arc<AppState>>,
    Path(worker): Path<String>,
    Json(body): Json<ReplaceRowsBody>,
) -> ApiResult<Json<EditResponse>> {
    let worker = worker_id(worker)?;
    let mut session = state.session(&worker).await?;
    session.replace_rows(body.rows)?;
    Ok(Json(edit_response(&session)?))
}

/// Write edits to disk and extend the edit log
pub async fn save(
    State(state): State<Arc<AppState>>,
    Path(worker): Path<String>,
) -> ApiResult<Json<SaveOutcome>> {
    let worker = worker_id(worker)?;
    let mut session = state.session(&worker).await?;
    Ok(Json(session.save()?))
}

/// Archive the open file as accepted
pub async fn accept(
    State(state): State<Arc<AppState>>,
    Path(worker): Path<String>,
) -> ApiResult<Json<ArchiveOutcome>> {
    let worker = worker_id(worker)?;
    let mut session = state.session(&worker).await?;
    Ok(Json(session.accept().await?))
}

/// Archive the open file as rejected
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(worker): Path<String>,
) -> ApiResult<Json<ArchiveOutcome>> {
    let worker = worker_id(worker)?;
    let mut session = state.session(&worker).await?;
    Ok(Json(session.reject().await?))
}

/// Check out another batch and open it
pub async fn next_batch(
    State(state): State<Arc<AppState>>,
    Path(worker): Path<String>,
) -> ApiResult<Json<CurrentFileResponse>> {
    let worker = worker_id(worker)?;
    let mut session = state.session(&worker).await?;
    let batch = session.next().await?;
    info!(%worker, %batch, "Worker checked out another batch");
    Ok(Json(current_file(&session)?))
}
