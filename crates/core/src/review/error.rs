//! Error types for the review module.

use std::path::PathBuf;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::batch::{AllocationError, BatchNumber, StoreError};
use crate::pairs::PairsError;

/// Errors from a review session.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// No file is checked out.
    #[error("No batch file is currently selected")]
    NoCurrentFile,

    /// The worker has no file for this batch.
    #[error("Batch {batch} is not checked out to this worker")]
    FileNotFound { batch: BatchNumber },

    /// Row index past the end of the file.
    #[error("Row {row} is out of range (file has {rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },

    /// Replacement rows do not match the file's row count.
    #[error("Expected {expected} rows, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },

    /// Getting a new batch failed.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// Archiving the file failed; it is still checked out.
    #[error("Failed to archive batch file: {0}")]
    Archive(#[from] ArchiveError),

    /// Reading or writing the batch file failed.
    #[error(transparent)]
    Pairs(#[from] PairsError),

    /// Reading the ledger failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The edit log could not be read or written.
    #[error("Edit log {path}: {reason}")]
    EditLog { path: PathBuf, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReviewError {
    pub(crate) fn edit_log(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::EditLog {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
