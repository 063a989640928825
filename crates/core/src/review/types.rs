//! Types for the review module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::archive::ArchiveReceipt;
use crate::batch::BatchNumber;

/// Phase of a checked-out file.
///
/// `Loaded -> Editing <-> Saved -> {Accepted | Rejected}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Loaded,
    Editing,
    Saved,
    Accepted,
    Rejected,
}

impl ReviewState {
    /// Whether there are edits not yet written to the file.
    pub fn has_unsaved_edits(&self) -> bool {
        matches!(self, Self::Editing)
    }
}

/// One of a worker's checked-out files.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFileEntry {
    pub batch: BatchNumber,
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Result of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    /// Cells that differ from the previous save.
    pub changed_cells: usize,
    /// Of those, cells not already in the edit log.
    pub newly_marked: usize,
    /// Size of the edit log after the save.
    pub total_edited: usize,
}

/// Result of accepting or rejecting the current file.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    pub batch: BatchNumber,
    pub state: ReviewState,
    pub receipt: ArchiveReceipt,
}
