//! Types for the fetcher module.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::batch::{BatchNumber, WorkerId};

/// A batch slice written to the worker's directory.
#[derive(Debug, Clone, Serialize)]
pub struct FetchedBatch {
    pub batch: BatchNumber,
    pub worker: WorkerId,
    /// Path of the written `batch_{n}.csv`.
    pub path: PathBuf,
    /// Number of pair rows in the file.
    pub rows: usize,
}

/// Directory holding a worker's checked-out batch files.
pub fn worker_dir(fetched_dir: &Path, worker: &WorkerId) -> PathBuf {
    fetched_dir.join(worker.as_str())
}

/// Location of a worker's copy of a batch: `<fetched_dir>/<worker>/batch_{n}.csv`.
pub fn batch_file_path(fetched_dir: &Path, worker: &WorkerId, batch: BatchNumber) -> PathBuf {
    worker_dir(fetched_dir, worker).join(batch.file_name())
}
