//! Mock fetcher for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::batch::{BatchNumber, WorkerId};
use crate::fetcher::{batch_file_path, BatchFetcher, FetchError, FetchedBatch};
use crate::pairs::{write_pairs, PairRow};

/// A recorded fetch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    pub batch: BatchNumber,
    pub worker: WorkerId,
    pub success: bool,
}

/// Mock implementation of the BatchFetcher trait.
///
/// Writes real batch files so the review workflow can read them back. Rows
/// are `("yo {batch}-{i}", "en {batch}-{i}")`.
///
/// Provides controllable behavior for testing:
/// - Fail the next fetch with a chosen error
/// - Delay after writing the file (to exercise timeouts)
/// - Return empty batches
#[derive(Debug)]
pub struct MockFetcher {
    fetched_dir: PathBuf,
    rows_per_batch: Arc<RwLock<usize>>,
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    next_error: Arc<RwLock<Option<FetchError>>>,
    delay: Arc<RwLock<Duration>>,
}

impl MockFetcher {
    /// Create a mock fetcher writing `rows_per_batch` rows under `fetched_dir`.
    pub fn new(fetched_dir: impl Into<PathBuf>, rows_per_batch: usize) -> Self {
        Self {
            fetched_dir: fetched_dir.into(),
            rows_per_batch: Arc::new(RwLock::new(rows_per_batch)),
            fetches: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// The rows the mock writes for `batch`.
    pub fn rows_for(batch: BatchNumber, count: usize) -> Vec<PairRow> {
        (0..count)
            .map(|i| PairRow::new(format!("yo {batch}-{i}"), format!("en {batch}-{i}")))
            .collect()
    }

    /// Get all recorded fetches.
    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    /// Get the number of fetches performed.
    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }

    /// Configure the next fetch to fail with the given error.
    pub async fn set_next_error(&self, error: FetchError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set how long each fetch waits after writing its file.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Set the number of rows written per batch.
    pub async fn set_rows_per_batch(&self, rows: usize) {
        *self.rows_per_batch.write().await = rows;
    }

    async fn record(&self, batch: BatchNumber, worker: &WorkerId, success: bool) {
        self.fetches.write().await.push(RecordedFetch {
            batch,
            worker: worker.clone(),
            success,
        });
    }
}

#[async_trait]
impl BatchFetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(
        &self,
        batch: BatchNumber,
        worker: &WorkerId,
    ) -> Result<FetchedBatch, FetchError> {
        if let Some(err) = self.next_error.write().await.take() {
            self.record(batch, worker, false).await;
            return Err(err);
        }

        let rows = Self::rows_for(batch, *self.rows_per_batch.read().await);
        let path = batch_file_path(&self.fetched_dir, worker, batch);
        write_pairs(&path, &rows)?;

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.record(batch, worker, true).await;
        Ok(FetchedBatch {
            batch,
            worker: worker.clone(),
            path,
            rows: rows.len(),
        })
    }
}
