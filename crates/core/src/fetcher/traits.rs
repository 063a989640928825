//! Trait definitions for the fetcher module.

use async_trait::async_trait;

use super::error::FetchError;
use super::types::FetchedBatch;
use crate::batch::{BatchNumber, WorkerId};

/// Materializes a numbered slice of the source dataset for a worker.
///
/// The slice for batch `n` is rows `n * batch_size .. (n + 1) * batch_size` of
/// the source in a stable order. Implementations write it to the worker's
/// directory and must not leave a partial file behind on failure. The
/// allocator bounds each call with a timeout and drops the future on expiry.
#[async_trait]
pub trait BatchFetcher: Send + Sync {
    /// Returns the name of this fetcher implementation.
    fn name(&self) -> &str;

    /// Fetches `batch` into `worker`'s directory.
    async fn fetch(&self, batch: BatchNumber, worker: &WorkerId)
        -> Result<FetchedBatch, FetchError>;
}
