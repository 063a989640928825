//! Error types for batch bookkeeping and allocation.

use std::path::PathBuf;
use thiserror::Error;

use super::types::{BatchNumber, WorkerId};
use crate::fetcher::FetchError;

/// Errors from the durable counter and ledger stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing a record file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record exists but cannot be understood.
    #[error("Corrupt record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Only the most recent reservation may be released.
    #[error("Cannot release batch {requested}: counter is at {current}, only the most recent reservation may be released")]
    ReleaseOrder {
        current: BatchNumber,
        requested: BatchNumber,
    },

    /// The counter cannot advance any further.
    #[error("Batch counter overflow at {0}")]
    CounterOverflow(BatchNumber),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Errors from one allocation attempt.
///
/// Only [`AllocationError::Fetch`], [`AllocationError::InitialFetch`] and
/// [`AllocationError::NoMoreData`] are recovered by rollback; every other
/// kind aborts the attempt.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The counter could not be durably advanced. Nothing was reserved.
    #[error("Batch counter could not be advanced: {0}")]
    Exhaustion(#[source] StoreError),

    /// The fetch failed and the reservation was rolled back.
    #[error("Failed to fetch batch {batch}, please try again: {source}")]
    Fetch {
        batch: BatchNumber,
        #[source]
        source: FetchError,
    },

    /// The very first fetch for a worker failed; it has nothing else to work on.
    #[error("Your data could not be accessed at the moment (batch {batch}). Log out and log back in: {source}")]
    InitialFetch {
        batch: BatchNumber,
        #[source]
        source: FetchError,
    },

    /// The fetch succeeded but returned no rows; the reservation was rolled back.
    #[error("No more data: batch {batch} is past the end of the dataset")]
    NoMoreData { batch: BatchNumber },

    /// The ledger refused the assignment because the batch is already recorded.
    #[error("Batch {batch} for worker {worker} is already assigned to {}", holder_name(.holder))]
    UniquenessViolation {
        batch: BatchNumber,
        worker: WorkerId,
        holder: Option<WorkerId>,
    },

    /// Undoing a reservation failed; the counter or ledger needs attention.
    #[error("Rollback of batch {batch} failed: {source}")]
    Rollback {
        batch: BatchNumber,
        #[source]
        source: StoreError,
    },

    /// Reading or writing the ledger failed outside of rollback.
    #[error("Assignment ledger error: {0}")]
    Ledger(#[source] StoreError),

    /// Another attempt for the same worker has not finished yet.
    #[error("An allocation for worker {worker} is already in progress")]
    AttemptInFlight { worker: WorkerId },

    /// The attempt's task ended without producing a result.
    #[error("Allocation task aborted: {0}")]
    Aborted(String),
}

fn holder_name(holder: &Option<WorkerId>) -> &str {
    holder.as_ref().map(|h| h.as_str()).unwrap_or("an unknown worker")
}

impl AllocationError {
    /// Whether the worker can simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::InitialFetch { .. } | Self::AttemptInFlight { .. }
        )
    }

    /// Whether the error points at inconsistent bookkeeping that needs an operator.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Exhaustion(_)
                | Self::UniquenessViolation { .. }
                | Self::Rollback { .. }
                | Self::Ledger(_)
                | Self::Aborted(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Exhaustion(_) => "exhaustion",
            Self::Fetch { .. } => "fetch_failed",
            Self::InitialFetch { .. } => "initial_fetch_failed",
            Self::NoMoreData { .. } => "no_more_data",
            Self::UniquenessViolation { .. } => "uniqueness_violation",
            Self::Rollback { .. } => "rollback_failed",
            Self::Ledger(_) => "ledger_error",
            Self::AttemptInFlight { .. } => "in_flight",
            Self::Aborted(_) => "aborted",
        }
    }
}
