//! Identity types for batches and workers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A globally unique, monotonically allocated batch number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchNumber(pub u64);

impl BatchNumber {
    pub const ZERO: BatchNumber = BatchNumber(0);

    pub fn value(self) -> u64 {
        self.0
    }

    /// The following batch number, or `None` on overflow.
    pub fn checked_next(self) -> Option<BatchNumber> {
        self.0.checked_add(1).map(BatchNumber)
    }

    /// First row of this batch in the source dataset.
    pub fn offset(self, batch_size: u64) -> u64 {
        self.0.saturating_mul(batch_size)
    }

    /// File name used for the materialized batch.
    pub fn file_name(self) -> String {
        format!("batch_{}.csv", self.0)
    }

    /// Parses a `batch_{n}.csv` file name.
    pub fn from_file_name(name: &str) -> Option<BatchNumber> {
        name.strip_prefix("batch_")?
            .strip_suffix(".csv")?
            .parse()
            .ok()
            .map(BatchNumber)
    }
}

impl fmt::Display for BatchNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BatchNumber {
    fn from(value: u64) -> Self {
        BatchNumber(value)
    }
}

/// Rejected worker identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid worker id {id:?}: {reason}")]
pub struct InvalidWorkerId {
    pub id: String,
    pub reason: &'static str,
}

/// Identity of a worker. Also used as a directory name, so it is restricted
/// to a safe character set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerId(String);

impl WorkerId {
    const MAX_LEN: usize = 64;

    pub fn new(id: impl Into<String>) -> Result<Self, InvalidWorkerId> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else if id.len() > Self::MAX_LEN {
            Some("must be at most 64 bytes")
        } else if id.starts_with('.') {
            Some("must not start with '.'")
        } else if !id
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
        {
            Some("may only contain letters, digits, '_', '-', '.' and '@'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidWorkerId { id, reason }),
            None => Ok(Self(id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkerId {
    type Error = InvalidWorkerId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        WorkerId::new(value)
    }
}

impl From<WorkerId> for String {
    fn from(id: WorkerId) -> Self {
        id.0
    }
}

/// Phase of one allocation attempt.
///
/// `Idle -> Reserved -> Fetching -> {Committed | RolledBack}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    Idle,
    Reserved,
    Fetching,
    Committed,
    RolledBack,
}

impl AllocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Reserved => "reserved",
            Self::Fetching => "fetching",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// A committed allocation: the batch is recorded for the worker and its file exists.
#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub worker: WorkerId,
    pub batch: BatchNumber,
    pub path: PathBuf,
    pub rows: usize,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_file_name_round_trip() {
        let batch = BatchNumber(42);
        assert_eq!(batch.file_name(), "batch_42.csv");
        assert_eq!(BatchNumber::from_file_name("batch_42.csv"), Some(batch));
    }

    #[test]
    fn test_from_file_name_rejects_other_files() {
        assert_eq!(BatchNumber::from_file_name("batch_x.csv"), None);
        assert_eq!(BatchNumber::from_file_name("batch_1.json"), None);
        assert_eq!(BatchNumber::from_file_name(".edited_log_batch_1.csv.json"), None);
        assert_eq!(BatchNumber::from_file_name("notes.csv"), None);
    }

    #[test]
    fn test_offset() {
        assert_eq!(BatchNumber(0).offset(1000), 0);
        assert_eq!(BatchNumber(3).offset(1000), 3000);
        assert_eq!(BatchNumber(u64::MAX).offset(2), u64::MAX);
    }

    #[test]
    fn test_checked_next() {
        assert_eq!(BatchNumber(7).checked_next(), Some(BatchNumber(8)));
        assert_eq!(BatchNumber(u64::MAX).checked_next(), None);
    }

    #[test]
    fn test_worker_id_validation() {
        assert!(WorkerId::new("ada").is_ok());
        assert!(WorkerId::new("tolu.adeyemi@lab").is_ok());
        assert!(WorkerId::new("Ìbùkún").is_ok());

        assert!(WorkerId::new("").is_err());
        assert!(WorkerId::new("..").is_err());
        assert!(WorkerId::new(".hidden").is_err());
        assert!(WorkerId::new("a/b").is_err());
        assert!(WorkerId::new("a b").is_err());
        assert!(WorkerId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn test_worker_id_serde_validates() {
        let id: WorkerId = serde_json::from_str("\"bo\"").unwrap();
        assert_eq!(id.as_str(), "bo");
        assert!(serde_json::from_str::<WorkerId>("\"../etc\"").is_err());
    }
}
