//! Error types for the fetcher module.

use std::path::PathBuf;
use thiserror::Error;

use crate::pairs::PairsError;

/// Errors that can occur while materializing a batch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The fetch program could not be started.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The fetch program exited unsuccessfully.
    #[error("Fetch program exited with {}: {stderr}", exit_label(.status))]
    Failed { status: Option<i32>, stderr: String },

    /// The fetch did not finish in time.
    #[error("Fetch timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The fetch reported success but the batch file is not there.
    #[error("Fetch produced no output at {path}")]
    MissingOutput { path: PathBuf },

    /// The data source refused or failed the query.
    #[error("Data source error: {0}")]
    Source(String),

    /// I/O error while preparing or writing the batch file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The batch file could not be written or parsed.
    #[error(transparent)]
    Pairs(#[from] PairsError),
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

impl FetchError {
    /// Creates a new data source error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Source(reason.into())
    }

    /// Whether a later attempt has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. } | Self::Timeout { .. } | Self::Source(_) | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_message_includes_status() {
        let err = FetchError::Failed {
            status: Some(2),
            stderr: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Fetch program exited with status 2: connection refused"
        );

        let killed = FetchError::Failed {
            status: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("killed by signal"));
    }

    #[test]
    fn test_retryable() {
        assert!(FetchError::Timeout { timeout_secs: 5 }.is_retryable());
        assert!(FetchError::unavailable("down").is_retryable());
        assert!(!FetchError::MissingOutput {
            path: PathBuf::from("x")
        }
        .is_retryable());
    }
}
