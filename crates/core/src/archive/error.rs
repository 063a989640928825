//! Error types for the archive module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while archiving a reviewed file.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Source file not found.
    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Destination already exists and overwrite is disabled.
    #[error("Destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// Failed to create the archive directory.
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to move the file.
    #[error("Failed to move file from {source} to {destination}")]
    MoveFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to copy the file across devices.
    #[error("Failed to copy file from {source} to {destination}")]
    CopyFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// The copied file does not match the original.
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::CopyFailed { .. } | Self::MoveFailed { .. }
        )
    }
}

/// Errors from a remote mirror upload. These never fail an archive.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Reading the local file failed.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request could not be sent.
    #[error("Mirror request failed: {0}")]
    Request(String),

    /// The remote store answered with an error status.
    #[error("Mirror returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The upload did not finish in time.
    #[error("Mirror upload timed out")]
    Timeout,
}
