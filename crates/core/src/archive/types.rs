//! Types for the archive module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Terminal folder of a reviewed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveCategory {
    Accepted,
    Rejected,
}

impl ArchiveCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveCategory::Accepted => "accepted",
            ArchiveCategory::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ArchiveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the remote copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MirrorStatus {
    /// No mirror configured.
    Disabled,
    Uploaded { remote_path: String },
    Failed { remote_path: String, reason: String },
}

/// Result of a successful archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    pub category: ArchiveCategory,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub size_bytes: u64,
    /// SHA-256 of the archived file, when verification is enabled.
    pub checksum: Option<String>,
    pub mirror: MirrorStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_status_serialization() {
        let json = serde_json::to_value(MirrorStatus::Failed {
            remote_path: "accepted/batch_0.csv".to_string(),
            reason: "HTTP 503".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["remote_path"], "accepted/batch_0.csv");
    }
}
