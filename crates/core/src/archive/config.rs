//! Configuration for the archive module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Archive section of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Destination of accepted files.
    #[serde(default = "default_accepted_dir")]
    pub accepted_dir: PathBuf,

    /// Destination of rejected files.
    #[serde(default = "default_rejected_dir")]
    pub rejected_dir: PathBuf,

    /// Whether to verify checksums when a move falls back to copying.
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    /// Whether an archived file may replace one with the same name.
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// Optional remote copy of every archived file.
    #[serde(default)]
    pub mirror: Option<MirrorConfig>,
}

fn default_accepted_dir() -> PathBuf {
    PathBuf::from("processed_data")
}

fn default_rejected_dir() -> PathBuf {
    PathBuf::from("rejected_data")
}

fn default_true() -> bool {
    true
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            accepted_dir: default_accepted_dir(),
            rejected_dir: default_rejected_dir(),
            verify_checksums: true,
            overwrite: true,
            mirror: None,
        }
    }
}

impl ArchiveConfig {
    /// Sets the accepted and rejected directories.
    pub fn with_dirs(mut self, accepted: impl Into<PathBuf>, rejected: impl Into<PathBuf>) -> Self {
        self.accepted_dir = accepted.into();
        self.rejected_dir = rejected.into();
        self
    }

    /// Sets whether existing files may be replaced.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Remote store receiving `PUT {base_url}/{category}/{file_name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub base_url: String,

    /// Sent as a bearer token when set.
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_mirror_timeout")]
    pub timeout_secs: u64,
}

fn default_mirror_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ArchiveConfig = toml::from_str("").unwrap();
        assert_eq!(config.accepted_dir, PathBuf::from("processed_data"));
        assert_eq!(config.rejected_dir, PathBuf::from("rejected_data"));
        assert!(config.verify_checksums);
        assert!(config.overwrite);
        assert!(config.mirror.is_none());
    }

    #[test]
    fn test_mirror_section() {
        let config: ArchiveConfig = toml::from_str(
            r#"
            [mirror]
            base_url = "https://storage.example.org/curation"
            api_token = "secret"
            "#,
        )
        .unwrap();
        let mirror = config.mirror.unwrap();
        assert_eq!(mirror.base_url, "https://storage.example.org/curation");
        assert_eq!(mirror.timeout_secs, 30);
    }
}
