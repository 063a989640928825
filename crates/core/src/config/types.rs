use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::archive::ArchiveConfig;
use crate::batch::AllocatorConfig;
use crate::fetcher::{FetcherBackend, FetcherConfig};
use crate::review::ReviewConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl Config {
    /// Allocator settings derived from the batch and review sections.
    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            fetch_timeout: Duration::from_secs(self.batch.fetch_timeout_secs),
            commit_empty_batches: self.batch.commit_empty_batches,
            fetched_dir: self.review.fetched_dir.clone(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Required when `method = "api_key"`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ApiKey => "api_key",
        }
    }
}

/// Where the batch counter and assignment ledger live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Two JSON files, compatible with hand-edited records.
    #[default]
    Json,
    /// One SQLite database holding both.
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Counter file for the JSON backend.
    #[serde(default = "default_counter_path")]
    pub counter_path: PathBuf,
    /// Ledger file for the JSON backend.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Database file for the SQLite backend.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            counter_path: default_counter_path(),
            ledger_path: default_ledger_path(),
            database_path: default_database_path(),
        }
    }
}

fn default_counter_path() -> PathBuf {
    PathBuf::from("data/batch.json")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("config/tasks.json")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/curator.db")
}

/// Batch allocation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Rows per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Upper bound on a single fetch.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Keep batches that fetched zero rows instead of rolling them back.
    #[serde(default)]
    pub commit_empty_batches: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            fetch_timeout_secs: default_fetch_timeout(),
            commit_empty_batches: false,
        }
    }
}

fn default_batch_size() -> u64 {
    1000
}

fn default_fetch_timeout() -> u64 {
    300
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub batch: BatchConfig,
    pub fetcher: SanitizedFetcherConfig,
    pub review: ReviewConfig,
    pub archive: SanitizedArchiveConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

/// Only the active fetcher's settings are shown.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedFetcherConfig {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedArchiveConfig {
    pub accepted_dir: PathBuf,
    pub rejected_dir: PathBuf,
    pub overwrite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror: Option<SanitizedMirrorConfig>,
}

/// Mirror config with the token hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMirrorConfig {
    pub base_url: String,
    pub api_token_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let fetcher = &config.fetcher;
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
                api_key_configured: config
                    .auth
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
            },
            server: config.server.clone(),
            storage: config.storage.clone(),
            batch: config.batch.clone(),
            fetcher: SanitizedFetcherConfig {
                backend: match fetcher.backend {
                    FetcherBackend::Command => "command".to_string(),
                    FetcherBackend::Sqlite => "sqlite".to_string(),
                },
                program: (fetcher.backend == FetcherBackend::Command)
                    .then(|| fetcher.command.program.clone()),
                database_path: (fetcher.backend == FetcherBackend::Sqlite)
                    .then(|| fetcher.sqlite.database_path.clone()),
            },
            review: config.review.clone(),
            archive: SanitizedArchiveConfig {
                accepted_dir: config.archive.accepted_dir.clone(),
                rejected_dir: config.archive.rejected_dir.clone(),
                overwrite: config.archive.overwrite,
                mirror: config
                    .archive
                    .mirror
                    .as_ref()
                    .map(|m| SanitizedMirrorConfig {
                        base_url: m.base_url.clone(),
                        api_token_configured: m.api_token.is_some(),
                        timeout_secs: m.timeout_secs,
                    }),
            },
        }
    }
}
