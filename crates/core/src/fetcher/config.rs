//! Configuration for the fetcher module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which fetcher implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetcherBackend {
    /// Run an external export program.
    #[default]
    Command,
    /// Read pairs from a local SQLite table.
    Sqlite,
}

/// Fetcher section of the configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default)]
    pub backend: FetcherBackend,

    #[serde(default)]
    pub command: CommandFetcherConfig,

    #[serde(default)]
    pub sqlite: SqliteFetcherConfig,
}

/// Configuration for [`CommandFetcher`](super::CommandFetcher).
///
/// Arguments may contain the placeholders `{batch_number}`, `{worker}`,
/// `{batch_size}` and `{output}`. The program must write the batch CSV to
/// `{output}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFetcherConfig {
    /// Program to run.
    #[serde(default = "default_program")]
    pub program: String,

    /// Argument templates.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory for the program. Defaults to the server's.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Bytes of stderr kept in error reports.
    #[serde(default = "default_stderr_limit")]
    pub stderr_limit: usize,
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    [
        "process.py",
        "--batch_number",
        "{batch_number}",
        "--username",
        "{worker}",
        "--batch_size",
        "{batch_size}",
        "--output",
        "{output}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_stderr_limit() -> usize {
    4096
}

impl Default for CommandFetcherConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: None,
            stderr_limit: default_stderr_limit(),
        }
    }
}

/// Configuration for [`SqliteDatasetFetcher`](super::SqliteDatasetFetcher).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteFetcherConfig {
    /// Database holding the source pairs.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Table with `yoruba_text` and `english_text` columns.
    #[serde(default = "default_table")]
    pub table: String,

    /// Column giving the stable row order.
    #[serde(default = "default_order_by")]
    pub order_by: String,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/pairs.db")
}

fn default_table() -> String {
    "pairs".to_string()
}

fn default_order_by() -> String {
    "id".to_string()
}

impl Default for SqliteFetcherConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            table: default_table(),
            order_by: default_order_by(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_section() {
        let config: FetcherConfig = toml::from_str("").unwrap();
        assert_eq!(config.backend, FetcherBackend::Command);
        assert_eq!(config.command.program, "python3");
        assert!(config.command.args.iter().any(|a| a == "{output}"));
        assert_eq!(config.sqlite.table, "pairs");
    }

    #[test]
    fn test_sqlite_backend() {
        let config: FetcherConfig = toml::from_str(
            r#"
            backend = "sqlite"

            [sqlite]
            database_path = "/srv/corpus.db"
            table = "sentences"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, FetcherBackend::Sqlite);
        assert_eq!(config.sqlite.database_path, PathBuf::from("/srv/corpus.db"));
        assert_eq!(config.sqlite.table, "sentences");
        assert_eq!(config.sqlite.order_by, "id");
    }
}
