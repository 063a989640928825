//! Fetcher module for materializing dataset slices.
//!
//! A fetch turns a batch number into `<fetched_dir>/<worker>/batch_{n}.csv`
//! holding rows `n * batch_size .. (n + 1) * batch_size` of the source.
//!
//! # Implementations
//!
//! - [`CommandFetcher`] runs an external export program
//! - [`SqliteDatasetFetcher`] reads a local SQLite table

mod command;
mod config;
mod error;
mod sqlite;
mod traits;
mod types;

use std::path::Path;
use std::sync::Arc;

pub use command::CommandFetcher;
pub use config::{CommandFetcherConfig, FetcherBackend, FetcherConfig, SqliteFetcherConfig};
pub use error::FetchError;
pub use sqlite::SqliteDatasetFetcher;
pub use traits::BatchFetcher;
pub use types::{batch_file_path, worker_dir, FetchedBatch};

/// Creates the configured fetcher.
pub fn create_fetcher(
    config: &FetcherConfig,
    fetched_dir: &Path,
    batch_size: u64,
) -> Result<Arc<dyn BatchFetcher>, FetchError> {
    match config.backend {
        FetcherBackend::Command => Ok(Arc::new(CommandFetcher::new(
            config.command.clone(),
            fetched_dir,
            batch_size,
        ))),
        FetcherBackend::Sqlite => Ok(Arc::new(SqliteDatasetFetcher::new(
            &config.sqlite,
            fetched_dir,
            batch_size,
        )?)),
    }
}
