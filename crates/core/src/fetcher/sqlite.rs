//! Fetcher that slices a local SQLite table of pairs.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use super::config::SqliteFetcherConfig;
use super::error::FetchError;
use super::traits::BatchFetcher;
use super::types::{batch_file_path, FetchedBatch};
use crate::batch::{BatchNumber, WorkerId};
use crate::pairs::{write_pairs, PairRow};

/// Reads `LIMIT batch_size OFFSET batch * batch_size` rows ordered by a key
/// column and writes them as the batch CSV.
pub struct SqliteDatasetFetcher {
    conn: Arc<Mutex<Connection>>,
    query: String,
    fetched_dir: PathBuf,
    batch_size: u64,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SqliteDatasetFetcher {
    /// Opens the source database read-only.
    pub fn new(
        config: &SqliteFetcherConfig,
        fetched_dir: impl Into<PathBuf>,
        batch_size: u64,
    ) -> Result<Self, FetchError> {
        let conn = Connection::open_with_flags(
            &config.database_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            FetchError::unavailable(format!(
                "cannot open {}: {e}",
                config.database_path.display()
            ))
        })?;
        let fetcher = Self::with_connection(conn, config, fetched_dir, batch_size)?;
        info!(
            database = %config.database_path.display(),
            table = %config.table,
            batch_size,
            "Using SQLite dataset fetcher"
        );
        Ok(fetcher)
    }

    /// Uses an already open connection (useful for testing).
    pub fn with_connection(
        conn: Connection,
        config: &SqliteFetcherConfig,
        fetched_dir: impl Into<PathBuf>,
        batch_size: u64,
    ) -> Result<Self, FetchError> {
        for name in [&config.table, &config.order_by] {
            if !is_identifier(name) {
                return Err(FetchError::unavailable(format!(
                    "invalid SQL identifier {name:?}"
                )));
            }
        }
        let query = format!(
            "SELECT yoruba_text, english_text FROM {} ORDER BY {} LIMIT ? OFFSET ?",
            config.table, config.order_by
        );
        // Surface a wrong table or column at startup instead of on the first fetch.
        conn.prepare(&query)
            .map_err(|e| FetchError::unavailable(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            query,
            fetched_dir: fetched_dir.into(),
            batch_size,
        })
    }

    fn read_slice(
        conn: &Mutex<Connection>,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PairRow>, FetchError> {
        let conn = conn
            .lock()
            .map_err(|_| FetchError::unavailable("source connection lock poisoned"))?;
        let mut stmt = conn
            .prepare_cached(query)
            .map_err(|e| FetchError::unavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit, offset], |row| {
                Ok(PairRow {
                    yoruba_text: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    english_text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })
            .map_err(|e| FetchError::unavailable(e.to_string()))?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row.map_err(|e| FetchError::unavailable(e.to_string()))?);
        }
        Ok(pairs)
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64, FetchError> {
    i64::try_from(value).map_err(|_| FetchError::unavailable(format!("{what} {value} is out of range")))
}

#[async_trait]
impl BatchFetcher for SqliteDatasetFetcher {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn fetch(
        &self,
        batch: BatchNumber,
        worker: &WorkerId,
    ) -> Result<FetchedBatch, FetchError> {
        let limit = to_i64(self.batch_size, "batch size")?;
        let offset = to_i64(batch.offset(self.batch_size), "offset")?;
        let path = batch_file_path(&self.fetched_dir, worker, batch);

        let conn = Arc::clone(&self.conn);
        let query = self.query.clone();
        let target = path.clone();
        let rows = tokio::task::spawn_blocking(move || -> Result<usize, FetchError> {
            let pairs = SqliteDatasetFetcher::read_slice(&conn, &query, limit, offset)?;
            write_slice(&target, &pairs)?;
            Ok(pairs.len())
        })
        .await
        .map_err(|e| FetchError::unavailable(format!("fetch task failed: {e}")))??;

        debug!(%batch, %worker, rows, offset, "Fetched batch from SQLite");
        Ok(FetchedBatch {
            batch,
            worker: worker.clone(),
            path,
            rows,
        })
    }
}

fn write_slice(path: &Path, pairs: &[PairRow]) -> Result<(), FetchError> {
    write_pairs(path, pairs)?;
    Ok(())
}
