//! Fetcher that delegates to an external export program.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::config::CommandFetcherConfig;
use super::error::FetchError;
use super::traits::BatchFetcher;
use super::types::{batch_file_path, FetchedBatch};
use crate::batch::{BatchNumber, WorkerId};
use crate::fsio;
use crate::pairs::read_pairs;

/// Runs a program that exports one batch to a CSV file.
///
/// The child is spawned with `kill_on_drop`, so a fetch future dropped by the
/// allocator's timeout also terminates the program.
pub struct CommandFetcher {
    config: CommandFetcherConfig,
    fetched_dir: PathBuf,
    batch_size: u64,
}

impl CommandFetcher {
    pub fn new(config: CommandFetcherConfig, fetched_dir: impl Into<PathBuf>, batch_size: u64) -> Self {
        let fetched_dir = fetched_dir.into();
        info!(
            program = %config.program,
            fetched_dir = %fetched_dir.display(),
            batch_size,
            "Using command fetcher"
        );
        warn!(
            "Command fetcher cannot verify that the export program reads rows in a stable order; \
             batches may overlap or skip rows if the source order changes"
        );
        Self {
            config,
            fetched_dir,
            batch_size,
        }
    }

    /// Expands the argument templates for one fetch.
    pub fn render_args(&self, batch: BatchNumber, worker: &WorkerId, output: &Path) -> Vec<String> {
        let batch_number = batch.to_string();
        let batch_size = self.batch_size.to_string();
        let output = output.to_string_lossy();
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{batch_number}", &batch_number)
                    .replace("{worker}", worker.as_str())
                    .replace("{batch_size}", &batch_size)
                    .replace("{output}", &output)
            })
            .collect()
    }

    fn discard(path: &Path) {
        if let Err(e) = fsio::remove_if_exists(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove partial batch file");
        }
    }
}

/// Keeps the last `limit` bytes of `text`, on a character boundary.
fn tail(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[async_trait]
impl BatchFetcher for CommandFetcher {
    fn name(&self) -> &str {
        "command"
    }

    async fn fetch(
        &self,
        batch: BatchNumber,
        worker: &WorkerId,
    ) -> Result<FetchedBatch, FetchError> {
        let output_path = batch_file_path(&self.fetched_dir, worker, batch);
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // A stale file must not be mistaken for this run's output.
        fsio::remove_if_exists(&output_path)?;

        let args = self.render_args(batch, worker, &output_path);
        debug!(program = %self.config.program, ?args, %batch, %worker, "Running fetch program");

        let mut command = Command::new(&self.config.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| FetchError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            Self::discard(&output_path);
            return Err(FetchError::Failed {
                status: output.status.code(),
                stderr: tail(
                    &String::from_utf8_lossy(&output.stderr),
                    self.config.stderr_limit,
                ),
            });
        }

        if !output_path.is_file() {
            return Err(FetchError::MissingOutput { path: output_path });
        }

        let rows = match read_pairs(&output_path) {
            Ok(rows) => rows.len(),
            Err(e) => {
                Self::discard(&output_path);
                return Err(e.into());
            }
        };

        Ok(FetchedBatch {
            batch,
            worker: worker.clone(),
            path: output_path,
            rows,
        })
    }
}
