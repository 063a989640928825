//! Per-worker review workflow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::edit_log::{CellRef, EditLog};
use super::error::ReviewError;
use super::types::{ArchiveOutcome, BatchFileEntry, ReviewState, SaveOutcome};
use crate::archive::{ArchiveCategory, ArchiveMover};
use crate::batch::{BatchAllocator, BatchNumber, WorkerId};
use crate::fetcher::worker_dir;
use crate::metrics;
use crate::pairs::{read_pairs, write_pairs, PairColumn, PairRow};

/// The file a session is working on.
#[derive(Debug)]
struct CheckedOutFile {
    batch: BatchNumber,
    path: PathBuf,
    /// Content as last written to disk.
    saved_rows: Vec<PairRow>,
    /// Content including unsaved edits.
    rows: Vec<PairRow>,
    state: ReviewState,
    edit_log: EditLog,
    edit_log_path: PathBuf,
}

/// Read-only view of the current file.
#[derive(Debug)]
pub struct CurrentFile<'a> {
    pub batch: BatchNumber,
    pub path: &'a Path,
    pub rows: &'a [PairRow],
    pub state: ReviewState,
    pub edit_log: &'a EditLog,
}

/// One worker's view of their checked-out batches.
///
/// A session holds at most one file open. Edits stay in memory until
/// [`save`](Self::save); [`accept`](Self::accept) and
/// [`reject`](Self::reject) archive the file as it is on disk.
pub struct ReviewSession {
    worker: WorkerId,
    worker_dir: PathBuf,
    edit_state_dir: PathBuf,
    allocator: Arc<BatchAllocator>,
    archiver: Arc<dyn ArchiveMover>,
    current: Option<CheckedOutFile>,
}

impl ReviewSession {
    /// Opens a session, allocating a first batch if the worker has no files.
    ///
    /// The file with the lowest batch number is selected.
    pub async fn open(
        worker: WorkerId,
        allocator: Arc<BatchAllocator>,
        archiver: Arc<dyn ArchiveMover>,
        edit_state_dir: impl Into<PathBuf>,
    ) -> Result<Self, ReviewError> {
        let worker_dir = worker_dir(&allocator.config().fetched_dir, &worker);
        let mut session = Self {
            worker,
            worker_dir,
            edit_state_dir: edit_state_dir.into(),
            allocator,
            archiver,
            current: None,
        };

        let files = session.list_files()?;
        match files.first() {
            Some(first) => {
                let batch = first.batch;
                session.select(batch)?;
            }
            None => {
                info!(worker = %session.worker, "No checked-out files, allocating a first batch");
                session.next().await?;
            }
        }
        Ok(session)
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// The worker's batch files, by batch number.
    pub fn list_files(&self) -> Result<Vec<BatchFileEntry>, ReviewError> {
        let entries = match std::fs::read_dir(&self.worker_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(batch) = BatchNumber::from_file_name(&file_name) else {
                continue;
            };
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            files.push(BatchFileEntry {
                batch,
                file_name,
                path: entry.path(),
                size_bytes: metadata.len(),
            });
        }
        files.sort_by_key(|f| f.batch);
        Ok(files)
    }

    /// Makes `batch` the current file. Unsaved edits to the previous file are dropped.
    pub fn select(&mut self, batch: BatchNumber) -> Result<(), ReviewError> {
        let path = self.worker_dir.join(batch.file_name());
        if !path.is_file() {
            return Err(ReviewError::FileNotFound { batch });
        }
        self.load(batch, path)
    }

    fn load(&mut self, batch: BatchNumber, path: PathBuf) -> Result<(), ReviewError> {
        let rows = read_pairs(&path)?;
        let edit_log_path = EditLog::path_for(&self.edit_state_dir, &path);
        let edit_log = EditLog::load(&edit_log_path)?;

        self.warn_if_unsaved("switching files");
        debug!(
            worker = %self.worker,
            %batch,
            rows = rows.len(),
            edited = edit_log.len(),
            "Loaded batch file"
        );
        self.current = Some(CheckedOutFile {
            batch,
            path,
            saved_rows: rows.clone(),
            rows,
            state: ReviewState::Loaded,
            edit_log,
            edit_log_path,
        });
        Ok(())
    }

    fn warn_if_unsaved(&self, action: &str) {
        if let Some(current) = &self.current {
            if current.state.has_unsaved_edits() {
                warn!(
                    worker = %self.worker,
                    batch = %current.batch,
                    action,
                    "Discarding unsaved edits"
                );
            }
        }
    }

    fn current_mut(&mut self) -> Result<&mut CheckedOutFile, ReviewError> {
        self.current.as_mut().ok_or(ReviewError::NoCurrentFile)
    }

    /// The open file, if any.
    pub fn current(&self) -> Option<CurrentFile<'_>> {
        self.current.as_ref().map(|c| CurrentFile {
            batch: c.batch,
            path: &c.path,
            rows: &c.rows,
            state: c.state,
            edit_log: &c.edit_log,
        })
    }

    /// Cells recorded as edited in the open file.
    pub fn edited_cells(&self) -> Result<Vec<CellRef>, ReviewError> {
        let current = self.current.as_ref().ok_or(ReviewError::NoCurrentFile)?;
        Ok(current.edit_log.cells().copied().collect())
    }

    /// Changes one cell in memory.
    pub fn edit_cell(
        &mut self,
        row: usize,
        column: PairColumn,
        value: impl Into<String>,
    ) -> Result<(), ReviewError> {
        let current = self.current_mut()?;
        let rows = current.rows.len();
        let target = current
            .rows
            .get_mut(row)
            .ok_or(ReviewError::RowOutOfRange { row, rows })?;
        target.set(column, value);
        current.state = ReviewState::Editing;
        Ok(())
    }

    /// Replaces every row in memory. The row count must not change.
    pub fn replace_rows(&mut self, rows: Vec<PairRow>) -> Result<(), ReviewError> {
        let current = self.current_mut()?;
        if rows.len() != current.rows.len() {
            return Err(ReviewError::RowCountMismatch {
                expected: current.rows.len(),
                actual: rows.len(),
            });
        }
        current.rows = rows;
        current.state = ReviewState::Editing;
        Ok(())
    }

    /// Writes the rows and records every cell that changed since the last save.
    pub fn save(&mut self) -> Result<SaveOutcome, ReviewError> {
        let worker = self.worker.clone();
        let current = self.current_mut()?;

        let changed = EditLog::diff(&current.saved_rows, &current.rows);
        let changed_cells = changed.len();
        let mut newly_marked = 0;
        if !changed.is_empty() {
            write_pairs(&current.path, &current.rows)?;
            let mut edit_log = current.edit_log.clone();
            newly_marked = edit_log.extend(changed);
            edit_log.save(&current.edit_log_path)?;
            current.edit_log = edit_log;
            current.saved_rows = current.rows.clone();
            metrics::EDITED_CELLS.inc_by(newly_marked as u64);
        }
        current.state = ReviewState::Saved;

        info!(
            %worker,
            batch = %current.batch,
            changed_cells,
            newly_marked,
            total_edited = current.edit_log.len(),
            "Saved batch file"
        );
        Ok(SaveOutcome {
            changed_cells,
            newly_marked,
            total_edited: current.edit_log.len(),
        })
    }

    /// Archives the open file as accepted.
    pub async fn accept(&mut self) -> Result<ArchiveOutcome, ReviewError> {
        self.archive(ArchiveCategory::Accepted).await
    }

    /// Archives the open file as rejected.
    pub async fn reject(&mut self) -> Result<ArchiveOutcome, ReviewError> {
        self.archive(ArchiveCategory::Rejected).await
    }

    async fn archive(&mut self, category: ArchiveCategory) -> Result<ArchiveOutcome, ReviewError> {
        let current = self.current.as_ref().ok_or(ReviewError::NoCurrentFile)?;
        let batch = current.batch;
        self.warn_if_unsaved(category.as_str());

        // The file stays checked out if the move fails.
        let receipt = self.archiver.archive(&current.path, category).await?;

        if let Some(current) = self.current.take() {
            if let Err(e) = EditLog::remove(&current.edit_log_path) {
                warn!(worker = %self.worker, %batch, error = %e, "Failed to remove edit log");
            }
        }

        let state = match category {
            ArchiveCategory::Accepted => ReviewState::Accepted,
            ArchiveCategory::Rejected => ReviewState::Rejected,
        };
        info!(worker = %self.worker, %batch, %category, "Batch reviewed");
        Ok(ArchiveOutcome {
            batch,
            state,
            receipt,
        })
    }

    /// Checks out a new batch and makes it current.
    ///
    /// The previous file is not archived; it stays on disk and can be
    /// selected again.
    pub async fn next(&mut self) -> Result<BatchNumber, ReviewError> {
        let allocation = self.allocator.allocate(&self.worker).await?;
        self.load(allocation.batch, allocation.path)?;
        Ok(allocation.batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{AllocatorConfig, SqliteBatchStore};
    use crate::testing::{MockArchiver, MockFetcher};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        allocator: Arc<BatchAllocator>,
        fetcher: Arc<MockFetcher>,
        archiver: Arc<MockArchiver>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let fetched_dir = temp.path().join("fetched_data");
            let store = Arc::new(SqliteBatchStore::in_memory().unwrap());
            let fetcher = Arc::new(MockFetcher::new(&fetched_dir, 3));
            let allocator = Arc::new(BatchAllocator::new(
                store.clone(),
                store,
                fetcher.clone(),
                AllocatorConfig {
                    fetch_timeout: Duration::from_secs(5),
                    commit_empty_batches: false,
                    fetched_dir,
                },
            ));
            let archiver = Arc::new(MockArchiver::new(temp.path().join("archive")));
            Self {
                temp,
                allocator,
                fetcher,
                archiver,
            }
        }

        async fn open(&self, worker: &str) -> ReviewSession {
            ReviewSession::open(
                WorkerId::new(worker).unwrap(),
                self.allocator.clone(),
                self.archiver.clone(),
                self.temp.path().join("edit_states"),
            )
            .await
            .unwrap()
        }
    }

    #[tokio::test]
    async fn test_open_allocates_when_empty() {
        let f = Fixture::new();
        let session = f.open("ada").await;

        let current = session.current().unwrap();
        assert_eq!(current.batch, BatchNumber(0));
        assert_eq!(current.rows.len(), 3);
        assert_eq!(current.state, ReviewState::Loaded);
        assert_eq!(f.fetcher.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_reopen_resumes_existing_file() {
        let f = Fixture::new();
        drop(f.open("ada").await);

        let session = f.open("ada").await;

        assert_eq!(session.current().unwrap().batch, BatchNumber(0));
        assert_eq!(f.fetcher.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_edit_and_save_updates_log() {
        let f = Fixture::new();
        let mut session = f.open("ada").await;

        session.edit_cell(1, PairColumn::EnglishText, "fixed").unwrap();
        assert_eq!(session.current().unwrap().state, ReviewState::Editing);

        let outcome = session.save().unwrap();
        assert_eq!(outcome.changed_cells, 1);
        assert_eq!(outcome.newly_marked, 1);
        assert_eq!(session.current().unwrap().state, ReviewState::Saved);

        // Same cell again plus a new one: union, not replacement
        session.edit_cell(1, PairColumn::EnglishText, "fixed twice").unwrap();
        session.edit_cell(0, PairColumn::YorubaText, "tún ṣe").unwrap();
        let outcome = session.save().unwrap();
        assert_eq!(outcome.changed_cells, 2);
        assert_eq!(outcome.newly_marked, 1);
        assert_eq!(outcome.total_edited, 2);

        let path = session.current().unwrap().path.to_path_buf();
        let on_disk = read_pairs(&path).unwrap();
        assert_eq!(on_disk[1].english_text, "fixed twice");
        assert_eq!(on_disk[0].yoruba_text, "tún ṣe");

        let stored = EditLog::load(&EditLog::path_for(&f.temp.path().join("edit_states"), &path))
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_save_without_changes_writes_nothing() {
        let f = Fixture::new();
        let mut session = f.open("ada").await;

        let outcome = session.save().unwrap();

        assert_eq!(outcome.changed_cells, 0);
        assert!(session.edited_cells().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_out_of_range() {
        let f = Fixture::new();
        let mut session = f.open("ada").await;

        let result = session.edit_cell(3, PairColumn::YorubaText, "x");
        assert!(matches!(
            result,
            Err(ReviewError::RowOutOfRange { row: 3, rows: 3 })
        ));
    }

    #[tokio::test]
    async fn test_replace_rows_requires_same_count() {
        let f = Fixture::new();
        let mut session = f.open("ada").await;

        let result = session.replace_rows(vec![PairRow::new("a", "b")]);
        assert!(matches!(
            result,
            Err(ReviewError::RowCountMismatch {
                expected: 3,
                actual: 1
            })
        ));

        let mut rows = session.current().unwrap().rows.to_vec();
        rows[2].english_text = "changed".to_string();
        session.replace_rows(rows).unwrap();
        assert_eq!(session.save().unwrap().changed_cells, 1);
    }

    #[tokio::test]
    async fn test_accept_archives_and_clears_log() {
        let f = Fixture::new();
        let mut session = f.open("ada").await;
        session.edit_cell(0, PairColumn::EnglishText, "good").unwrap();
        session.save().unwrap();
        let path = session.current().unwrap().path.to_path_buf();
        let log_path = EditLog::path_for(&f.temp.path().join("edit_states"), &path);
        assert!(log_path.exists());

        let outcome = session.accept().await.unwrap();

        assert_eq!(outcome.state, ReviewState::Accepted);
        assert!(!path.exists());
        assert!(!log_path.exists());
        assert!(f
            .archiver
            .dir_for(ArchiveCategory::Accepted)
            .join("batch_0.csv")
            .exists());
        assert!(session.current().is_none());
        assert!(matches!(
            session.save(),
            Err(ReviewError::NoCurrentFile)
        ));

        // Numbering and assignments are untouched
        assert_eq!(f.allocator.peek_next().unwrap(), BatchNumber(1));
        assert_eq!(
            f.allocator
                .assignments_for(&WorkerId::new("ada").unwrap())
                .unwrap(),
            vec![BatchNumber(0)]
        );
    }

    #[tokio::test]
    async fn test_failed_archive_keeps_file_checked_out() {
        let f = Fixture::new();
        let mut session = f.open("ada").await;
        f.archiver
            .set_next_error(crate::archive::ArchiveError::Io(std::io::Error::other(
                "disk full",
            )))
            .await;

        let result = session.reject().await;

        assert!(matches!(result, Err(ReviewError::Archive(_))));
        let current = session.current().unwrap();
        assert_eq!(current.batch, BatchNumber(0));
        assert!(current.path.exists());
    }

    #[tokio::test]
    async fn test_next_keeps_previous_file() {
        let f = Fixture::new();
        let mut session = f.open("ada").await;

        let batch = session.next().await.unwrap();

        assert_eq!(batch, BatchNumber(1));
        assert_eq!(session.current().unwrap().batch, BatchNumber(1));
        let files: Vec<BatchNumber> = session.list_files().unwrap().iter().map(|f| f.batch).collect();
        assert_eq!(files, vec![BatchNumber(0), BatchNumber(1)]);

        session.select(BatchNumber(0)).unwrap();
        assert_eq!(session.current().unwrap().batch, BatchNumber(0));
    }

    #[tokio::test]
    async fn test_select_unknown_batch() {
        let f = Fixture::new();
        let mut session = f.open("ada").await;

        assert!(matches!(
            session.select(BatchNumber(9)),
            Err(ReviewError::FileNotFound { .. })
        ));
        assert_eq!(session.current().unwrap().batch, BatchNumber(0));
    }

    #[tokio::test]
    async fn test_open_reports_initial_fetch_failure() {
        let f = Fixture::new();
        f.fetcher
            .set_next_error(crate::fetcher::FetchError::unavailable("offline"))
            .await;

        let result = ReviewSession::open(
            WorkerId::new("ada").unwrap(),
            f.allocator.clone(),
            f.archiver.clone(),
            f.temp.path().join("edit_states"),
        )
        .await;

        assert!(matches!(
            result,
            Err(ReviewError::Allocation(
                crate::batch::AllocationError::InitialFetch { .. }
            ))
        ));
    }
}
