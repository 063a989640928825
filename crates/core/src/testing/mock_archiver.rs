//! Mock archiver for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::archive::{
    ArchiveCategory, ArchiveError, ArchiveMover, ArchiveReceipt, MirrorStatus,
};

/// A recorded archive call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedArchive {
    pub file: PathBuf,
    pub category: ArchiveCategory,
    pub success: bool,
}

/// Mock implementation of the ArchiveMover trait.
///
/// Moves files into `<root>/accepted` or `<root>/rejected` with a plain
/// rename, and can be told to fail the next call.
#[derive(Debug)]
pub struct MockArchiver {
    root: PathBuf,
    archives: Arc<RwLock<Vec<RecordedArchive>>>,
    next_error: Arc<RwLock<Option<ArchiveError>>>,
}

impl MockArchiver {
    /// Create a mock archiver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            archives: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Folder the mock uses for `category`.
    pub fn dir_for(&self, category: ArchiveCategory) -> PathBuf {
        self.root.join(category.as_str())
    }

    /// Get all recorded archive calls.
    pub async fn recorded_archives(&self) -> Vec<RecordedArchive> {
        self.archives.read().await.clone()
    }

    /// Configure the next archive to fail with the given error.
    pub async fn set_next_error(&self, error: ArchiveError) {
        *self.next_error.write().await = Some(error);
    }

    async fn record(&self, file: &Path, category: ArchiveCategory, success: bool) {
        self.archives.write().await.push(RecordedArchive {
            file: file.to_path_buf(),
            category,
            success,
        });
    }
}

#[async_trait]
impl ArchiveMover for MockArchiver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn archive(
        &self,
        file: &Path,
        category: ArchiveCategory,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        if let Some(err) = self.next_error.write().await.take() {
            self.record(file, category, false).await;
            return Err(err);
        }

        let Some(name) = file.file_name() else {
            return Err(ArchiveError::SourceNotFound {
                path: file.to_path_buf(),
            });
        };
        let dir = self.dir_for(category);
        tokio::fs::create_dir_all(&dir).await?;
        let destination = dir.join(name);
        tokio::fs::rename(file, &destination).await?;
        let size_bytes = tokio::fs::metadata(&destination).await?.len();

        self.record(file, category, true).await;
        Ok(ArchiveReceipt {
            category,
            source: file.to_path_buf(),
            destination,
            size_bytes,
            checksum: None,
            mirror: MirrorStatus::Disabled,
        })
    }
}
