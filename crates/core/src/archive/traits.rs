//! Trait definitions for the archive module.

use async_trait::async_trait;
use std::path::Path;

use super::error::{ArchiveError, MirrorError};
use super::types::{ArchiveCategory, ArchiveReceipt};

/// Moves a reviewed file to its terminal folder.
#[async_trait]
pub trait ArchiveMover: Send + Sync {
    /// Returns the name of this archiver implementation.
    fn name(&self) -> &str;

    /// Archives `file` under `category`.
    ///
    /// On success the file is no longer at its original path. On error it is
    /// still there, unchanged.
    async fn archive(
        &self,
        file: &Path,
        category: ArchiveCategory,
    ) -> Result<ArchiveReceipt, ArchiveError>;
}

/// Remote store holding copies of archived files.
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Returns the name of this mirror implementation.
    fn name(&self) -> &str;

    /// Uploads `local` to `remote_path` (`{category}/{file_name}`).
    async fn upload(&self, local: &Path, remote_path: &str) -> Result<(), MirrorError>;
}
