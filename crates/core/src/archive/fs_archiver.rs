//! Local filesystem archiver.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

use super::config::ArchiveConfig;
use super::error::ArchiveError;
use super::traits::{ArchiveMover, RemoteMirror};
use super::types::{ArchiveCategory, ArchiveReceipt, MirrorStatus};
use crate::metrics;

const BUFFER_SIZE: usize = 64 * 1024;

/// Moves files into the accepted/rejected folders, then mirrors them.
///
/// The local move is authoritative. Mirror failures are logged and recorded
/// in the receipt but never fail the archive.
pub struct FsArchiver {
    config: ArchiveConfig,
    mirror: Option<Arc<dyn RemoteMirror>>,
}

impl FsArchiver {
    pub fn new(config: ArchiveConfig) -> Self {
        Self {
            config,
            mirror: None,
        }
    }

    /// Adds a remote mirror.
    pub fn with_mirror(mut self, mirror: Arc<dyn RemoteMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Folder for `category`.
    pub fn dir_for(&self, category: ArchiveCategory) -> &Path {
        match category {
            ArchiveCategory::Accepted => &self.config.accepted_dir,
            ArchiveCategory::Rejected => &self.config.rejected_dir,
        }
    }

    /// Attempts an atomic rename. Returns `Ok(false)` when the destination is
    /// on another filesystem and a copy is needed.
    async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
        match fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            // EXDEV is 18 on Linux
            Err(e)
                if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn copy_then_remove(
        &self,
        source: &Path,
        destination: &Path,
        expected: Option<&str>,
    ) -> Result<(), ArchiveError> {
        fs::copy(source, destination)
            .await
            .map_err(|error| ArchiveError::CopyFailed {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
                error,
            })?;

        if let Some(expected) = expected {
            let actual = sha256_file(destination).await?;
            if actual != expected {
                let _ = fs::remove_file(destination).await;
                return Err(ArchiveError::ChecksumMismatch {
                    path: destination.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        fs::remove_file(source).await?;
        Ok(())
    }

    async fn mirror_file(&self, destination: &Path, category: ArchiveCategory) -> MirrorStatus {
        let Some(mirror) = &self.mirror else {
            return MirrorStatus::Disabled;
        };
        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let remote_path = format!("{}/{}", category.as_str(), file_name);

        match mirror.upload(destination, &remote_path).await {
            Ok(()) => {
                debug!(mirror = mirror.name(), %remote_path, "Mirrored archived file");
                MirrorStatus::Uploaded { remote_path }
            }
            Err(e) => {
                warn!(mirror = mirror.name(), %remote_path, error = %e, "Mirror upload failed");
                metrics::MIRROR_FAILURES.inc();
                MirrorStatus::Failed {
                    remote_path,
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// SHA-256 of a file as lowercase hex.
pub(crate) async fn sha256_file(path: &Path) -> Result<String, std::io::Error> {
    let file = File::open(path).await?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut hasher = Sha256::new();
    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[async_trait]
impl ArchiveMover for FsArchiver {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn archive(
        &self,
        file: &Path,
        category: ArchiveCategory,
    ) -> Result<ArchiveReceipt, ArchiveError> {
        if !fs::try_exists(file).await.unwrap_or(false) {
            return Err(ArchiveError::SourceNotFound {
                path: file.to_path_buf(),
            });
        }
        let file_name = file.file_name().ok_or_else(|| ArchiveError::SourceNotFound {
            path: file.to_path_buf(),
        })?;

        let dir = self.dir_for(category);
        fs::create_dir_all(dir)
            .await
            .map_err(|source| ArchiveError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                source,
            })?;

        let destination: PathBuf = dir.join(file_name);
        if !self.config.overwrite && fs::try_exists(&destination).await.unwrap_or(false) {
            return Err(ArchiveError::DestinationExists { path: destination });
        }

        let checksum = if self.config.verify_checksums {
            Some(sha256_file(file).await?)
        } else {
            None
        };

        let moved = Self::try_atomic_move(file, &destination)
            .await
            .map_err(|error| ArchiveError::MoveFailed {
                source: file.to_path_buf(),
                destination: destination.clone(),
                error,
            })?;
        if !moved {
            debug!(source = %file.display(), "Rename crosses devices, copying");
            self.copy_then_remove(file, &destination, checksum.as_deref())
                .await?;
        }

        let size_bytes = fs::metadata(&destination).await?.len();
        metrics::ARCHIVED_FILES
            .with_label_values(&[category.as_str()])
            .inc();
        info!(
            %category,
            source = %file.display(),
            destination = %destination.display(),
            size_bytes,
            "Archived reviewed file"
        );

        let mirror = self.mirror_file(&destination, category).await;

        Ok(ArchiveReceipt {
            category,
            source: file.to_path_buf(),
            destination,
            size_bytes,
            checksum,
            mirror,
        })
    }
}
