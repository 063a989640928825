//! Archive module for reviewed files.
//!
//! Accepted and rejected files leave the worker's directory for a terminal
//! folder. The local move is the source of truth; an optional
//! [`RemoteMirror`] receives a copy afterwards.

mod config;
mod error;
mod fs_archiver;
mod http_mirror;
mod traits;
mod types;

use std::sync::Arc;

pub use config::{ArchiveConfig, MirrorConfig};
pub use error::{ArchiveError, MirrorError};
pub use fs_archiver::FsArchiver;
pub use http_mirror::HttpMirror;
pub use traits::{ArchiveMover, RemoteMirror};
pub use types::{ArchiveCategory, ArchiveReceipt, MirrorStatus};

/// Creates the configured archiver, with its mirror if one is set.
pub fn create_archiver(config: &ArchiveConfig) -> Result<Arc<dyn ArchiveMover>, MirrorError> {
    let archiver = FsArchiver::new(config.clone());
    let archiver = match &config.mirror {
        Some(mirror) => archiver.with_mirror(Arc::new(HttpMirror::new(mirror)?)),
        None => archiver,
    };
    Ok(Arc::new(archiver))
}
