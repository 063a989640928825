//! Mock remote mirror for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::archive::{MirrorError, RemoteMirror};

/// A recorded upload for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub local: PathBuf,
    pub remote_path: String,
    pub success: bool,
}

/// Mock implementation of the RemoteMirror trait.
#[derive(Debug, Default)]
pub struct MockMirror {
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    fail_uploads: Arc<RwLock<bool>>,
}

impl MockMirror {
    /// Create a new mock mirror that accepts every upload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded uploads.
    pub async fn recorded_uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    /// Make every following upload fail.
    pub async fn set_fail_uploads(&self, fail: bool) {
        *self.fail_uploads.write().await = fail;
    }
}

#[async_trait]
impl RemoteMirror for MockMirror {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload(&self, local: &Path, remote_path: &str) -> Result<(), MirrorError> {
        let fail = *self.fail_uploads.read().await;
        self.uploads.write().await.push(RecordedUpload {
            local: local.to_path_buf(),
            remote_path: remote_path.to_string(),
            success: !fail,
        });
        if fail {
            return Err(MirrorError::Status {
                status: 503,
                body: "mock mirror unavailable".to_string(),
            });
        }
        Ok(())
    }
}
