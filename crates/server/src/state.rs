use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tracing::debug;

use curator_core::{
    ArchiveMover, Authenticator, BatchAllocator, Config, ReviewError, ReviewSession,
    SanitizedConfig, WorkerId,
};

/// Exclusive access to one worker's open session.
pub type SessionGuard = OwnedMappedMutexGuard<Option<ReviewSession>, ReviewSession>;

type SessionSlot = Arc<Mutex<Option<ReviewSession>>>;

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    allocator: Arc<BatchAllocator>,
    archiver: Arc<dyn ArchiveMover>,
    /// One slot per worker; a worker's requests run one at a time.
    sessions: Mutex<HashMap<WorkerId, SessionSlot>>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        allocator: Arc<BatchAllocator>,
        archiver: Arc<dyn ArchiveMover>,
    ) -> Self {
        Self {
            config,
            authenticator,
            allocator,
            archiver,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn allocator(&self) -> &Arc<BatchAllocator> {
        &self.allocator
    }

    /// Locks the worker's session, opening it on first use.
    ///
    /// Opening allocates a first batch for a worker with no files. If that
    /// fails the slot stays empty and the next request tries again.
    pub async fn session(&self, worker: &WorkerId) -> Result<SessionGuard, ReviewError> {
        let slot = {
            let mut sessions = self.sessions.lock().await;
            Arc::clone(sessions.entry(worker.clone()).or_default())
        };

        let mut guard = slot.lock_owned().await;
        if guard.is_none() {
            debug!(%worker, "Opening review session");
            let session = ReviewSession::open(
                worker.clone(),
                Arc::clone(&self.allocator),
                Arc::clone(&self.archiver),
                self.config.review.edit_state_dir.clone(),
            )
            .await?;
            *guard = Some(session);
        }

        OwnedMutexGuard::try_map(guard, |session| session.as_mut())
            .map_err(|_| ReviewError::NoCurrentFile)
    }
}
