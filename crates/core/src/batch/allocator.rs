//! The reserve → fetch → commit/rollback state machine.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::counter::BatchCounter;
use super::error::{AllocationError, StoreError};
use super::ledger::AssignmentLedger;
use super::types::{Allocation, AllocationState, BatchNumber, WorkerId};
use crate::fetcher::{batch_file_path, BatchFetcher, FetchError};
use crate::fsio;
use crate::metrics;

/// Allocator settings.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Upper bound on one fetch; expiry rolls the reservation back.
    pub fetch_timeout: Duration,
    /// Commit batches that came back with no rows instead of reporting
    /// [`AllocationError::NoMoreData`].
    pub commit_empty_batches: bool,
    /// Root of the worker directories, used to clean up after a failed fetch.
    pub fetched_dir: PathBuf,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(300),
            commit_empty_batches: false,
            fetched_dir: PathBuf::from("fetched_data"),
        }
    }
}

/// Hands out batches to workers.
///
/// Every attempt reserves a number, fetches the slice and then either records
/// the assignment or undoes the reservation. Attempts are serialized by one
/// global lock, so a rollback always releases the most recent reservation.
pub struct BatchAllocator {
    counter: Arc<dyn BatchCounter>,
    ledger: Arc<dyn AssignmentLedger>,
    fetcher: Arc<dyn BatchFetcher>,
    config: AllocatorConfig,
    lock: tokio::sync::Mutex<()>,
    in_flight: Mutex<HashSet<WorkerId>>,
}

/// Marks a worker as having an attempt running; cleared on drop.
struct InFlight {
    allocator: Arc<BatchAllocator>,
    worker: WorkerId,
}

impl InFlight {
    fn claim(allocator: &Arc<BatchAllocator>, worker: &WorkerId) -> Result<Self, AllocationError> {
        let mut set = allocator
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(worker.clone()) {
            return Err(AllocationError::AttemptInFlight {
                worker: worker.clone(),
            });
        }
        Ok(Self {
            allocator: Arc::clone(allocator),
            worker: worker.clone(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut set = self
            .allocator
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.worker);
    }
}

/// Tracks the phase of one attempt for logging.
struct Attempt<'a> {
    worker: &'a WorkerId,
    batch: Option<BatchNumber>,
    state: AllocationState,
}

impl<'a> Attempt<'a> {
    fn new(worker: &'a WorkerId) -> Self {
        Self {
            worker,
            batch: None,
            state: AllocationState::Idle,
        }
    }

    fn advance(&mut self, next: AllocationState) {
        debug!(
            worker = %self.worker,
            batch = ?self.batch.map(|b| b.value()),
            from = self.state.as_str(),
            to = next.as_str(),
            "Allocation state change"
        );
        self.state = next;
    }
}

/// Why a reservation is being undone.
enum Abandon {
    FetchFailed(FetchError),
    Empty,
    Refused(Option<WorkerId>),
    LedgerFailed(StoreError),
}

impl BatchAllocator {
    pub fn new(
        counter: Arc<dyn BatchCounter>,
        ledger: Arc<dyn AssignmentLedger>,
        fetcher: Arc<dyn BatchFetcher>,
        config: AllocatorConfig,
    ) -> Self {
        Self {
            counter,
            ledger,
            fetcher,
            config,
            lock: tokio::sync::Mutex::new(()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocates a new batch for `worker`.
    ///
    /// The attempt runs on its own task: once started it reaches `Committed`
    /// or `RolledBack` even if the caller stops waiting. A second call for
    /// the same worker while one is running fails with
    /// [`AllocationError::AttemptInFlight`].
    pub async fn allocate(self: &Arc<Self>, worker: &WorkerId) -> Result<Allocation, AllocationError> {
        let result = match InFlight::claim(self, worker) {
            Ok(slot) => {
                let this = Arc::clone(self);
                let worker = worker.clone();
                tokio::spawn(async move {
                    let _slot = slot;
                    this.run_attempt(&worker).await
                })
                .await
                .unwrap_or_else(|e| Err(AllocationError::Aborted(e.to_string())))
            }
            Err(e) => Err(e),
        };

        let label = match &result {
            Ok(_) => "committed",
            Err(e) => e.kind(),
        };
        metrics::ALLOCATIONS.with_label_values(&[label]).inc();
        result
    }

    async fn run_attempt(&self, worker: &WorkerId) -> Result<Allocation, AllocationError> {
        let started = Instant::now();
        let _guard = self.lock.lock().await;
        let mut attempt = Attempt::new(worker);

        let first = self
            .ledger
            .list_for(worker)
            .map_err(AllocationError::Ledger)?
            .is_empty();

        let batch = self.counter.reserve().map_err(|e| {
            error!(%worker, error = %e, "Failed to reserve a batch number");
            AllocationError::Exhaustion(e)
        })?;
        attempt.batch = Some(batch);
        attempt.advance(AllocationState::Reserved);

        // A held number must never reach the fetcher, which would overwrite
        // the holder's file.
        let mut produced: Option<PathBuf> = None;
        let mut ledger_written = false;
        let abandon = match self.ledger.owner_of(batch) {
            Ok(Some(holder)) => Abandon::Refused(Some(holder)),
            Err(e) => Abandon::LedgerFailed(e),
            Ok(None) => {
                attempt.advance(AllocationState::Fetching);
                let fetched = self.fetch_bounded(batch, worker).await;
                produced = Some(batch_file_path(&self.config.fetched_dir, worker, batch));

                match fetched {
                    Err(e) => Abandon::FetchFailed(e),
                    Ok(f) if f.rows == 0 && !self.config.commit_empty_batches => Abandon::Empty,
                    Ok(f) => match self.ledger.assign(worker, batch) {
                        Ok(true) => {
                            attempt.advance(AllocationState::Committed);
                            let allocation = Allocation {
                                worker: worker.clone(),
                                batch,
                                path: f.path,
                                rows: f.rows,
                                duration_ms: started.elapsed().as_millis() as u64,
                            };
                            info!(
                                %worker,
                                %batch,
                                rows = allocation.rows,
                                duration_ms = allocation.duration_ms,
                                "Batch allocated"
                            );
                            return Ok(allocation);
                        }
                        Ok(false) => Abandon::Refused(self.ledger.owner_of(batch).ok().flatten()),
                        Err(e) => {
                            ledger_written = true;
                            Abandon::LedgerFailed(e)
                        }
                    },
                }
            }
        };

        match &abandon {
            Abandon::FetchFailed(e) => {
                warn!(%worker, %batch, first, error = %e, "Fetch failed, rolling back")
            }
            Abandon::Empty => {
                warn!(%worker, %batch, "Fetch returned no rows, rolling back")
            }
            Abandon::Refused(holder) => error!(
                %worker,
                %batch,
                holder = ?holder.as_ref().map(|h| h.as_str()),
                "Reserved batch is already assigned, rolling back"
            ),
            Abandon::LedgerFailed(e) => {
                error!(%worker, %batch, error = %e, "Ledger failed during allocation, rolling back")
            }
        }

        self.roll_back(worker, batch, produced.as_deref(), ledger_written)?;
        attempt.advance(AllocationState::RolledBack);

        Err(match abandon {
            Abandon::FetchFailed(source) if first => AllocationError::InitialFetch { batch, source },
            Abandon::FetchFailed(source) => AllocationError::Fetch { batch, source },
            Abandon::Empty => AllocationError::NoMoreData { batch },
            Abandon::Refused(holder) => AllocationError::UniquenessViolation {
                batch,
                worker: worker.clone(),
                holder,
            },
            Abandon::LedgerFailed(e) => AllocationError::Ledger(e),
        })
    }

    async fn fetch_bounded(
        &self,
        batch: BatchNumber,
        worker: &WorkerId,
    ) -> Result<crate::fetcher::FetchedBatch, FetchError> {
        let started = Instant::now();
        let result = match timeout(self.config.fetch_timeout, self.fetcher.fetch(batch, worker)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                timeout_secs: self.config.fetch_timeout.as_secs(),
            }),
        };

        let label = match &result {
            Ok(_) => "success",
            Err(FetchError::Timeout { .. }) => "timeout",
            Err(_) => "failed",
        };
        metrics::FETCH_DURATION
            .with_label_values(&[self.fetcher.name(), label])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    /// Undoes a reservation: the counter, then the ledger entry when this
    /// attempt may have written one, then the file the fetch produced.
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned.
    fn roll_back(
        &self,
        worker: &WorkerId,
        batch: BatchNumber,
        produced: Option<&Path>,
        ledger_written: bool,
    ) -> Result<(), AllocationError> {
        let released = self.counter.release(batch).map_err(|source| {
            error!(%worker, %batch, error = %source, "Failed to release batch number");
            AllocationError::Rollback { batch, source }
        });

        let unassigned = if ledger_written {
            self.undo_assignment(worker, batch)
        } else {
            Ok(())
        };

        if let Some(path) = produced {
            if let Err(e) = fsio::remove_if_exists(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove fetched file");
            }
        }

        released?;
        unassigned?;
        metrics::ROLLBACKS.inc();
        info!(%worker, %batch, "Batch reservation rolled back");
        Ok(())
    }

    /// Pops `batch` off `worker`'s list if a failed write left it there.
    ///
    /// Only called after the ownership check found `batch` unheld, so an
    /// entry for it can only come from this attempt.
    fn undo_assignment(&self, worker: &WorkerId, batch: BatchNumber) -> Result<(), AllocationError> {
        let rollback = |source: StoreError| {
            error!(%worker, %batch, error = %source, "Failed to remove assignment");
            AllocationError::Rollback { batch, source }
        };
        let holds_batch = self.ledger.list_for(worker).map_err(rollback)?.last() == Some(&batch);
        if holds_batch {
            self.ledger.unassign_last(worker).map_err(rollback)?;
        }
        Ok(())
    }

    /// The number the next allocation would reserve.
    pub fn peek_next(&self) -> Result<BatchNumber, StoreError> {
        self.counter.peek()
    }

    /// Batches held by `worker`, oldest first.
    pub fn assignments_for(&self, worker: &WorkerId) -> Result<Vec<BatchNumber>, StoreError> {
        self.ledger.list_for(worker)
    }

    /// The worker's most recent batch, which is where a returning worker resumes.
    pub fn current_batch(&self, worker: &WorkerId) -> Result<Option<BatchNumber>, StoreError> {
        Ok(self.ledger.list_for(worker)?.last().copied())
    }

    /// Every worker's assignments.
    pub fn snapshot(&self) -> Result<BTreeMap<WorkerId, Vec<BatchNumber>>, StoreError> {
        self.ledger.snapshot()
    }

    /// Where `worker`'s copy of `batch` lives.
    pub fn batch_path(&self, worker: &WorkerId, batch: BatchNumber) -> PathBuf {
        batch_file_path(&self.config.fetched_dir, worker, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SqliteBatchStore;
    use crate::pairs::{read_pairs, write_pairs, PairRow};
    use crate::testing::{MockCounter, MockFetcher};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: Arc<SqliteBatchStore>,
        fetcher: Arc<MockFetcher>,
        allocator: Arc<BatchAllocator>,
    }

    fn fixture_with(config: impl FnOnce(&mut AllocatorConfig)) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteBatchStore::in_memory().unwrap());
        let fetcher = Arc::new(MockFetcher::new(temp.path(), 3));
        let mut allocator_config = AllocatorConfig {
            fetch_timeout: Duration::from_secs(5),
            commit_empty_batches: false,
            fetched_dir: temp.path().to_path_buf(),
        };
        config(&mut allocator_config);
        let allocator = Arc::new(BatchAllocator::new(
            store.clone(),
            store.clone(),
            fetcher.clone(),
            allocator_config,
        ));
        Fixture {
            _temp: temp,
            store,
            fetcher,
            allocator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {})
    }

    fn worker(id: &str) -> WorkerId {
        WorkerId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_first_allocation() {
        let f = fixture();
        let ada = worker("ada");

        let allocation = f.allocator.allocate(&ada).await.unwrap();

        assert_eq!(allocation.batch, BatchNumber(0));
        assert_eq!(allocation.rows, 3);
        assert!(allocation.path.exists());
        assert_eq!(f.store.peek().unwrap(), BatchNumber(1));
        assert_eq!(f.store.list_for(&ada).unwrap(), vec![BatchNumber(0)]);
        assert_eq!(f.allocator.current_batch(&ada).unwrap(), Some(BatchNumber(0)));
    }

    #[tokio::test]
    async fn test_failed_fetch_restores_counter_and_ledger() {
        let f = fixture();
        let ada = worker("ada");
        f.allocator.allocate(&ada).await.unwrap();

        f.fetcher.set_next_error(FetchError::unavailable("store down")).await;
        let err = f.allocator.allocate(&ada).await.unwrap_err();

        assert!(matches!(err, AllocationError::Fetch { batch: BatchNumber(1), .. }));
        assert_eq!(f.store.peek().unwrap(), BatchNumber(1));
        assert_eq!(f.store.list_for(&ada).unwrap(), vec![BatchNumber(0)]);
        assert!(!f.allocator.batch_path(&ada, BatchNumber(1)).exists());
    }

    #[tokio::test]
    async fn test_first_fetch_failure_is_initial() {
        let f = fixture();
        f.fetcher.set_next_error(FetchError::unavailable("store down")).await;

        let err = f.allocator.allocate(&worker("ada")).await.unwrap_err();

        assert!(matches!(err, AllocationError::InitialFetch { .. }));
        assert!(err.is_retryable());
        assert_eq!(f.store.peek().unwrap(), BatchNumber(0));
    }

    #[tokio::test]
    async fn test_timeout_rolls_back_and_cleans_up() {
        let f = fixture_with(|c| c.fetch_timeout = Duration::from_millis(50));
        let ada = worker("ada");
        f.fetcher.set_delay(Duration::from_secs(5)).await;

        let err = f.allocator.allocate(&ada).await.unwrap_err();

        match err {
            AllocationError::InitialFetch { source, .. } => {
                assert!(matches!(source, FetchError::Timeout { .. }))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.store.peek().unwrap(), BatchNumber(0));
        assert!(f.store.list_for(&ada).unwrap().is_empty());
        assert!(!f.allocator.batch_path(&ada, BatchNumber(0)).exists());
    }

    #[tokio::test]
    async fn test_empty_batch_is_no_more_data() {
        let f = fixture();
        f.fetcher.set_rows_per_batch(0).await;

        let err = f.allocator.allocate(&worker("ada")).await.unwrap_err();

        assert!(matches!(err, AllocationError::NoMoreData { batch: BatchNumber(0) }));
        assert_eq!(f.store.peek().unwrap(), BatchNumber(0));
    }

    #[tokio::test]
    async fn test_empty_batch_committed_when_configured() {
        let f = fixture_with(|c| c.commit_empty_batches = true);
        f.fetcher.set_rows_per_batch(0).await;

        let allocation = f.allocator.allocate(&worker("ada")).await.unwrap();
        assert_eq!(allocation.rows, 0);
        assert_eq!(f.store.peek().unwrap(), BatchNumber(1));
    }

    #[tokio::test]
    async fn test_refused_assignment_is_uniqueness_violation() {
        let f = fixture();
        // Someone recorded batch 0 without going through the counter
        f.store.assign(&worker("bo"), BatchNumber(0)).unwrap();

        let err = f.allocator.allocate(&worker("ada")).await.unwrap_err();

        match &err {
            AllocationError::UniquenessViolation { batch, holder, .. } => {
                assert_eq!(*batch, BatchNumber(0));
                assert_eq!(holder.as_ref(), Some(&worker("bo")));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_fatal());
        assert_eq!(f.fetcher.fetch_count().await, 0);
        assert_eq!(f.store.peek().unwrap(), BatchNumber(0));
        assert_eq!(f.store.list_for(&worker("bo")).unwrap(), vec![BatchNumber(0)]);
        assert!(f.store.list_for(&worker("ada")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_own_held_batch_is_left_alone() {
        let f = fixture();
        let ada = worker("ada");
        // The counter lags behind a batch ada already holds and has edited
        f.store.assign(&ada, BatchNumber(0)).unwrap();
        let path = f.allocator.batch_path(&ada, BatchNumber(0));
        let edited = vec![PairRow::new("Ẹ káàárọ̀", "Good morning")];
        write_pairs(&path, &edited).unwrap();

        let err = f.allocator.allocate(&ada).await.unwrap_err();

        match &err {
            AllocationError::UniquenessViolation { batch, holder, .. } => {
                assert_eq!(*batch, BatchNumber(0));
                assert_eq!(holder.as_ref(), Some(&ada));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.fetcher.fetch_count().await, 0);
        assert_eq!(f.store.list_for(&ada).unwrap(), vec![BatchNumber(0)]);
        assert_eq!(f.store.peek().unwrap(), BatchNumber(0));
        assert_eq!(read_pairs(&path).unwrap(), edited);
    }

    struct CounterFixture {
        _temp: TempDir,
        counter: Arc<MockCounter>,
        ledger: Arc<SqliteBatchStore>,
        fetcher: Arc<MockFetcher>,
        allocator: Arc<BatchAllocator>,
    }

    fn counter_fixture(start: u64) -> CounterFixture {
        let temp = TempDir::new().unwrap();
        let counter = Arc::new(MockCounter::starting_at(start));
        let ledger = Arc::new(SqliteBatchStore::in_memory().unwrap());
        let fetcher = Arc::new(MockFetcher::new(temp.path(), 3));
        let allocator = Arc::new(BatchAllocator::new(
            counter.clone(),
            ledger.clone(),
            fetcher.clone(),
            AllocatorConfig {
                fetch_timeout: Duration::from_secs(5),
                commit_empty_batches: false,
                fetched_dir: temp.path().to_path_buf(),
            },
        ));
        CounterFixture {
            _temp: temp,
            counter,
            ledger,
            fetcher,
            allocator,
        }
    }

    #[tokio::test]
    async fn test_failed_reserve_is_exhaustion() {
        let f = counter_fixture(2);
        let ada = worker("ada");
        f.ledger.assign(&ada, BatchNumber(1)).unwrap();
        f.counter.set_fail_reserve(true);

        let err = f.allocator.allocate(&ada).await.unwrap_err();

        assert!(matches!(err, AllocationError::Exhaustion(_)));
        assert!(err.is_fatal());
        assert_eq!(f.fetcher.fetch_count().await, 0);
        assert_eq!(f.counter.release_calls(), 0);
        assert_eq!(f.counter.peek().unwrap(), BatchNumber(2));
        assert_eq!(f.ledger.list_for(&ada).unwrap(), vec![BatchNumber(1)]);
    }

    #[tokio::test]
    async fn test_failed_release_is_surfaced() {
        let f = counter_fixture(2);
        let ada = worker("ada");
        f.ledger.assign(&ada, BatchNumber(1)).unwrap();
        f.fetcher.set_next_error(FetchError::unavailable("store down")).await;
        f.counter.set_fail_release(true);

        let err = f.allocator.allocate(&ada).await.unwrap_err();

        match &err {
            AllocationError::Rollback { batch, .. } => assert_eq!(*batch, BatchNumber(2)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_fatal());
        assert_eq!(f.counter.release_calls(), 1);
        assert_eq!(f.ledger.list_for(&ada).unwrap(), vec![BatchNumber(1)]);
    }

    #[tokio::test]
    async fn test_failed_release_still_removes_fetched_file() {
        let f = counter_fixture(0);
        let ada = worker("ada");
        f.fetcher.set_rows_per_batch(0).await;
        f.counter.set_fail_release(true);

        let err = f.allocator.allocate(&ada).await.unwrap_err();

        assert!(matches!(err, AllocationError::Rollback { .. }));
        assert_eq!(f.fetcher.fetch_count().await, 1);
        assert!(!f.allocator.batch_path(&ada, BatchNumber(0)).exists());
        assert!(f.ledger.list_for(&ada).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_attempt_for_same_worker_is_rejected() {
        let f = fixture();
        let ada = worker("ada");
        f.fetcher.set_delay(Duration::from_millis(200)).await;

        let first = {
            let allocator = f.allocator.clone();
            let ada = ada.clone();
            tokio::spawn(async move { allocator.allocate(&ada).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = f.allocator.allocate(&ada).await;
        assert!(matches!(second, Err(AllocationError::AttemptInFlight { .. })));

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.batch, BatchNumber(0));
        assert_eq!(f.store.list_for(&ada).unwrap(), vec![BatchNumber(0)]);

        // The slot is free again
        f.fetcher.set_delay(Duration::ZERO).await;
        assert_eq!(f.allocator.allocate(&ada).await.unwrap().batch, BatchNumber(1));
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_interrupt_attempt() {
        let f = fixture();
        let ada = worker("ada");
        f.fetcher.set_delay(Duration::from_millis(100)).await;

        let result = tokio::time::timeout(Duration::from_millis(10), f.allocator.allocate(&ada)).await;
        assert!(result.is_err());

        // The spawned attempt still commits
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(f.store.list_for(&ada).unwrap(), vec![BatchNumber(0)]);
        assert_eq!(f.store.peek().unwrap(), BatchNumber(1));
    }

    #[tokio::test]
    async fn test_concurrent_workers_get_distinct_batches() {
        let f = fixture();
        f.fetcher.set_delay(Duration::from_millis(10)).await;

        let mut handles = Vec::new();
        for id in ["a", "b", "c", "d", "e"] {
            let allocator = f.allocator.clone();
            let w = worker(id);
            handles.push(tokio::spawn(async move { allocator.allocate(&w).await }));
        }

        let mut batches: Vec<u64> = Vec::new();
        for handle in handles {
            batches.push(handle.await.unwrap().unwrap().batch.value());
        }
        batches.sort();
        assert_eq!(batches, vec![0, 1, 2, 3, 4]);
        assert_eq!(f.store.peek().unwrap(), BatchNumber(5));
    }
}
