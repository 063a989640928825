//! JSON-file backed counter and ledger.
//!
//! Each record is a single small JSON document rewritten atomically on every
//! mutation. Reads always go to disk so an operator can inspect or repair the
//! files between requests.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::counter::{check_release, BatchCounter};
use super::error::StoreError;
use super::ledger::{AssignmentLedger, Assignments};
use super::types::{BatchNumber, WorkerId};
use crate::fsio;

#[derive(Debug, Serialize, Deserialize)]
struct CounterRecord {
    #[serde(alias = "batch_number")]
    next_batch_number: u64,
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    // The guarded value is empty, so a poisoned lock carries no broken state.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::corrupt(path, e.to_string()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|e| StoreError::corrupt(path, e.to_string()))?;
    bytes.push(b'\n');
    fsio::write_atomic(path, &bytes).map_err(|e| StoreError::io(path, e))
}

/// Batch counter stored as `{"next_batch_number": n}`.
///
/// Also reads the older `{"batch_number": n}` form.
pub struct JsonBatchCounter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonBatchCounter {
    /// Opens the counter at `path`, creating it at zero if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        match read_json::<CounterRecord>(&path)? {
            Some(record) => {
                debug!(path = %path.display(), next = record.next_batch_number, "Loaded batch counter");
            }
            None => {
                write_json(&path, &CounterRecord { next_batch_number: 0 })?;
                info!(path = %path.display(), "Created batch counter");
            }
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BatchNumber, StoreError> {
        read_json::<CounterRecord>(&self.path)?
            .map(|r| BatchNumber(r.next_batch_number))
            .ok_or_else(|| StoreError::corrupt(&self.path, "counter record is missing"))
    }

    fn store(&self, next: BatchNumber) -> Result<(), StoreError> {
        write_json(
            &self.path,
            &CounterRecord {
                next_batch_number: next.value(),
            },
        )
    }
}

impl BatchCounter for JsonBatchCounter {
    fn name(&self) -> &str {
        "json"
    }

    fn peek(&self) -> Result<BatchNumber, StoreError> {
        let _guard = lock(&self.lock);
        self.load()
    }

    fn reserve(&self) -> Result<BatchNumber, StoreError> {
        let _guard = lock(&self.lock);
        let current = self.load()?;
        let next = current
            .checked_next()
            .ok_or(StoreError::CounterOverflow(current))?;
        self.store(next)?;
        Ok(current)
    }

    fn release(&self, batch: BatchNumber) -> Result<(), StoreError> {
        let _guard = lock(&self.lock);
        let current = self.load()?;
        check_release(current, batch)?;
        self.store(batch)
    }
}

/// Assignment ledger stored as `{"worker": [batch, ...], ...}`.
pub struct JsonAssignmentLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonAssignmentLedger {
    /// Opens the ledger at `path`, creating an empty one if it does not exist.
    ///
    /// A ledger that already holds a batch under two workers is refused.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let ledger = Self {
            path,
            lock: Mutex::new(()),
        };
        if fs::metadata(&ledger.path).is_ok() {
            let assignments = ledger.load()?;
            debug!(
                path = %ledger.path.display(),
                workers = assignments.lists().len(),
                batches = assignments.len(),
                "Loaded assignment ledger"
            );
        } else {
            ledger.save(&Assignments::new())?;
            info!(path = %ledger.path.display(), "Created assignment ledger");
        }
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Assignments, StoreError> {
        let lists: BTreeMap<WorkerId, Vec<BatchNumber>> =
            read_json(&self.path)?.unwrap_or_default();
        Assignments::from_lists(lists).map_err(|(batch, first, second)| {
            StoreError::corrupt(
                &self.path,
                format!("batch {batch} is listed for both {first} and {second}"),
            )
        })
    }

    fn save(&self, assignments: &Assignments) -> Result<(), StoreError> {
        write_json(&self.path, assignments.lists())
    }
}

impl AssignmentLedger for JsonAssignmentLedger {
    fn name(&self) -> &str {
        "json"
    }

    fn assign(&self, worker: &WorkerId, batch: BatchNumber) -> Result<bool, StoreError> {
        let _guard = lock(&self.lock);
        let mut assignments = self.load()?;
        if !assignments.assign(worker, batch) {
            return Ok(false);
        }
        self.save(&assignments)?;
        Ok(true)
    }

    fn unassign_last(&self, worker: &WorkerId) -> Result<Option<BatchNumber>, StoreError> {
        let _guard = lock(&self.lock);
        let mut assignments = self.load()?;
        let popped = assignments.unassign_last(worker);
        if popped.is_some() {
            self.save(&assignments)?;
        }
        Ok(popped)
    }

    fn list_for(&self, worker: &WorkerId) -> Result<Vec<BatchNumber>, StoreError> {
        let _guard = lock(&self.lock);
        Ok(self.load()?.list_for(worker).to_vec())
    }

    fn owner_of(&self, batch: BatchNumber) -> Result<Option<WorkerId>, StoreError> {
        let _guard = lock(&self.lock);
        Ok(self.load()?.owner_of(batch).cloned())
    }

    fn snapshot(&self) -> Result<BTreeMap<WorkerId, Vec<BatchNumber>>, StoreError> {
        let _guard = lock(&self.lock);
        Ok(self.load()?.into_lists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{counter, ledger};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn counter_in(temp: &TempDir) -> JsonBatchCounter {
        JsonBatchCounter::open(temp.path().join("data/batch.json")).unwrap()
    }

    fn ledger_in(temp: &TempDir) -> JsonAssignmentLedger {
        JsonAssignmentLedger::open(temp.path().join("config/tasks.json")).unwrap()
    }

    #[test]
    fn test_counter_contract() {
        let temp = TempDir::new().unwrap();
        counter::contract::release_on_fresh_counter_is_refused(&counter_in(&temp));
        counter::contract::sequential_reserves_have_no_gaps(&counter_in(&temp));
        counter::contract::release_then_reserve_returns_same_number(&counter_in(&temp));
        counter::contract::out_of_order_release_is_refused(&counter_in(&temp));
    }

    #[test]
    fn test_ledger_contract() {
        let checks: [fn(&dyn AssignmentLedger); 4] = [
            ledger::contract::assign_appends_in_order,
            ledger::contract::duplicate_assignment_is_refused,
            ledger::contract::unassign_last_pops,
            ledger::contract::snapshot_lists_every_worker,
        ];
        for check in checks {
            let temp = TempDir::new().unwrap();
            check(&ledger_in(&temp));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_threads_never_share_a_batch(
            ops in prop::collection::vec(ledger::contract::op_strategy(), 0..48)
        ) {
            let temp = TempDir::new().unwrap();
            let ledger = ledger_in(&temp);

            let outcome = ledger::contract::interleaved_ops_never_duplicate(&ledger, &ops);
            prop_assert!(outcome.is_ok(), "{:?}", outcome);

            // What was written is what a fresh open reads back
            let reopened = ledger_in(&temp);
            prop_assert_eq!(reopened.snapshot().unwrap(), ledger.snapshot().unwrap());
        }
    }

    #[test]
    fn test_counter_is_durable_across_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let counter = counter_in(&temp);
            counter.reserve().unwrap();
            counter.reserve().unwrap();
        }
        let reopened = counter_in(&temp);
        assert_eq!(reopened.peek().unwrap(), BatchNumber(2));

        let raw = fs::read_to_string(reopened.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["next_batch_number"], 2);
    }

    #[test]
    fn test_counter_reads_legacy_field() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("batch.json");
        fs::write(&path, r#"{"batch_number": 41}"#).unwrap();

        let counter = JsonBatchCounter::open(&path).unwrap();
        assert_eq!(counter.reserve().unwrap(), BatchNumber(41));
        assert_eq!(counter.peek().unwrap(), BatchNumber(42));
    }

    #[test]
    fn test_corrupt_counter_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("batch.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonBatchCounter::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_ledger_is_durable_across_reopen() {
        let temp = TempDir::new().unwrap();
        let ada = WorkerId::new("ada").unwrap();
        {
            let ledger = ledger_in(&temp);
            ledger.assign(&ada, BatchNumber(0)).unwrap();
            ledger.assign(&ada, BatchNumber(3)).unwrap();
        }
        let reopened = ledger_in(&temp);
        assert_eq!(
            reopened.list_for(&ada).unwrap(),
            vec![BatchNumber(0), BatchNumber(3)]
        );

        let raw = fs::read_to_string(reopened.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["ada"], serde_json::json!([0, 3]));
    }

    #[test]
    fn test_ledger_with_duplicate_batch_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.json");
        fs::write(&path, r#"{"a": [1, 2], "b": [2]}"#).unwrap();

        let err = JsonAssignmentLedger::open(&path).err().unwrap();
        assert!(err.to_string().contains("batch 2 is listed for both a and b"));
    }

    #[test]
    fn test_ledger_with_invalid_worker_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.json");
        fs::write(&path, r#"{"../root": [1]}"#).unwrap();

        assert!(matches!(
            JsonAssignmentLedger::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_refused_assign_does_not_rewrite_file() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);
        let a = WorkerId::new("a").unwrap();
        ledger.assign(&a, BatchNumber(0)).unwrap();
        let before = fs::read_to_string(ledger.path()).unwrap();

        assert!(!ledger.assign(&WorkerId::new("b").unwrap(), BatchNumber(0)).unwrap());
        assert_eq!(fs::read_to_string(ledger.path()).unwrap(), before);
    }
}
