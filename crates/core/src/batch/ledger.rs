//! Worker → batch assignment records.

use std::collections::BTreeMap;

use super::error::StoreError;
use super::types::{BatchNumber, WorkerId};

/// Durable record of which batches each worker holds.
///
/// A batch number appears in at most one worker's list. Lists are ordered by
/// assignment; the last entry is the worker's current batch.
pub trait AssignmentLedger: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Appends `batch` to `worker`'s list.
    ///
    /// Returns `false` without changing anything if `batch` is already held
    /// by any worker, including `worker` itself.
    fn assign(&self, worker: &WorkerId, batch: BatchNumber) -> Result<bool, StoreError>;

    /// Removes and returns the most recent entry of `worker`'s list.
    fn unassign_last(&self, worker: &WorkerId) -> Result<Option<BatchNumber>, StoreError>;

    /// All batches held by `worker`, oldest first.
    fn list_for(&self, worker: &WorkerId) -> Result<Vec<BatchNumber>, StoreError>;

    /// The worker holding `batch`, if any.
    fn owner_of(&self, batch: BatchNumber) -> Result<Option<WorkerId>, StoreError>;

    /// Every worker's list.
    fn snapshot(&self) -> Result<BTreeMap<WorkerId, Vec<BatchNumber>>, StoreError>;
}

/// In-memory assignment map with the ledger's rules.
///
/// Used as the working state of the JSON ledger between load and save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignments {
    by_worker: BTreeMap<WorkerId, Vec<BatchNumber>>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from stored lists, rejecting duplicates.
    pub fn from_lists(
        lists: BTreeMap<WorkerId, Vec<BatchNumber>>,
    ) -> Result<Self, (BatchNumber, WorkerId, WorkerId)> {
        let mut seen: BTreeMap<BatchNumber, &WorkerId> = BTreeMap::new();
        for (worker, batches) in &lists {
            for batch in batches {
                if let Some(holder) = seen.insert(*batch, worker) {
                    return Err((*batch, holder.clone(), worker.clone()));
                }
            }
        }
        Ok(Self { by_worker: lists })
    }

    pub fn assign(&mut self, worker: &WorkerId, batch: BatchNumber) -> bool {
        if self.owner_of(batch).is_some() {
            return false;
        }
        self.by_worker.entry(worker.clone()).or_default().push(batch);
        true
    }

    pub fn unassign_last(&mut self, worker: &WorkerId) -> Option<BatchNumber> {
        self.by_worker.get_mut(worker).and_then(|list| list.pop())
    }

    pub fn list_for(&self, worker: &WorkerId) -> &[BatchNumber] {
        self.by_worker
            .get(worker)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn owner_of(&self, batch: BatchNumber) -> Option<&WorkerId> {
        self.by_worker
            .iter()
            .find(|(_, list)| list.contains(&batch))
            .map(|(worker, _)| worker)
    }

    pub fn lists(&self) -> &BTreeMap<WorkerId, Vec<BatchNumber>> {
        &self.by_worker
    }

    pub fn into_lists(self) -> BTreeMap<WorkerId, Vec<BatchNumber>> {
        self.by_worker
    }

    /// Total number of assigned batches.
    pub fn len(&self) -> usize {
        self.by_worker.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
