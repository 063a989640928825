//! Batch numbering and assignment.
//!
//! This module owns the protocol that hands dataset slices to workers:
//!
//! - [`BatchCounter`] is the only source of new batch numbers
//! - [`AssignmentLedger`] records which worker holds which batch and refuses
//!   to record a batch twice
//! - [`BatchAllocator`] runs reserve → fetch → commit, rolling the counter
//!   and ledger back when the fetch fails
//!
//! Counter and ledger come in a JSON-file flavour ([`JsonBatchCounter`],
//! [`JsonAssignmentLedger`]) and a SQLite flavour ([`SqliteBatchStore`]).

mod allocator;
mod counter;
mod error;
mod json_store;
mod ledger;
mod sqlite_store;
mod types;

pub use allocator::{AllocatorConfig, BatchAllocator};
pub use counter::BatchCounter;
pub use error::{AllocationError, StoreError};
pub use json_store::{JsonAssignmentLedger, JsonBatchCounter};
pub use ledger::{AssignmentLedger, Assignments};
pub use sqlite_store::SqliteBatchStore;
pub use types::{Allocation, AllocationState, BatchNumber, InvalidWorkerId, WorkerId};

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};

/// Opens the configured counter and ledger.
pub fn create_stores(
    config: &StorageConfig,
) -> Result<(Arc<dyn BatchCounter>, Arc<dyn AssignmentLedger>), StoreError> {
    match config.backend {
        StorageBackend::Json => {
            let counter: Arc<dyn BatchCounter> =
                Arc::new(JsonBatchCounter::open(config.counter_path.clone())?);
            let ledger: Arc<dyn AssignmentLedger> =
                Arc::new(JsonAssignmentLedger::open(config.ledger_path.clone())?);
            Ok((counter, ledger))
        }
        StorageBackend::Sqlite => {
            let store = Arc::new(SqliteBatchStore::new(&config.database_path)?);
            let counter: Arc<dyn BatchCounter> = store.clone();
            Ok((counter, store))
        }
    }
}
