//! Mock batch counter for testing.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::batch::{BatchCounter, BatchNumber, StoreError};

/// In-memory counter whose reserve and release can be made to fail.
///
/// Follows the real counters' rules: only the most recent reservation may be
/// released.
#[derive(Debug, Default)]
pub struct MockCounter {
    next: AtomicU64,
    fail_reserve: AtomicBool,
    fail_release: AtomicBool,
    reserve_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl MockCounter {
    /// Create a counter whose next number is `next`.
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
            ..Self::default()
        }
    }

    /// Make every `reserve` fail until switched off.
    pub fn set_fail_reserve(&self, fail: bool) {
        self.fail_reserve.store(fail, Ordering::SeqCst);
    }

    /// Make every `release` fail until switched off.
    pub fn set_fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn reserve_calls(&self) -> usize {
        self.reserve_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    fn injected(operation: &str) -> StoreError {
        StoreError::io(
            "mock-counter",
            std::io::Error::other(format!("{operation} failed")),
        )
    }
}

impl BatchCounter for MockCounter {
    fn name(&self) -> &str {
        "mock"
    }

    fn peek(&self) -> Result<BatchNumber, StoreError> {
        Ok(BatchNumber(self.next.load(Ordering::SeqCst)))
    }

    fn reserve(&self) -> Result<BatchNumber, StoreError> {
        self.reserve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reserve.load(Ordering::SeqCst) {
            return Err(Self::injected("reserve"));
        }
        Ok(BatchNumber(self.next.fetch_add(1, Ordering::SeqCst)))
    }

    fn release(&self, batch: BatchNumber) -> Result<(), StoreError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(Self::injected("release"));
        }
        let current = BatchNumber(self.next.load(Ordering::SeqCst));
        if batch.checked_next() != Some(current) {
            return Err(StoreError::ReleaseOrder {
                current,
                requested: batch,
            });
        }
        self.next.store(batch.value(), Ordering::SeqCst);
        Ok(())
    }
}
