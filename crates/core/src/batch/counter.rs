//! The global batch counter.

use super::error::StoreError;
use super::types::BatchNumber;

/// Owner of the single "next batch number".
///
/// Every mutation is durable before it returns. Implementations serialize
/// their own operations, but callers that need reserve-then-release to be
/// paired (the allocator) must hold an outer lock across the whole sequence.
pub trait BatchCounter: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// The number the next `reserve` would return.
    fn peek(&self) -> Result<BatchNumber, StoreError>;

    /// Returns the current number and advances the counter by one.
    fn reserve(&self) -> Result<BatchNumber, StoreError>;

    /// Returns `batch` to the pool.
    ///
    /// Only the most recent reservation may be released: `batch` must equal
    /// `peek() - 1`, otherwise [`StoreError::ReleaseOrder`] is returned and the
    /// counter is left untouched.
    fn release(&self, batch: BatchNumber) -> Result<(), StoreError>;
}

/// Checks a release request against the current counter value.
pub(crate) fn check_release(current: BatchNumber, requested: BatchNumber) -> Result<(), StoreError> {
    if requested.checked_next() == Some(current) {
        Ok(())
    } else {
        Err(StoreError::ReleaseOrder { current, requested })
    }
}

/// Contract checks shared by the counter implementations' tests.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;

    pub fn sequential_reserves_have_no_gaps(counter: &dyn BatchCounter) {
        let start = counter.peek().unwrap();
        let reserved: Vec<u64> = (0..5).map(|_| counter.reserve().unwrap().value()).collect();
        let expected: Vec<u64> = (start.value()..start.value() + 5).collect();
        assert_eq!(reserved, expected);
        assert_eq!(counter.peek().unwrap().value(), start.value() + 5);
    }

    pub fn release_then_reserve_returns_same_number(counter: &dyn BatchCounter) {
        let n = counter.reserve().unwrap();
        counter.release(n).unwrap();
        assert_eq!(counter.peek().unwrap(), n);
        assert_eq!(counter.reserve().unwrap(), n);
    }

    pub fn out_of_order_release_is_refused(counter: &dyn BatchCounter) {
        let first = counter.reserve().unwrap();
        let _second = counter.reserve().unwrap();
        let before = counter.peek().unwrap();

        let result = counter.release(first);
        assert!(matches!(result, Err(StoreError::ReleaseOrder { .. })));
        assert_eq!(counter.peek().unwrap(), before);
    }

    pub fn release_on_fresh_counter_is_refused(counter: &dyn BatchCounter) {
        assert_eq!(counter.peek().unwrap(), BatchNumber::ZERO);
        assert!(counter.release(BatchNumber::ZERO).is_err());
        assert_eq!(counter.peek().unwrap(), BatchNumber::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_release() {
        assert!(check_release(BatchNumber(5), BatchNumber(4)).is_ok());
        assert!(check_release(BatchNumber(5), BatchNumber(5)).is_err());
        assert!(check_release(BatchNumber(5), BatchNumber(3)).is_err());
        assert!(check_release(BatchNumber(0), BatchNumber(0)).is_err());
        assert!(check_release(BatchNumber(0), BatchNumber(u64::MAX)).is_err());
    }
}
