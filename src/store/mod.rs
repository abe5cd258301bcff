//! Store adapter contract.
//!
//! The only way any component touches shared state. Each operation is a
//! single atomic step on the backing store; nothing here composes them.
//! Every call may block on I/O and may fail with a connectivity error,
//! which callers propagate rather than read as contention.

pub mod memory;
pub mod postgres;

use std::future::Future;

use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Key/value store primitives used by the locking algorithms.
pub trait Store: Send + Sync {
    /// Write `value` only if `key` has no value. True iff the write happened.
    fn set_if_absent(&self, key: &str, value: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Single non-atomic read.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Always write `value`, returning whatever was there before.
    fn get_and_replace(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Remove `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// A store that can also make writes conditional on the exact current value.
///
/// Needed only by [`crate::mutex::fenced::FencedMutex`].
pub trait FencedStore: Store {
    /// Replace the value only if it currently equals `expected`.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        value: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Delete the key only if its value currently equals `expected`.
    fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = Result<bool>> + Send;
}
