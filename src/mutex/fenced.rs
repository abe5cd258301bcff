//! Fenced mutex: an opt-in stronger mode.
//!
//! Each holder writes `<expiry>:<token>` with a fresh random token. A stale
//! lock is taken over with compare-and-swap against the exact value that was
//! read, so of two contenders that saw the same stale value only one wins.
//! Release and refresh are conditional on the token as well, so a holder
//! whose lease lapsed cannot delete or extend someone else's lock.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Result;
use crate::model::{HELD_SENTINEL, LockValue};
use crate::store::FencedStore;

/// A held fenced lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedLease {
    pub key: String,
    pub token: Uuid,
    /// `None` for locks taken without a timeout.
    pub lock_until: Option<i64>,
}

impl FencedLease {
    fn stored_value(&self) -> String {
        encode(self.lock_until, self.token)
    }
}

pub struct FencedMutex<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for FencedMutex<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: FencedStore> FencedMutex<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Try once to take the lock. Returns the lease on success.
    pub async fn acquire(&self, key: &str, timeout_seconds: u64) -> Result<Option<FencedLease>> {
        let now = self.clock.now();
        let lease = FencedLease {
            key: key.to_string(),
            token: Uuid::new_v4(),
            lock_until: LockValue::for_timeout(now, timeout_seconds).lock_until(),
        };
        let value = lease.stored_value();

        if self.store.set_if_absent(key, &value).await? {
            debug!(key, token = %lease.token, "fenced lock acquired");
            return Ok(Some(lease));
        }

        let won = match self.store.get(key).await? {
            Some(prior) if is_stale(&prior, now) => {
                self.store.compare_and_swap(key, &prior, &value).await?
            }
            Some(_) => false,
            None => self.store.set_if_absent(key, &value).await?,
        };

        if won {
            debug!(key, token = %lease.token, "fenced lock acquired after contention");
            Ok(Some(lease))
        } else {
            debug!(key, "fenced lock held");
            Ok(None)
        }
    }

    /// Delete the lock if it is still ours. False means it was not.
    pub async fn release(&self, lease: &FencedLease) -> Result<bool> {
        let released = self
            .store
            .compare_and_delete(&lease.key, &lease.stored_value())
            .await?;
        debug!(key = %lease.key, released, "fenced lock release");
        Ok(released)
    }

    /// Extend the lease if it is still ours. False means it was not, and
    /// `lease` is left unchanged.
    pub async fn refresh(&self, lease: &mut FencedLease, timeout_seconds: u64) -> Result<bool> {
        let renewed = FencedLease {
            lock_until: LockValue::for_timeout(self.clock.now(), timeout_seconds).lock_until(),
            ..lease.clone()
        };
        let swapped = self
            .store
            .compare_and_swap(&lease.key, &lease.stored_value(), &renewed.stored_value())
            .await?;
        if swapped {
            *lease = renewed;
        }
        Ok(swapped)
    }
}

fn encode(lock_until: Option<i64>, token: Uuid) -> String {
    match lock_until {
        Some(ts) => format!("{ts}:{token}"),
        None => format!("{HELD_SENTINEL}:{token}"),
    }
}

/// A value is stale when its expiry part is a timestamp in the past.
/// Values without an expiry never go stale.
fn is_stale(raw: &str, now: i64) -> bool {
    let expiry = raw.split_once(':').map_or(raw, |(expiry, _)| expiry);
    LockValue::parse(expiry).is_expired(now)
}
