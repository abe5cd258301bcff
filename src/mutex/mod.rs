//! Expiring mutex: one named lock built from store primitives only.
//!
//! Without a timeout the lock is a bare set-if-absent: exact exclusion, but a
//! crashed holder keeps it forever until an operator clears the key.
//!
//! With a timeout the stored value is an absolute expiry. A contender that
//! finds an expired value takes the lock over with get-and-replace and trusts
//! the replaced value to tell whether it won. Two contenders that both read
//! the expired value before either replaces it can both conclude they won.
//! That window is accepted here; [`fenced::FencedMutex`] closes it for
//! stores that support conditional writes.

pub mod fenced;

use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::model::{HELD_SENTINEL, LockResult, LockValue, expiry_of, lease_end};
use crate::store::Store;

pub struct ExpiringMutex<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for ExpiringMutex<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: Store> ExpiringMutex<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current time according to this mutex's clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Current time in milliseconds according to this mutex's clock.
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Try once to take the lock at `key`.
    ///
    /// `timeout_seconds == 0` means no expiry.
    pub async fn acquire(&self, key: &str, timeout_seconds: u64) -> Result<LockResult> {
        if timeout_seconds == 0 {
            let acquired = self.store.set_if_absent(key, HELD_SENTINEL).await?;
            debug!(key, acquired, "lock attempt without timeout");
            return Ok(if acquired {
                LockResult::Acquired { lock_until: None }
            } else {
                LockResult::Denied
            });
        }

        let now = self.clock.now();
        let lock_until = lease_end(now, timeout_seconds);
        let value = lock_until.to_string();
        let acquired = LockResult::Acquired {
            lock_until: Some(lock_until),
        };

        if self.store.set_if_absent(key, &value).await? {
            debug!(key, lock_until, "lock acquired");
            return Ok(acquired);
        }

        match self.store.get(key).await? {
            Some(prior) if expiry_of(&prior) < now => {
                let old = self.store.get_and_replace(key, &value).await?;
                match old {
                    Some(old) if expiry_of(&old) >= now => {
                        debug!(key, "stale lock taken over by another worker first");
                        Ok(LockResult::Denied)
                    }
                    _ => {
                        debug!(key, stale_until = %prior, lock_until, "stale lock reclaimed");
                        Ok(acquired)
                    }
                }
            }
            _ => {
                // The holder may have released between the first attempt and the read.
                if self.store.set_if_absent(key, &value).await? {
                    debug!(key, lock_until, "lock acquired on retry");
                    Ok(acquired)
                } else {
                    debug!(key, "lock held");
                    Ok(LockResult::Denied)
                }
            }
        }
    }

    /// Delete the lock unconditionally.
    ///
    /// Only call this while the caller's own lease is still live; otherwise
    /// the key may belong to someone who reclaimed it.
    pub async fn release(&self, key: &str) -> Result<()> {
        self.store.delete(key).await?;
        debug!(key, "lock released");
        Ok(())
    }

    /// Overwrite the lease with `now + timeout_seconds`.
    ///
    /// Ownership is not checked; call only while holding the lock.
    pub async fn refresh(&self, key: &str, timeout_seconds: u64) -> Result<LockValue> {
        let value = LockValue::for_timeout(self.clock.now(), timeout_seconds);
        self.store.get_and_replace(key, &value.to_string()).await?;
        debug!(key, %value, "lock refreshed");
        Ok(value)
    }

    /// Is `key` held right now?
    ///
    /// With a timeout, an expired lease counts as not held.
    pub async fn is_locked(&self, key: &str, timeout_seconds: u64) -> Result<bool> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(false);
        };
        if timeout_seconds == 0 {
            return Ok(true);
        }
        Ok(expiry_of(&raw) >= self.clock.now())
    }
}
