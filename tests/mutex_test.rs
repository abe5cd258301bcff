//! Integration tests for the expiring mutex.

use std::sync::Arc;

use joblock::model::{LockResult, LockValue};
use joblock::store::{MemoryStore, Store};
use joblock::{Clock, ExpiringMutex, ManualClock, Result};
use tokio::sync::Barrier;

const KEY: &str = "lock:Export:42";

fn worker(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> ExpiringMutex<MemoryStore> {
    ExpiringMutex::new(Arc::clone(store), Arc::clone(clock) as Arc<dyn Clock>)
}

fn acquired(lock_until: i64) -> LockResult {
    LockResult::Acquired {
        lock_until: Some(lock_until),
    }
}

// ---------------------------------------------------------------------------
// No timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_timeout_excludes_until_release() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));
    let w1 = worker(&store, &clock);
    let w2 = worker(&store, &clock);

    assert_eq!(
        w1.acquire(KEY, 0).await.unwrap(),
        LockResult::Acquired { lock_until: None }
    );
    assert_eq!(w2.acquire(KEY, 0).await.unwrap(), LockResult::Denied);

    w1.release(KEY).await.unwrap();
    assert_eq!(store.get(KEY).await.unwrap(), None);

    assert!(w2.acquire(KEY, 0).await.unwrap().is_acquired());
}

#[tokio::test]
async fn no_timeout_lock_never_self_heals() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));
    let w1 = worker(&store, &clock);
    let w2 = worker(&store, &clock);

    w1.acquire(KEY, 0).await.unwrap();
    clock.advance(1_000_000);
    assert_eq!(w2.acquire(KEY, 0).await.unwrap(), LockResult::Denied);
    assert!(w2.is_locked(KEY, 0).await.unwrap());
}

#[tokio::test]
async fn many_contenders_only_one_wins() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));

    let mut wins = 0;
    for _ in 0..10 {
        if worker(&store, &clock).acquire(KEY, 0).await.unwrap().is_acquired() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
}

// ---------------------------------------------------------------------------
// With timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_lease_denies_second_worker() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));

    assert_eq!(worker(&store, &clock).acquire(KEY, 60).await.unwrap(), acquired(1060));
    assert_eq!(store.get(KEY).await.unwrap().as_deref(), Some("1060"));

    clock.set(1010);
    assert_eq!(
        worker(&store, &clock).acquire(KEY, 60).await.unwrap(),
        LockResult::Denied
    );
    assert_eq!(store.get(KEY).await.unwrap().as_deref(), Some("1060"));
}

#[tokio::test]
async fn oversized_timeout_saturates_and_still_excludes() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));

    let a = worker(&store, &clock).acquire(KEY, u64::MAX).await.unwrap();
    let b = worker(&store, &clock).acquire(KEY, u64::MAX).await.unwrap();

    assert_eq!(a, acquired(i64::MAX));
    assert_eq!(b, LockResult::Denied);
    assert_eq!(store.get(KEY).await.unwrap(), Some(i64::MAX.to_string()));
}

#[tokio::test]
async fn expired_lease_is_reclaimed() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));

    worker(&store, &clock).acquire(KEY, 60).await.unwrap();

    clock.set(1070);
    assert_eq!(worker(&store, &clock).acquire(KEY, 60).await.unwrap(), acquired(1130));
    assert_eq!(store.get(KEY).await.unwrap().as_deref(), Some("1130"));
}

#[tokio::test]
async fn lease_is_live_through_its_last_second() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));

    worker(&store, &clock).acquire(KEY, 60).await.unwrap();
    clock.set(1060);
    assert_eq!(
        worker(&store, &clock).acquire(KEY, 60).await.unwrap(),
        LockResult::Denied
    );
    clock.set(1061);
    assert!(worker(&store, &clock).acquire(KEY, 60).await.unwrap().is_acquired());
}

#[tokio::test]
async fn sentinel_value_reads_as_stale_under_timeout() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));

    // Left behind by a no-timeout holder before the job type gained a timeout.
    worker(&store, &clock).acquire(KEY, 0).await.unwrap();
    assert_eq!(worker(&store, &clock).acquire(KEY, 60).await.unwrap(), acquired(1060));
}

#[tokio::test]
async fn refresh_extends_lease() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));
    let holder = worker(&store, &clock);

    holder.acquire(KEY, 60).await.unwrap();
    clock.set(1050);
    assert_eq!(holder.refresh(KEY, 60).await.unwrap(), LockValue::Until(1110));

    clock.set(1070);
    assert_eq!(
        worker(&store, &clock).acquire(KEY, 60).await.unwrap(),
        LockResult::Denied
    );
}

#[tokio::test]
async fn is_locked_respects_expiry() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));
    let holder = worker(&store, &clock);

    assert!(!holder.is_locked(KEY, 60).await.unwrap());
    holder.acquire(KEY, 60).await.unwrap();
    assert!(holder.is_locked(KEY, 60).await.unwrap());
    clock.set(1061);
    assert!(!holder.is_locked(KEY, 60).await.unwrap());
}

// ---------------------------------------------------------------------------
// Racing takeover
// ---------------------------------------------------------------------------

/// Holds every `get` until two callers have read, so both see the same value.
struct LockstepStore {
    inner: MemoryStore,
    barrier: Barrier,
}

impl Store for LockstepStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        self.inner.set_if_absent(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self.inner.get(key).await?;
        self.barrier.wait().await;
        Ok(value)
    }

    async fn get_and_replace(&self, key: &str, value: &str) -> Result<Option<String>> {
        self.inner.get_and_replace(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn racing_takeover_is_settled_by_replaced_value() {
    let inner = MemoryStore::new();
    inner.set_if_absent(KEY, "1060").await.unwrap();
    let store = Arc::new(LockstepStore {
        inner,
        barrier: Barrier::new(2),
    });
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1070));
    let a = ExpiringMutex::new(Arc::clone(&store), Arc::clone(&clock));
    let b = ExpiringMutex::new(Arc::clone(&store), Arc::clone(&clock));

    // Both observe the stale 1060 before either replaces it.
    let (ra, rb) = tokio::join!(a.acquire(KEY, 60), b.acquire(KEY, 60));
    let results = [ra.unwrap(), rb.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_acquired()).count(), 1);
    assert!(results.contains(&acquired(1130)));
    assert!(results.contains(&LockResult::Denied));
    // The loser's replace still landed; the value is its own lease.
    assert_eq!(store.inner.get(KEY).await.unwrap().as_deref(), Some("1130"));
}

#[tokio::test]
async fn skewed_clock_lets_two_workers_hold_a_reclaimed_lock() {
    let store = Arc::new(MemoryStore::new());
    store.set_if_absent(KEY, "1060").await.unwrap();

    let a = worker(&store, &Arc::new(ManualClock::new(1070)));
    // Worker b's clock runs 100s ahead of a's.
    let b = worker(&store, &Arc::new(ManualClock::new(1170)));

    assert_eq!(a.acquire(KEY, 60).await.unwrap(), acquired(1130));
    // a's fresh lease (1130) already looks expired to b.
    assert_eq!(b.acquire(KEY, 60).await.unwrap(), acquired(1230));
}
