//! Integration tests for the singleton admission gate.

use std::sync::Arc;

use joblock::store::{MemoryStore, Store};
use joblock::{AdmissionGate, Clock, ExpiringMutex, ManualClock};

fn gate(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> AdmissionGate<MemoryStore> {
    AdmissionGate::new(ExpiringMutex::new(
        Arc::clone(store),
        Arc::clone(clock) as Arc<dyn Clock>,
    ))
}

#[tokio::test]
async fn running_job_blocks_admission_without_touching_admission_key() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));
    store.set_if_absent("lock:Export:42", "held").await.unwrap();

    assert!(!gate(&store, &clock).admit("Export", "42", 0).await.unwrap());
    assert_eq!(store.get("admission:lock:Export:42").await.unwrap(), None);
}

#[tokio::test]
async fn second_admission_is_denied_until_release() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));
    let gate = gate(&store, &clock);

    assert!(gate.admit("Export", "42", 0).await.unwrap());
    assert!(!gate.admit("Export", "42", 0).await.unwrap());
    assert!(gate.is_enqueued("Export", "42", 0).await.unwrap());

    gate.release("Export", "42").await.unwrap();
    assert!(!gate.is_enqueued("Export", "42", 0).await.unwrap());
    assert!(gate.admit("Export", "42", 0).await.unwrap());
}

#[tokio::test]
async fn expired_execution_lock_does_not_block_admission() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));
    store.set_if_absent("lock:Export:42", "990").await.unwrap();

    assert!(gate(&store, &clock).admit("Export", "42", 60).await.unwrap());
    assert_eq!(
        store.get("admission:lock:Export:42").await.unwrap().as_deref(),
        Some("1060")
    );
}

#[tokio::test]
async fn live_execution_lock_with_timeout_blocks_admission() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));
    store.set_if_absent("lock:Export:42", "1030").await.unwrap();

    assert!(!gate(&store, &clock).admit("Export", "42", 60).await.unwrap());
}

#[tokio::test]
async fn stale_admission_is_reclaimed() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));
    let gate = gate(&store, &clock);

    assert!(gate.admit("Export", "42", 60).await.unwrap());
    clock.set(1061);
    assert!(!gate.is_enqueued("Export", "42", 60).await.unwrap());
    assert!(gate.admit("Export", "42", 60).await.unwrap());
}

#[tokio::test]
async fn releasing_missing_admission_is_harmless() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1000));

    gate(&store, &clock).release("Export", "never-queued").await.unwrap();
    assert!(store.is_empty().unwrap());
}
