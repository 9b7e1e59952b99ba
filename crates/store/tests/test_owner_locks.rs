#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use concierge_store::{OwnerLocks, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_acquire_and_release() {
    let locks = OwnerLocks::new(Duration::from_secs(5));
    let guard = locks.acquire("alice").await.unwrap();
    assert_eq!(guard.owner_key(), "alice");
    drop(guard);
    let _again = locks.acquire("alice").await.unwrap();
}

#[tokio::test]
async fn test_same_owner_times_out() {
    let locks = OwnerLocks::new(Duration::from_millis(50));
    let _held = locks.acquire("alice").await.unwrap();
    let result = locks.acquire("alice").await;
    assert!(matches!(result, Err(StoreError::LockTimeout(owner)) if owner == "alice"));
}

#[tokio::test]
async fn test_different_owners_independent() {
    let locks = OwnerLocks::new(Duration::from_millis(50));
    let _alice = locks.acquire("alice").await.unwrap();
    let _bob = locks.acquire("bob").await.unwrap();
    assert_eq!(locks.tracked_owners(), 2);
}

#[tokio::test]
async fn test_mutations_are_serialized() {
    let locks = OwnerLocks::new(Duration::from_secs(5));
    let inside = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let locks = locks.clone();
        let inside = Arc::clone(&inside);
        let max_seen = Arc::clone(&max_seen);
        handles.push(tokio::spawn(async move {
            let _guard = locks.acquire("alice").await.unwrap();
            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}
