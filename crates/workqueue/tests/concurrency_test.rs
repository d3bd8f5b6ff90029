//! Concurrency tests for the work queue
//!
//! Several workers hammer one queue while a producer keeps re-adding a small
//! set of hot keys. No key may ever be held by two workers at once.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use workqueue::WorkQueue;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_key_never_processed_concurrently() {
    let queue: WorkQueue<u32> = WorkQueue::new();
    let in_flight = Arc::new(Mutex::new(HashSet::new()));
    let processed = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        let in_flight = Arc::clone(&in_flight);
        let processed = Arc::clone(&processed);
        workers.push(tokio::spawn(async move {
            while let Some(key) = queue.get().await {
                assert!(
                    in_flight.lock().unwrap().insert(key),
                    "key {key} handed to two workers at once"
                );
                tokio::time::sleep(Duration::from_micros(200)).await;
                in_flight.lock().unwrap().remove(&key);
                processed.fetch_add(1, Ordering::SeqCst);
                queue.done(&key);
            }
        }));
    }

    for round in 0..200u32 {
        queue.add(round % 5);
        if round % 20 == 0 {
            tokio::task::yield_now().await;
        }
    }

    // Let the workers catch up before shutting down
    tokio::time::sleep(Duration::from_millis(200)).await;
    queue.shut_down();

    for worker in workers {
        worker.await.unwrap();
    }

    // Coalescing means far fewer than 200 runs, but every key ran at least once
    let processed = processed.load(Ordering::SeqCst);
    assert!(processed >= 5, "processed only {processed} items");
    assert!(processed <= 200);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_readd_during_processing_is_not_lost() {
    let queue: WorkQueue<&'static str> = WorkQueue::new();
    queue.add("ns/a");

    let key = queue.get().await.unwrap();
    queue.add("ns/a");
    queue.done(&key);

    let again = tokio::time::timeout(Duration::from_secs(1), queue.get())
        .await
        .unwrap();
    assert_eq!(again, Some("ns/a"));
}
