//! Tests for Store::batch
//!
//! These tests verify:
//! - Concurrent batch calls all commit
//! - A failing call only fails its own caller
//! - Batch writes feed the metrics recorder

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use persistkv::{Config, Context, PersistError, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store(max_batch_size: usize, max_batch_delay: Duration) -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .path(temp_dir.path().join("batch.redb"))
        .max_batch_size(max_batch_size)
        .max_batch_delay(max_batch_delay)
        .build();
    let store = Store::open(&Context::background(), config).unwrap();
    (temp_dir, store)
}

// =============================================================================
// Batch Tests
// =============================================================================

#[test]
fn test_batch_single_call() {
    let (_temp, store) = setup_temp_store(1000, Duration::from_millis(10));

    store
        .batch(|tx| tx.put("movies", b"Rogers", b"Captain America"))
        .unwrap();

    assert_eq!(
        store.get("movies", "Rogers").unwrap(),
        Some(b"Captain America".to_vec())
    );
}

#[test]
fn test_batch_concurrent_calls_all_commit() {
    let (_temp, store) = setup_temp_store(1000, Duration::from_millis(20));
    let barrier = Arc::new(Barrier::new(16));

    let mut handles = vec![];
    for t in 0..16u8 {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            store
                .batch(move |tx| tx.put("batch", &[t], &[t, t]))
                .unwrap();
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.list_keys("batch").unwrap().len(), 16);
    for t in 0..16u8 {
        assert_eq!(store.get("batch", [t]).unwrap(), Some(vec![t, t]));
    }
}

#[test]
fn test_batch_full_batch_runs_without_waiting() {
    // A delay this long would stall the test if full batches waited for it.
    let (_temp, store) = setup_temp_store(4, Duration::from_secs(30));
    let barrier = Arc::new(Barrier::new(4));

    let mut handles = vec![];
    for t in 0..4u8 {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            store.batch(move |tx| tx.put("full", &[t], b"x")).unwrap();
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.list_keys("full").unwrap().len(), 4);
}

#[test]
fn test_batch_failing_call_is_isolated() {
    let (_temp, store) = setup_temp_store(1000, Duration::from_millis(50));
    let barrier = Arc::new(Barrier::new(8));

    let mut handles = vec![];
    for t in 0..8u8 {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            store.batch(move |tx| {
                tx.put("mixed", &[t], b"ok")?;
                if t == 3 {
                    return Err(PersistError::Aborted("call 3 fails".to_string()));
                }
                Ok(())
            })
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for (t, result) in results.iter().enumerate() {
        if t == 3 {
            assert!(matches!(result, Err(PersistError::Aborted(_))));
        } else {
            assert!(result.is_ok(), "call {} failed: {:?}", t, result);
        }
    }

    assert_eq!(store.get("mixed", [3u8]).unwrap(), None);
    assert_eq!(store.list_keys("mixed").unwrap().len(), 7);
}

#[test]
fn test_batch_calls_may_be_retried() {
    let (_temp, store) = setup_temp_store(1000, Duration::from_millis(50));
    let runs = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(2));

    let good = {
        let store = store.clone();
        let runs = Arc::clone(&runs);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            store.batch(move |tx| {
                runs.fetch_add(1, Ordering::SeqCst);
                tx.put("retry", b"good", b"1")
            })
        })
    };
    let bad = {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            store.batch(|_| Err(PersistError::Aborted("always".to_string())))
        })
    };

    assert!(good.join().unwrap().is_ok());
    assert!(bad.join().unwrap().is_err());

    // Runs once alone, or twice when it shared a batch with the failing call
    let count = runs.load(Ordering::SeqCst);
    assert!((1..=2).contains(&count));
    assert_eq!(store.get("retry", "good").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_batch_records_writes() {
    let (_temp, store) = setup_temp_store(1000, Duration::from_millis(5));

    let before = store.metrics().unwrap().iops.total_writes;
    store.put_batch("frames", "clip", vec![vec![1; 10], vec![2; 10]]).unwrap();
    let after = store.metrics().unwrap();

    assert_eq!(after.iops.total_writes, before + 1);
    assert!(after.system_metrics.stats.puts >= 2);
}
