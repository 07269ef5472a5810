use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tokio::time::timeout;
use warden::server::WorkerPool;

#[tokio::test]
async fn test_admission_blocks_when_saturated() {
    let pool = WorkerPool::new(1, 2);
    let release = Arc::new(Notify::new());

    for _ in 0..2 {
        let admission = pool.admit().await.unwrap();
        let release = release.clone();
        pool.submit(admission, async move { release.notified().await });
    }
    assert_eq!(pool.in_flight(), 2);

    // The third unit is delayed, not rejected.
    assert!(timeout(Duration::from_millis(50), pool.admit()).await.is_err());

    release.notify_one();
    let admission = timeout(Duration::from_secs(1), pool.admit())
        .await
        .expect("a slot frees up")
        .unwrap();
    assert_eq!(pool.in_flight(), 2);

    drop(admission);
    release.notify_one();
}

#[tokio::test]
async fn test_running_units_bounded_by_workers() {
    let pool = WorkerPool::new(2, 6);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..6 {
        let admission = pool.admit().await.unwrap();
        let running = running.clone();
        let peak = peak.clone();
        pool.submit(admission, async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            running.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pool.shutdown().await;

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(running.load(Ordering::SeqCst), 0);
    assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn test_panicking_unit_releases_its_slot() {
    let pool = WorkerPool::new(1, 1);

    let admission = pool.admit().await.unwrap();
    pool.submit(admission, async { panic!("unit failed") });

    let admission = timeout(Duration::from_secs(1), pool.admit())
        .await
        .expect("slot released after panic")
        .unwrap();
    drop(admission);
    assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_units() {
    let pool = WorkerPool::new(2, 4);
    let (tx, rx) = oneshot::channel::<()>();
    let finished = Arc::new(AtomicUsize::new(0));

    let admission = pool.admit().await.unwrap();
    let done = finished.clone();
    pool.submit(admission, async move {
        let _ = rx.await;
        done.fetch_add(1, Ordering::SeqCst);
    });

    let shutdown = pool.shutdown();
    tokio::pin!(shutdown);
    assert!(timeout(Duration::from_millis(50), &mut shutdown).await.is_err());

    tx.send(()).unwrap();
    timeout(Duration::from_secs(1), shutdown)
        .await
        .expect("drain completes");
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    // No new work after shutdown.
    assert!(pool.admit().await.is_err());
}
