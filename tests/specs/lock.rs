//! Source tree lock specs
//!
//! At most one holder per project checkout at any instant, and a holder
//! that bails out without releasing never wedges the next one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ax_adapters::NeverCancel;
use ax_engine::SourceTreeLock;

use crate::prelude::*;

const POLL: Duration = Duration::from_millis(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_holders_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("_1__demo.lock");
    let holders = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for id in 1..=8u64 {
        let path = path.clone();
        let holders = Arc::clone(&holders);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let lock = SourceTreeLock::new(path, POLL);
            let guard = lock.acquire(JobId::new(id), &NeverCancel).await.unwrap();
            let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            holders.fetch_sub(1, Ordering::SeqCst);
            guard.release();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropped_guard_releases() {
    let dir = tempfile::tempdir().unwrap();
    let lock = SourceTreeLock::new(dir.path().join("p.lock"), POLL);

    {
        let _guard = lock.acquire(JobId::new(1), &NeverCancel).await.unwrap();
    }

    let second = tokio::time::timeout(Duration::from_secs(5), lock.acquire(JobId::new(2), &NeverCancel)).await;
    assert!(second.unwrap().is_ok());
}
