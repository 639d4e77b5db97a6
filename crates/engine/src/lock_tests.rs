// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use ax_adapters::NeverCancel;
use async_trait::async_trait;
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(10);

/// Reports cancellation once set.
#[derive(Default)]
struct Flag(AtomicBool);

#[async_trait]
impl CancelCheck for Flag {
    async fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn acquire_creates_lock_file() {
    let dir = TempDir::new().unwrap();
    let lock = SourceTreeLock::new(dir.path().join("projects/_1__demo.lock"), POLL);
    let guard = lock.acquire(JobId::new(1), &NeverCancel).await.unwrap();
    assert!(guard.path().exists());
    guard.release();
}

#[tokio::test]
async fn second_holder_waits_for_release() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("p.lock");
    let first = SourceTreeLock::new(&path, POLL).acquire(JobId::new(1), &NeverCancel).await.unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let waiter = {
        let path = path.clone();
        let acquired = Arc::clone(&acquired);
        tokio::spawn(async move {
            let guard = SourceTreeLock::new(path, POLL).acquire(JobId::new(2), &NeverCancel).await.unwrap();
            acquired.store(true, Ordering::SeqCst);
            guard.release();
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!acquired.load(Ordering::SeqCst));
    first.release();
    waiter.await.unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancel_while_waiting_holds_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("p.lock");
    let held = SourceTreeLock::new(&path, POLL).acquire(JobId::new(1), &NeverCancel).await.unwrap();

    let flag = Arc::new(Flag::default());
    let waiter = {
        let path = path.clone();
        let flag = Arc::clone(&flag);
        tokio::spawn(async move { SourceTreeLock::new(path, POLL).acquire(JobId::new(2), flag.as_ref()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    flag.0.store(true, Ordering::SeqCst);

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, LockError::Canceled { .. }));
    held.release();

    // The canceled waiter left nothing behind.
    let again = SourceTreeLock::new(&path, POLL).acquire(JobId::new(3), &NeverCancel).await.unwrap();
    again.release();
}

#[tokio::test]
async fn drop_releases_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("p.lock");
    {
        let _guard = SourceTreeLock::new(&path, POLL).acquire(JobId::new(1), &NeverCancel).await.unwrap();
    }
    let guard = tokio::time::timeout(
        Duration::from_secs(1),
        SourceTreeLock::new(&path, POLL).acquire(JobId::new(2), &NeverCancel),
    )
    .await
    .unwrap()
    .unwrap();
    guard.release();
}

#[tokio::test]
async fn holders_never_overlap() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("p.lock");
    let inside = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicBool::new(false));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let path = path.clone();
            let inside = Arc::clone(&inside);
            let overlap = Arc::clone(&overlap);
            tokio::spawn(async move {
                let guard = SourceTreeLock::new(path, POLL).acquire(JobId::new(i), &NeverCancel).await.unwrap();
                if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                guard.release();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    assert!(!overlap.load(Ordering::SeqCst));
}

#[test]
fn missing_parent_directory_is_an_open_error() {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let lock = SourceTreeLock::new("/proc/ax-no-such/p.lock", POLL);
    let err = rt.block_on(lock.acquire(JobId::new(1), &NeverCancel)).unwrap_err();
    assert!(matches!(err, LockError::Open { .. }), "{err}");
}
