// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ax_core::UnifiedJob;
use ax_storage::MemoryStore;

fn store_with_job() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_job(UnifiedJob::builder().id(JobId::new(5)).build());
    store
}

#[tokio::test]
async fn reports_persisted_cancel_flag() {
    let store = store_with_job();
    let watch = CancelWatch::new(store.clone(), JobId::new(5), CancellationToken::new());
    assert!(!watch.is_canceled().await);

    store.request_cancel(JobId::new(5)).unwrap();
    assert!(watch.is_canceled().await);
    assert!(watch.last_known());
}

#[tokio::test]
async fn shutdown_signal_cancels_without_flag() {
    let store = store_with_job();
    let token = CancellationToken::new();
    let watch = CancelWatch::new(store, JobId::new(5), token.clone());
    token.cancel();
    assert!(watch.signal_fired());
    assert!(watch.is_canceled().await);
    assert!(!watch.last_known());
}

#[tokio::test]
async fn store_errors_keep_last_known_value() {
    let store = Arc::new(MemoryStore::new());
    let watch = CancelWatch::new(store, JobId::new(99), CancellationToken::new());
    assert!(!watch.refresh().await);
}
