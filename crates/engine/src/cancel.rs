// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation state of one run: the job's persisted cancel flag plus the
//! worker-wide shutdown signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ax_adapters::CancelCheck;
use ax_core::JobId;
use ax_storage::JobStore;
use tokio_util::sync::CancellationToken;

pub struct CancelWatch {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    shutdown: CancellationToken,
    flag: AtomicBool,
}

impl CancelWatch {
    pub fn new(store: Arc<dyn JobStore>, job_id: JobId, shutdown: CancellationToken) -> Self {
        Self { store, job_id, shutdown, flag: AtomicBool::new(false) }
    }

    /// The worker is shutting down.
    pub fn signal_fired(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Re-read the cancel flag. On store errors the last known value stands.
    pub async fn refresh(&self) -> bool {
        match self.store.refresh_cancel_flag(self.job_id).await {
            Ok(flag) => {
                self.flag.store(flag, Ordering::SeqCst);
                flag
            }
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "failed to refresh cancel flag");
                self.flag.load(Ordering::SeqCst)
            }
        }
    }

    pub fn last_known(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CancelWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelWatch")
            .field("job_id", &self.job_id)
            .field("flag", &self.last_known())
            .field("shutdown", &self.signal_fired())
            .finish()
    }
}

#[async_trait]
impl CancelCheck for CancelWatch {
    async fn is_canceled(&self) -> bool {
        self.signal_fired() || self.refresh().await
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
