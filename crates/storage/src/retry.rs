// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retrying writes through the persistence collaborator.

use std::time::Duration;

use ax_core::{JobId, UnifiedJob};

use crate::store::{JobStore, JobUpdate, StoreError};

/// How often and how patiently to retry a transient write failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Base delay; attempt `n` waits `n * delay`.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 5, delay: Duration::from_millis(500) }
    }
}

/// Apply `update` to job `id`, retrying transient failures.
///
/// An empty update is a plain reload.
pub async fn update_model(
    store: &dyn JobStore,
    id: JobId,
    update: &JobUpdate,
    policy: RetryPolicy,
) -> Result<UnifiedJob, StoreError> {
    let mut attempt = 0;
    loop {
        let result = if update.is_empty() {
            store.load_job(id).await
        } else {
            store.update_job(id, update).await
        };
        match result {
            Ok(job) => return Ok(job),
            Err(e) if e.is_transient() && attempt + 1 < policy.attempts.max(1) => {
                attempt += 1;
                tracing::warn!(
                    job_id = %id,
                    attempt,
                    max_attempts = policy.attempts,
                    error = %e,
                    "transient store error, retrying update",
                );
                tokio::time::sleep(policy.delay * attempt).await;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(job_id = %id, error = %e, "giving up on update after retries");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
