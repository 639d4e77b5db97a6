// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project source tree lock.
//!
//! An exclusive advisory lock on `<projects root>/<local_path>.lock`
//! serializes everything that touches a project's checkout, across tasks and
//! processes on this node. Waiting polls non-blocking attempts so the waiter
//! can notice cancellation in between.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ax_adapters::CancelCheck;
use ax_core::JobId;
use fs2::FileExt;
use tokio::time::Instant;

use crate::error::LockError;

/// Waits longer than this are logged.
const SLOW_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SourceTreeLock {
    path: PathBuf,
    poll_interval: Duration,
}

impl SourceTreeLock {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self { path: path.into(), poll_interval }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held, or fail with [`LockError::Canceled`] as
    /// soon as `cancel` fires. Nothing is held on error.
    pub async fn acquire(&self, job_id: JobId, cancel: &dyn CancelCheck) -> Result<SourceTreeGuard, LockError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| LockError::Open { path: self.path.clone(), source })?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| LockError::Open { path: self.path.clone(), source })?;

        let started = Instant::now();
        let mut logged_contention = false;
        loop {
            if cancel.is_canceled().await {
                tracing::debug!(%job_id, path = %self.path.display(), "canceled while waiting for lock");
                return Err(LockError::Canceled { path: self.path.clone() });
            }
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if is_contended(&e) => {
                    if !logged_contention {
                        tracing::info!(%job_id, path = %self.path.display(), "waiting for source tree lock");
                        logged_contention = true;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(source) => {
                    tracing::error!(%job_id, path = %self.path.display(), error = %source, "failed to lock source tree");
                    return Err(LockError::Lock { path: self.path.clone(), source });
                }
            }
        }

        let waited = started.elapsed();
        if waited > SLOW_WAIT {
            tracing::info!(
                %job_id,
                path = %self.path.display(),
                waited_secs = waited.as_secs_f64(),
                "acquired source tree lock after waiting",
            );
        }
        Ok(SourceTreeGuard { file: Some(file), path: self.path.clone(), job_id })
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Held lock; released on [`SourceTreeGuard::release`] or drop.
#[derive(Debug)]
pub struct SourceTreeGuard {
    file: Option<File>,
    path: PathBuf,
    job_id: JobId,
}

impl SourceTreeGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!(job_id = %self.job_id, path = %self.path.display(), error = %e, "failed to unlock source tree");
            }
            tracing::debug!(job_id = %self.job_id, path = %self.path.display(), "released source tree lock");
        }
    }
}

impl Drop for SourceTreeGuard {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
