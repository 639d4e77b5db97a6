// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job completion notifications and status broadcasts.

use async_trait::async_trait;
use ax_core::{JobStatus, UnifiedJob};
use thiserror::Error;

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

ax_core::str_enum! {
    /// Which notification templates fire for a job.
    pub enum NotificationTrigger {
        /// The job has started running.
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
    }
}

impl NotificationTrigger {
    /// Trigger for a terminal status; `None` while the job is still active.
    pub fn for_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Successful => Some(Self::Succeeded),
            s if s.is_terminal() => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Adapter for job notifications
#[async_trait]
pub trait NotifyAdapter: Send + Sync {
    /// Send the job's notification templates for `trigger`.
    async fn send_notification_templates(
        &self,
        job: &UnifiedJob,
        trigger: NotificationTrigger,
    ) -> Result<(), NotifyError>;

    /// Broadcast a status change. Fire-and-forget.
    fn status_changed(&self, job: &UnifiedJob, status: JobStatus);
}

/// Notification adapter that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifyAdapter;

impl LogNotifyAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifyAdapter for LogNotifyAdapter {
    async fn send_notification_templates(
        &self,
        job: &UnifiedJob,
        trigger: NotificationTrigger,
    ) -> Result<(), NotifyError> {
        tracing::info!(job_id = %job.id, %trigger, "sending notification templates");
        Ok(())
    }

    fn status_changed(&self, job: &UnifiedJob, status: JobStatus) {
        tracing::info!(job_id = %job.id, kind = %job.kind(), %status, "status changed");
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{NotificationTrigger, NotifyAdapter, NotifyError};
    use async_trait::async_trait;
    use ax_core::{JobId, JobStatus, UnifiedJob};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded notification
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum NotifyCall {
        Templates { job_id: JobId, trigger: NotificationTrigger },
        Status { job_id: JobId, status: JobStatus },
    }

    #[derive(Default)]
    struct FakeNotifyState {
        calls: Vec<NotifyCall>,
        fail_sends: bool,
    }

    /// Fake notification adapter for testing
    #[derive(Clone, Default)]
    pub struct FakeNotifyAdapter {
        inner: Arc<Mutex<FakeNotifyState>>,
    }

    impl FakeNotifyAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make template sends fail.
        pub fn fail_sends(&self) {
            self.inner.lock().fail_sends = true;
        }

        /// Get all recorded notifications
        pub fn calls(&self) -> Vec<NotifyCall> {
            self.inner.lock().calls.clone()
        }

        pub fn triggers(&self) -> Vec<NotificationTrigger> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    NotifyCall::Templates { trigger, .. } => Some(trigger),
                    NotifyCall::Status { .. } => None,
                })
                .collect()
        }

        pub fn statuses(&self) -> Vec<JobStatus> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    NotifyCall::Status { status, .. } => Some(status),
                    NotifyCall::Templates { .. } => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl NotifyAdapter for FakeNotifyAdapter {
        async fn send_notification_templates(
            &self,
            job: &UnifiedJob,
            trigger: NotificationTrigger,
        ) -> Result<(), NotifyError> {
            let mut inner = self.inner.lock();
            inner.calls.push(NotifyCall::Templates { job_id: job.id, trigger });
            if inner.fail_sends {
                return Err(NotifyError::SendFailed("fake failure".to_string()));
            }
            Ok(())
        }

        fn status_changed(&self, job: &UnifiedJob, status: JobStatus) {
            self.inner.lock().calls.push(NotifyCall::Status { job_id: job.id, status });
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifyAdapter, NotifyCall};

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
