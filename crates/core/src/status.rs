// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job status and the transitions the task engine relies on.

crate::str_enum! {
    /// Persisted status of a job-like entity.
    pub enum JobStatus {
        New => "new",
        Pending => "pending",
        Waiting => "waiting",
        Running => "running",
        Successful => "successful",
        Failed => "failed",
        Error => "error",
        Canceled => "canceled",
    }
}

/// Statuses from which a worker may still claim a job.
pub const ACTIVE_STATES: &[JobStatus] =
    &[JobStatus::New, JobStatus::Pending, JobStatus::Waiting, JobStatus::Running];

impl JobStatus {
    pub fn is_active(self) -> bool {
        ACTIVE_STATES.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Successful | Self::Failed | Self::Error | Self::Canceled)
    }

    /// Notification trigger for a terminal status.
    pub fn notification_trigger(self) -> &'static str {
        if self == Self::Successful {
            "succeeded"
        } else {
            "failed"
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
