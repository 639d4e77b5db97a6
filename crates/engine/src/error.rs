// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for task execution.
//!
//! Every failure inside a run is a [`TaskError`]; [`TaskError::terminal_status`]
//! is the single table mapping an error kind to the job's final status.

use std::io;
use std::path::PathBuf;

use ax_adapters::{InjectorError, RunnerError};
use ax_core::{JobId, JobKind, JobStatus};
use ax_storage::StoreError;
use thiserror::Error;

/// Failures creating or writing the private data dir.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("isolation base path {0} does not exist")]
    MissingBase(PathBuf),
    #[error("failed to create private data dir under {path}: {source}")]
    Create { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to copy {from} to {to}: {source}")]
    Copy { from: PathBuf, to: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to open lock file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("I/O error while trying to acquire lock on file {path}: {source}")]
    Lock { path: PathBuf, source: io::Error },
    #[error("canceled while waiting for lock on {path}")]
    Canceled { path: PathBuf },
}

/// Failures assembling the runner request.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Inline Jinja variables are not allowed.")]
    Jinja,
    #[error("The {0} could not run because there is no Execution Environment.")]
    NoExecutionEnvironment(JobKind),
    #[error("Please recheck that your host, username, and password fields are all filled.")]
    RegistryCredential,
    #[error("multiple vault credentials were specified with --vault-id {0}@prompt")]
    DuplicateVaultId(String),
    #[error("{0} are prohibited from use in ad hoc commands.")]
    ProhibitedVars(String),
    #[error("Could not determine a revision to run from project.")]
    NoRevision,
    #[error("Inventory Source is not associated with an Inventory.")]
    NoInventory,
    #[error("Cannot update file sources through the task system.")]
    FileSource,
    #[error("failed to render {what}: {message}")]
    Render { what: &'static str, message: String },
    #[error(transparent)]
    Inject(#[from] InjectorError),
    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// Post-run failure that overrides a successful status.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PostRunError {
    pub status: JobStatus,
    pub message: String,
    pub traceback: Option<String>,
}

impl PostRunError {
    pub fn new(status: JobStatus, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), traceback: None }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    /// A local resource (lock file, private dir, isolation root) was unusable.
    #[error("{0}")]
    Resource(String),
    /// The nested project sync failed.
    #[error("{explanation}")]
    Sync { update_id: JobId, explanation: String },
    #[error("runner failed: {0}")]
    Runner(#[from] RunnerError),
    #[error("canceled")]
    Canceled,
    /// The job cannot start in its current shape.
    #[error("{message}")]
    Precondition { status: JobStatus, message: String },
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    PostRun(#[from] PostRunError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
    #[error("not starting {status} task")]
    NotActive { job_id: JobId, status: JobStatus },
    #[error("failed to load job {job_id}: {source}")]
    Load { job_id: JobId, source: StoreError },
}

impl TaskError {
    pub fn precondition(status: JobStatus, message: impl Into<String>) -> Self {
        Self::Precondition { status, message: message.into() }
    }

    pub fn terminal_status(&self) -> JobStatus {
        match self {
            Self::Canceled => JobStatus::Canceled,
            Self::Sync { .. } => JobStatus::Failed,
            Self::Precondition { status, .. } => *status,
            Self::PostRun(e) => e.status,
            Self::Resource(_)
            | Self::Runner(_)
            | Self::Build(_)
            | Self::Store(_)
            | Self::Internal(_)
            | Self::NotActive { .. }
            | Self::Load { .. } => JobStatus::Error,
        }
    }

    /// User-facing explanation recorded on the job, if any.
    pub fn explanation(&self) -> Option<String> {
        match self {
            Self::Resource(_) | Self::Sync { .. } | Self::Precondition { .. } | Self::Build(_) => {
                Some(self.to_string())
            }
            Self::PostRun(e) => Some(e.message.clone()),
            _ => None,
        }
    }

    /// Diagnostic detail recorded as the job's traceback, if any.
    pub fn traceback(&self) -> Option<String> {
        match self {
            Self::Canceled | Self::Sync { .. } | Self::Precondition { .. } => None,
            Self::PostRun(e) => e.traceback.clone(),
            _ => Some(error_chain(self)),
        }
    }
}

impl From<LockError> for TaskError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Canceled { .. } => Self::Canceled,
            other => Self::Resource(other.to_string()),
        }
    }
}

impl From<StagingError> for TaskError {
    fn from(e: StagingError) -> Self {
        Self::Resource(e.to_string())
    }
}

/// Outcome of a run that did not finish `successful`.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("job {job_id} was canceled")]
    Cancel { job_id: JobId, rc: Option<i32> },
    #[error("job {job_id} finished with status {status}")]
    Error { job_id: JobId, status: JobStatus, rc: Option<i32> },
    /// Raised before the lifecycle could start; nothing was finalized.
    #[error(transparent)]
    Fatal(#[from] TaskError),
}

impl TaskFailure {
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            Self::Cancel { .. } => Some(JobStatus::Canceled),
            Self::Error { status, .. } => Some(*status),
            Self::Fatal(_) => None,
        }
    }
}

/// `error: cause: cause` on one line per level.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
