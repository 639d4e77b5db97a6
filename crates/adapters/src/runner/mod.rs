// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner adapters: execute a [`RunnerRequest`] and report its outcome.
//!
//! The engine never spawns ansible itself. It hands a fully resolved request
//! to a [`RunnerAdapter`] together with an event sink and a cancellation
//! check, and interprets the [`RunnerResult`] that comes back. A `None`
//! result means the work was handed off and will finish elsewhere.

mod container;
mod process;
mod request;

pub use container::{ContainerRunner, CONTAINER_RUNNER_ROOT};
pub use process::ProcessRunner;
pub use request::{
    ContainerAuth, ContainerParams, Execution, RunnerRequest, RunnerRequestBuilder, RunnerSettings,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid password prompt pattern {pattern:?}: {message}")]
    Prompt { pattern: String, message: String },
    #[error("registry login to {host} failed: {message}")]
    RegistryLogin { host: String, message: String },
    #[error("empty command line")]
    EmptyCommand,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

ax_core::str_enum! {
    /// Terminal status reported by a runner.
    pub enum RunnerStatus {
        Successful => "successful",
        Failed => "failed",
        Error => "error",
        Canceled => "canceled",
        Timeout => "timeout",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunnerResult {
    pub status: RunnerStatus,
    pub rc: i32,
}

impl RunnerResult {
    pub fn new(status: RunnerStatus, rc: i32) -> Self {
        Self { status, rc }
    }

    pub fn successful() -> Self {
        Self::new(RunnerStatus::Successful, 0)
    }
}

/// One event emitted while the runner executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerEvent {
    #[serde(default)]
    pub counter: u64,
    pub event: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub event_data: Value,
}

impl RunnerEvent {
    /// Plain output line with no structured payload.
    pub fn verbose(counter: u64, stdout: impl Into<String>) -> Self {
        Self { counter, event: "verbose".to_string(), stdout: stdout.into(), event_data: Value::Null }
    }
}

/// Out-of-band callbacks fired while a run is in progress.
pub trait RunnerEvents: Send + Sync {
    fn on_event(&self, event: &RunnerEvent);

    /// Runner status transitions (`starting`, `running`, then the final status).
    fn on_status(&self, status: &str);

    fn on_finished(&self, result: &RunnerResult);
}

/// Callbacks that ignore everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRunnerEvents;

impl RunnerEvents for NoopRunnerEvents {
    fn on_event(&self, _event: &RunnerEvent) {}
    fn on_status(&self, _status: &str) {}
    fn on_finished(&self, _result: &RunnerResult) {}
}

/// Externally queryable cancellation predicate, polled by the runner.
#[async_trait]
pub trait CancelCheck: Send + Sync {
    async fn is_canceled(&self) -> bool;
}

/// A check that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

#[async_trait]
impl CancelCheck for NeverCancel {
    async fn is_canceled(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait RunnerAdapter: Send + Sync {
    /// Execute `request`. `Ok(None)` means the run was handed off and this
    /// call produced no result.
    async fn run(
        &self,
        request: &RunnerRequest,
        events: &dyn RunnerEvents,
        cancel: &dyn CancelCheck,
    ) -> Result<Option<RunnerResult>, RunnerError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRunner, RecordedRun};

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
