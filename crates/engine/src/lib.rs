// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ax-engine: stages, runs and records one unified job
//!
//! A [`TaskRunner`] claims a job from the [`ax_storage::JobStore`], builds a
//! private data directory and a [`ax_adapters::RunnerRequest`] through the
//! [`JobExecutor`] for its kind, hands the request to the runner adapter, and
//! writes the terminal status back.

pub mod callback;
pub mod cancel;
pub mod config;
pub mod discover;
pub mod env;
pub mod error;
pub mod executor;
pub mod extra_vars;
pub mod fact_cache;
pub mod lock;
pub mod logging;
pub mod request;
pub mod staging;
pub mod sync;
pub mod task;

#[cfg(test)]
mod test_support;

pub use callback::{DelayedUpdate, RunCallback};
pub use cancel::CancelWatch;
pub use config::{JinjaPolicy, Settings, SettingsError};
pub use error::{BuildError, LockError, PostRunError, StagingError, TaskError, TaskFailure};
pub use executor::{
    builtin_executors, AdHocCommandExecutor, InventoryUpdateExecutor, JobExecutor, Passwords,
    PlaybookExecutor, ProjectUpdateExecutor, RunContext, SystemJobExecutor,
};
pub use extra_vars::ExtraVars;
pub use lock::{SourceTreeGuard, SourceTreeLock};
pub use logging::{init_tracing, LogSettings, LoggingError};
pub use staging::PrivateDataDir;
pub use task::{TaskDeps, TaskRunner};
