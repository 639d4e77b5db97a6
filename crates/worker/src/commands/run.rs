// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `axw run`: run jobs from a state snapshot and write the result back.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ax_adapters::RunnerAdapter;
use ax_core::{JobId, SystemClock};
use ax_engine::{Passwords, Settings, TaskDeps, TaskFailure, TaskRunner};
use ax_storage::{load_snapshot, save_snapshot, MemoryStore, Snapshot};
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::output::JobOutcome;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// State snapshot to load jobs from; rewritten when the run ends
    #[arg(long, short = 's', env = "AX_STATE")]
    pub state: PathBuf,

    /// Prompt answer supplied at launch, e.g. `ssh_password=secret`
    #[arg(long = "password", value_name = "KEY=VALUE", value_parser = parse_password)]
    pub passwords: Vec<(String, String)>,

    /// Jobs to run, in order
    #[arg(required = true, value_name = "JOB_ID")]
    pub job_ids: Vec<u64>,
}

fn parse_password(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

/// Run each job to completion. Jobs not yet started when `shutdown` fires
/// are skipped; the snapshot is written either way.
pub async fn run_jobs(
    settings: Settings,
    args: &RunArgs,
    runner: Arc<dyn RunnerAdapter>,
    shutdown: CancellationToken,
) -> Result<Vec<JobOutcome>> {
    let snapshot = load_snapshot(&args.state)
        .with_context(|| format!("failed to load state from {}", args.state.display()))?;
    let mut state = snapshot.state;
    if state.default_execution_environment.is_none() {
        state.default_execution_environment = settings.default_execution_environment.clone();
    }
    let store = Arc::new(MemoryStore::from_state(state));
    let passwords: Passwords = args.passwords.iter().cloned().collect();

    let deps = TaskDeps::new(store.clone(), runner, settings);
    let task = TaskRunner::new(deps, SystemClock, shutdown.clone());

    let mut outcomes = Vec::with_capacity(args.job_ids.len());
    for &id in &args.job_ids {
        let job_id = JobId::new(id);
        if shutdown.is_cancelled() {
            tracing::warn!(%job_id, "shutting down, not starting job");
            continue;
        }
        let outcome = match task.run_job(job_id, &passwords, None).await {
            Ok(status) => JobOutcome::finished(job_id, status),
            Err(TaskFailure::Fatal(e)) => {
                tracing::error!(%job_id, error = %e, "job could not start");
                JobOutcome::fatal(job_id, e.to_string())
            }
            Err(failure) => match failure.job_status() {
                Some(status) => JobOutcome::finished(job_id, status),
                None => JobOutcome::fatal(job_id, failure.to_string()),
            },
        };
        outcomes.push(outcome);
    }

    save_snapshot(&args.state, &Snapshot::new(store.state()))
        .with_context(|| format!("failed to save state to {}", args.state.display()))?;
    Ok(outcomes)
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
