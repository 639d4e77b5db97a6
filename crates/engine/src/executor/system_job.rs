// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Management commands, run as local processes.

use async_trait::async_trait;
use ax_core::{JobKind, UnifiedJob};
use serde_json::Value;

use crate::error::TaskError;
use crate::executor::{ArgsFile, Env, JobExecutor, Passwords, PrivateDataFiles, RunContext};

const MANAGE_COMMAND: &str = "awx-manage";

/// Models `cleanup_jobs` prunes.
const CLEANUP_JOBS_FLAGS: [&str; 7] = [
    "--jobs",
    "--project-updates",
    "--inventory-updates",
    "--management-jobs",
    "--ad-hoc-commands",
    "--workflow-jobs",
    "--notifications",
];

pub struct SystemJobExecutor;

fn arg_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `awx-manage <command>` and the options its extra vars ask for.
pub fn manage_args(job: &UnifiedJob) -> Result<Vec<String>, TaskError> {
    let command = job
        .as_system_job()
        .map(|d| d.job_type.clone())
        .ok_or_else(|| TaskError::Internal(format!("{} is not a system job", job.log_format())))?;
    let vars = &job.extra_vars;

    let mut args = vec![MANAGE_COMMAND.to_string(), command.clone()];
    if matches!(command.as_str(), "cleanup_jobs" | "cleanup_activitystream") {
        if let Some(days) = vars.get("days") {
            args.extend(["--days".to_string(), arg_value(days)]);
        }
        if let Some(batch) = vars.get("batch_size") {
            args.extend(["--batch-size".to_string(), arg_value(batch)]);
        }
        let dry_run = vars.get("dry_run").is_some_and(|v| match v {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => true,
        });
        if dry_run {
            args.push("--dry-run".to_string());
        }
    }
    if command == "cleanup_jobs" {
        args.extend(CLEANUP_JOBS_FLAGS.iter().map(|f| f.to_string()));
    }
    Ok(args)
}

#[async_trait]
impl JobExecutor for SystemJobExecutor {
    fn kind(&self) -> JobKind {
        JobKind::SystemJob
    }

    fn use_container(&self, _job: &UnifiedJob) -> bool {
        false
    }

    fn args_file(&self) -> ArgsFile {
        ArgsFile::Args
    }

    fn build_args(&self, ctx: &RunContext<'_>, _passwords: &Passwords) -> Result<Vec<String>, TaskError> {
        manage_args(&ctx.job)
    }

    /// The worker's own environment, overlaid with the base environment.
    fn build_env(&self, _ctx: &RunContext<'_>, _files: &PrivateDataFiles, env: &mut Env) -> Result<(), TaskError> {
        let base = std::mem::take(env);
        env.extend(std::env::vars());
        env.extend(base);
        Ok(())
    }
}

#[cfg(test)]
#[path = "system_job_tests.rs"]
mod tests;
