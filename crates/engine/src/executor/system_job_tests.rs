// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::Harness;
use ax_core::{JobDetails, JobId, SystemJobDetails};
use serde_json::json;
use serial_test::serial;

fn system_job(command: &str, vars: Value) -> UnifiedJob {
    UnifiedJob::builder()
        .id(JobId::new(30))
        .extra_vars(vars.as_object().cloned().unwrap_or_default())
        .details(JobDetails::SystemJob(SystemJobDetails { job_type: command.into() }))
        .build()
}

#[test]
fn cleanup_jobs_prunes_every_model() {
    let job = system_job("cleanup_jobs", json!({"days": 30, "batch_size": "500", "dry_run": true}));

    let args = manage_args(&job).unwrap();

    assert_eq!(
        args,
        vec![
            "awx-manage",
            "cleanup_jobs",
            "--days",
            "30",
            "--batch-size",
            "500",
            "--dry-run",
            "--jobs",
            "--project-updates",
            "--inventory-updates",
            "--management-jobs",
            "--ad-hoc-commands",
            "--workflow-jobs",
            "--notifications",
        ]
    );
}

#[test]
fn activity_stream_cleanup_takes_only_retention() {
    let job = system_job("cleanup_activitystream", json!({"days": 7, "dry_run": false}));
    assert_eq!(manage_args(&job).unwrap(), vec!["awx-manage", "cleanup_activitystream", "--days", "7"]);
}

#[test]
fn other_commands_ignore_vars() {
    let job = system_job("cleanup_sessions", json!({"days": 7}));
    assert_eq!(manage_args(&job).unwrap(), vec!["awx-manage", "cleanup_sessions"]);
}

#[test]
fn runs_outside_the_container() {
    let job = system_job("cleanup_tokens", json!({}));
    assert!(!SystemJobExecutor.use_container(&job));
    assert_eq!(SystemJobExecutor.args_file(), ArgsFile::Args);
}

#[tokio::test]
#[serial]
async fn env_layers_base_over_process() {
    std::env::set_var("AX_SYSTEM_JOB_MARKER", "process");
    std::env::set_var("AX_SYSTEM_JOB_SHARED", "process");
    let harness = Harness::new();
    let job = system_job("cleanup_tokens", json!({}));
    let staged = harness.stage(&job);
    let ctx = harness.context(&staged, job);

    let mut env: Env = [("AX_SYSTEM_JOB_SHARED".to_string(), "base".to_string())].into_iter().collect();
    SystemJobExecutor.build_env(&ctx, &PrivateDataFiles::default(), &mut env).unwrap();

    std::env::remove_var("AX_SYSTEM_JOB_MARKER");
    std::env::remove_var("AX_SYSTEM_JOB_SHARED");
    assert_eq!(env["AX_SYSTEM_JOB_MARKER"], "process");
    assert_eq!(env["AX_SYSTEM_JOB_SHARED"], "base");
}
