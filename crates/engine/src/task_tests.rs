// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::Harness;
use ax_adapters::{RunnerEvent, ScheduleRequest, HIDDEN_PASSWORD};
use ax_core::{
    Inventory, InventoryId, JobDetails, LaunchType, PlaybookJob, Project, ProjectId, ScmType,
    SystemJobDetails,
};
use std::path::Path;
use std::process::Command;
use serde_json::json;

fn system_job(id: u64) -> UnifiedJob {
    UnifiedJob::builder()
        .id(JobId::new(id))
        .details(JobDetails::SystemJob(SystemJobDetails { job_type: "cleanup_tokens".into() }))
        .build()
}

fn playbook_job(id: u64) -> UnifiedJob {
    UnifiedJob::builder()
        .id(JobId::new(id))
        .details(JobDetails::Job(PlaybookJob {
            inventory_id: Some(InventoryId::new(1)),
            project_id: Some(ProjectId::new(1)),
            playbook: "site.yml".into(),
            ..PlaybookJob::default()
        }))
        .build()
}

fn isolation_entries(harness: &Harness) -> usize {
    fs::read_dir(&harness.settings().isolation_base_path).unwrap().count()
}

#[tokio::test]
async fn successful_run_records_the_outcome() {
    let harness = Harness::new();
    harness.store.insert_job(system_job(1));

    let status = harness.task.run(JobId::new(1)).await.unwrap();

    assert_eq!(status, JobStatus::Successful);
    let job = harness.store.job(JobId::new(1)).unwrap();
    assert_eq!(job.status, JobStatus::Successful);
    assert!(job.execution_environment.is_some());
    assert_eq!(job.job_args, "awx-manage cleanup_tokens");
    assert!(harness.store.has_event_partition(JobId::new(1)));
    assert_eq!(harness.notifier.statuses(), vec![JobStatus::Running, JobStatus::Successful]);
    assert_eq!(harness.notifier.triggers(), vec![NotificationTrigger::Running, NotificationTrigger::Succeeded]);
    assert_eq!(isolation_entries(&harness), 0);
}

#[tokio::test]
async fn cancel_flag_before_start_skips_the_run() {
    let harness = Harness::new();
    let mut job = system_job(2);
    job.cancel_flag = true;
    job.start_args = "secret".into();
    harness.store.insert_job(job);

    let err = harness.task.run(JobId::new(2)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Cancel { rc: None, .. }));
    let job = harness.store.job(JobId::new(2)).unwrap();
    assert_eq!(job.status, JobStatus::Canceled);
    assert!(job.start_args.is_empty());
    assert!(harness.runner.runs().is_empty());
    assert!(harness.notifier.triggers().is_empty());
}

#[tokio::test]
async fn inactive_job_is_fatal() {
    let harness = Harness::new();
    harness.store.insert_job(UnifiedJob { status: JobStatus::Successful, ..system_job(3) });

    let err = harness.task.run(JobId::new(3)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Fatal(TaskError::NotActive { .. })));
    assert!(harness.runner.runs().is_empty());
}

#[tokio::test]
async fn missing_job_is_fatal() {
    let harness = Harness::new();
    let err = harness.task.run(JobId::new(99)).await.unwrap_err();
    assert!(matches!(err, TaskFailure::Fatal(TaskError::Load { .. })));
}

#[tokio::test]
async fn runner_timeout_fails_the_job() {
    let harness = Harness::new();
    harness.store.insert_job(system_job(4));
    harness.runner.push_result(RunnerStatus::Timeout, 254);

    let err = harness.task.run(JobId::new(4)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Error { status: JobStatus::Failed, rc: Some(254), .. }));
    let job = harness.store.job(JobId::new(4)).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.job_explanation, "Job terminated due to timeout");
    assert_eq!(harness.notifier.triggers(), vec![NotificationTrigger::Running, NotificationTrigger::Failed]);
}

#[tokio::test]
async fn runner_error_status_errors_the_job() {
    let harness = Harness::new();
    harness.store.insert_job(system_job(5));
    harness.runner.push_result(RunnerStatus::Error, 1);

    harness.task.run(JobId::new(5)).await.unwrap_err();

    let job = harness.store.job(JobId::new(5)).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.job_explanation, "Job terminated due to error");
}

#[tokio::test]
async fn runner_failure_is_an_error_with_traceback() {
    let harness = Harness::new();
    harness.store.insert_job(system_job(6));
    harness.runner.push_error("exec format error");

    let err = harness.task.run(JobId::new(6)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Error { status: JobStatus::Error, rc: None, .. }));
    let job = harness.store.job(JobId::new(6)).unwrap();
    assert!(job.result_traceback.contains("exec format error"));
    assert_eq!(isolation_entries(&harness), 0);
}

#[tokio::test]
async fn operator_cancel_during_run_cancels() {
    let harness = Harness::new();
    harness.store.insert_job(system_job(7));
    let store = harness.store.clone();
    harness.runner.on_run(move |request| {
        store.request_cancel(request.ident()).unwrap();
    });

    let err = harness.task.run(JobId::new(7)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Cancel { rc: Some(-1), .. }));
    assert_eq!(harness.store.job(JobId::new(7)).unwrap().status, JobStatus::Canceled);
}

#[tokio::test]
async fn shutdown_signal_during_run_fails() {
    let harness = Harness::new();
    harness.store.insert_job(system_job(8));
    let shutdown = harness.shutdown.clone();
    harness.runner.on_run(move |_| shutdown.cancel());

    harness.task.run(JobId::new(8)).await.unwrap_err();

    let job = harness.store.job(JobId::new(8)).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.job_explanation, "Task was canceled due to receiving a shutdown signal.");
}

#[tokio::test]
async fn handed_off_run_leaves_the_job_running() {
    let harness = Harness::new();
    harness.store.insert_job(system_job(9));
    harness.runner.push_handoff();

    let status = harness.task.run(JobId::new(9)).await.unwrap();

    assert_eq!(status, JobStatus::Running);
    assert_eq!(harness.store.job(JobId::new(9)).unwrap().status, JobStatus::Running);
    assert_eq!(harness.notifier.triggers(), vec![NotificationTrigger::Running]);
}

#[tokio::test]
async fn failed_precondition_explains_itself() {
    let harness = Harness::new();
    harness.store.insert_job(playbook_job(10));

    let err = harness.task.run(JobId::new(10)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Error { status: JobStatus::Failed, .. }));
    let job = harness.store.job(JobId::new(10)).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.job_explanation.starts_with("Job could not start"));
    assert!(harness.runner.runs().is_empty());
}

#[tokio::test]
async fn playbook_against_a_manual_project() {
    let harness = Harness::with_settings(|s| {
        s.task_env.insert("DB_PASSWORD".into(), "hunter2".into());
    });
    let project = Project::builder().scm_revision("abc").build();
    let checkout = project.project_path(harness.projects_root());
    fs::create_dir_all(&checkout).unwrap();
    fs::write(checkout.join("site.yml"), "- hosts: all\n").unwrap();
    harness.store.insert_project(project);
    harness.store.insert_inventory(Inventory::builder().build());
    harness.store.insert_job(playbook_job(11));
    let copied = Arc::new(parking_lot::Mutex::new(false));
    let seen = Arc::clone(&copied);
    harness.runner.on_run(move |request| {
        *seen.lock() = request.project_dir().join("site.yml").is_file();
    });

    harness.task.run(JobId::new(11)).await.unwrap();

    assert!(*copied.lock());
    let request = &harness.runner.requests()[0];
    assert_eq!(request.playbook(), Some("site.yml"));
    assert!(request.suppress_env_files());
    let job = harness.store.job(JobId::new(11)).unwrap();
    assert_eq!(job.scm_revision, "abc");
    assert_eq!(job.job_env["DB_PASSWORD"], HIDDEN_PASSWORD);
    assert_eq!(job.job_env["JOB_ID"], "11");
    assert_eq!(job.job_cwd, "/runner/project");
    assert_eq!(harness.scheduler.calls(), vec![ScheduleRequest::InventoryComputedFields(InventoryId::new(1))]);
}

#[tokio::test]
async fn runner_metadata_is_saved() {
    let harness = Harness::new();
    harness.store.insert_job(system_job(12));
    harness.runner.on_run(|request| {
        let artifacts = request.artifact_dir();
        fs::create_dir_all(&artifacts).unwrap();
        fs::write(artifacts.join("collections.json"), r#"{"community.general": "8.0.0"}"#).unwrap();
        fs::write(artifacts.join("ansible_version.txt"), "2.16.3\n").unwrap();
    });

    harness.task.run(JobId::new(12)).await.unwrap();

    let job = harness.store.job(JobId::new(12)).unwrap();
    assert_eq!(job.installed_collections, Some(json!({"community.general": "8.0.0"})));
    assert_eq!(job.ansible_version, "2.16.3");
}

#[tokio::test]
async fn finished_jobs_wake_the_schedulers() {
    let harness = Harness::new();
    harness.store.insert_job(UnifiedJob {
        has_blocked_dependents: true,
        spawned_by_workflow: true,
        ..system_job(13)
    });

    harness.task.run(JobId::new(13)).await.unwrap();

    assert_eq!(harness.scheduler.calls(), vec![ScheduleRequest::TaskManager, ScheduleRequest::WorkflowManager]);
}

#[tokio::test]
async fn dispatched_wrapup_defers_notifications() {
    let harness = Harness::new();
    harness.events.dispatch_wrapup(true);
    harness.store.insert_job(system_job(14));
    harness.runner.emit_events(vec![RunnerEvent::verbose(1, "ok")]);

    harness.task.run(JobId::new(14)).await.unwrap();

    assert_eq!(harness.notifier.triggers(), vec![NotificationTrigger::Running]);
    assert_eq!(harness.events.events().len(), 1);
    assert_eq!(harness.events.finished(), vec![(JobId::new(14), 1)]);
}

#[tokio::test]
async fn notification_failures_do_not_change_the_outcome() {
    let harness = Harness::new();
    harness.notifier.fail_sends();
    harness.store.insert_job(system_job(15));

    assert_eq!(harness.task.run(JobId::new(15)).await.unwrap(), JobStatus::Successful);
}

#[tokio::test]
async fn start_templates_fire_before_staging() {
    let harness = Harness::new();
    harness.store.insert_job(system_job(16));
    fs::remove_dir_all(&harness.settings().isolation_base_path).unwrap();

    harness.task.run(JobId::new(16)).await.unwrap_err();

    assert_eq!(harness.store.job(JobId::new(16)).unwrap().status, JobStatus::Error);
    assert_eq!(harness.notifier.triggers(), vec![NotificationTrigger::Running, NotificationTrigger::Failed]);
    assert!(harness.runner.runs().is_empty());
}

fn git(dir: &Path, script: &str) -> String {
    let out = Command::new("sh")
        .args(["-c", script])
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "t")
        .env("GIT_AUTHOR_EMAIL", "t@example.com")
        .env("GIT_COMMITTER_NAME", "t")
        .env("GIT_COMMITTER_EMAIL", "t@example.com")
        .output()
        .unwrap();
    assert!(out.status.success(), "script failed: {script}");
    String::from_utf8(out.stdout).unwrap().trim().to_string()
}

/// Git project whose checkout sits on `main` with a `feature` branch beside
/// it. The stored revision is unset, so every job syncs first.
fn git_project(harness: &Harness) -> Project {
    let project = Project::builder()
        .scm_type(ScmType::Git)
        .scm_url("https://example.com/repo.git")
        .scm_branch("main")
        .allow_override(true)
        .build();
    let checkout = project.project_path(harness.projects_root());
    fs::create_dir_all(&checkout).unwrap();
    git(
        &checkout,
        "git init -q . && git checkout -q -b main && printf -- '- hosts: all\\n' > site.yml \
         && git add site.yml && git commit -qm init && git branch feature",
    );
    harness.store.insert_project(project.clone());
    harness.store.insert_inventory(Inventory::builder().build());
    project
}

#[tokio::test]
async fn project_sync_runs_before_the_playbook() {
    let harness = Harness::new();
    git_project(&harness);
    harness.store.insert_job(playbook_job(11));
    let copied = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = Arc::clone(&copied);
    harness.runner.on_run(move |request| {
        let project = request.project_dir();
        seen.lock().push((project.join("site.yml").is_file(), project.join(".git").exists()));
    });

    let status = harness.task.run(JobId::new(11)).await.unwrap();

    assert_eq!(status, JobStatus::Successful);
    let playbooks: Vec<_> = harness.runner.requests().iter().map(|r| r.playbook().map(str::to_string)).collect();
    assert_eq!(playbooks, vec![Some("project_update.yml".to_string()), Some("site.yml".to_string())]);
    assert_eq!(copied.lock()[1], (true, false));

    let job = harness.store.job(JobId::new(11)).unwrap();
    assert_eq!(job.as_job().unwrap().project_update_id, Some(JobId::new(12)));
    let sync = harness.store.job(JobId::new(12)).unwrap();
    assert_eq!(sync.status, JobStatus::Successful);
    assert_eq!(sync.launch_type, LaunchType::Sync);
    assert_eq!(sync.as_project_update().unwrap().job_tags, "update_git,install_roles,install_collections");
    assert_eq!(isolation_entries(&harness), 0);
}

#[tokio::test]
async fn failed_project_sync_fails_the_job() {
    let harness = Harness::new();
    git_project(&harness);
    harness.store.insert_job(playbook_job(11));
    harness.runner.push_result(RunnerStatus::Failed, 2);

    let err = harness.task.run(JobId::new(11)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Error { status: JobStatus::Failed, .. }));
    assert_eq!(harness.runner.runs().len(), 1);
    assert_eq!(harness.store.job(JobId::new(12)).unwrap().status, JobStatus::Failed);
    let job = harness.store.job(JobId::new(11)).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.job_explanation,
        r#"Previous Task Failed: {"job_type": "project_update", "job_name": "demo-project", "job_id": "12"}"#
    );
    assert_eq!(isolation_entries(&harness), 0);
}

#[tokio::test]
async fn branch_override_restores_the_checkout() {
    let harness = Harness::new();
    let project = git_project(&harness);
    let checkout = project.project_path(harness.projects_root());
    let mut job = playbook_job(11);
    if let JobDetails::Job(details) = &mut job.details {
        details.scm_branch = "feature".into();
    }
    harness.store.insert_job(job);
    let moved_to = Arc::new(parking_lot::Mutex::new(String::new()));
    let seen = Arc::clone(&moved_to);
    let sync_checkout = checkout.clone();
    harness.runner.on_run(move |request| {
        if request.playbook() == Some("project_update.yml") {
            *seen.lock() = git(&sync_checkout, "git checkout -q feature && git symbolic-ref --short HEAD");
        }
    });

    harness.task.run(JobId::new(11)).await.unwrap();

    assert_eq!(*moved_to.lock(), "feature");
    assert_eq!(git(&checkout, "git symbolic-ref --short HEAD"), "main");
    assert_eq!(harness.store.job(JobId::new(12)).unwrap().as_project_update().unwrap().scm_branch, "feature");
}
