//! Lifecycle specs
//!
//! A job moves from pending to exactly one terminal status, the runner is
//! invoked at most once, and the private data dir never outlives the run.

use crate::prelude::*;

#[tokio::test]
async fn manual_project_job_succeeds() {
    let world = World::new();
    world.manual_project();
    world.store.insert_job(playbook_job(1));
    world.runner.push_result(RunnerStatus::Successful, 0);

    let status = world.task.run(JobId::new(1)).await.unwrap();

    assert_eq!(status, JobStatus::Successful);
    assert_eq!(world.job(1).status, JobStatus::Successful);
    assert_eq!(world.runner.runs().len(), 1);
    assert!(world.private_dirs().is_empty());
    assert_eq!(world.notifier.statuses(), vec![JobStatus::Running, JobStatus::Successful]);
}

#[tokio::test]
async fn job_without_inventory_fails_before_the_runner() {
    let world = World::new();
    world.manual_project();
    let mut job = playbook_job(2);
    if let JobDetails::Job(details) = &mut job.details {
        details.inventory_id = None;
    }
    world.store.insert_job(job);

    let err = world.task.run(JobId::new(2)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Error { status: JobStatus::Failed, .. }));
    let job = world.job(2);
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.job_explanation.contains("valid inventory"), "{}", job.job_explanation);
    assert!(world.runner.runs().is_empty());
    assert!(world.private_dirs().is_empty());
}

#[tokio::test]
async fn cancel_before_start_cleans_up() {
    let world = World::new();
    world.manual_project();
    world.store.insert_job(playbook_job(3));
    world.store.request_cancel(JobId::new(3)).unwrap();

    let err = world.task.run(JobId::new(3)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Cancel { .. }));
    assert_eq!(world.job(3).status, JobStatus::Canceled);
    assert!(world.runner.runs().is_empty());
    assert!(world.private_dirs().is_empty());
}

#[tokio::test]
async fn finished_job_is_never_run_again() {
    let world = World::new();
    world.manual_project();
    world.store.insert_job(playbook_job(4));
    world.task.run(JobId::new(4)).await.unwrap();

    let err = world.task.run(JobId::new(4)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Fatal(_)));
    assert_eq!(world.runner.runs().len(), 1);
    assert_eq!(world.job(4).status, JobStatus::Successful);
}

#[tokio::test]
async fn runner_crash_still_cleans_up() {
    let world = World::new();
    world.manual_project();
    world.store.insert_job(playbook_job(5));
    world.runner.push_error("runner exploded");

    let err = world.task.run(JobId::new(5)).await.unwrap_err();

    assert!(matches!(err, TaskFailure::Error { status: JobStatus::Error, .. }));
    assert!(world.job(5).result_traceback.contains("runner exploded"));
    assert!(world.private_dirs().is_empty());
}

#[tokio::test]
async fn job_env_is_redacted() {
    let world = World::new();
    world.manual_project();
    world.store.insert_job(playbook_job(6));

    world.task.run(JobId::new(6)).await.unwrap();

    let request = &world.runner.requests()[0];
    let job = world.job(6);
    assert_eq!(job.job_env.get("JOB_ID").map(String::as_str), Some("6"));
    assert_eq!(request.envvars().get("JOB_ID").map(String::as_str), Some("6"));
    assert!(job.job_args.contains("-u root"), "{}", job.job_args);
}
