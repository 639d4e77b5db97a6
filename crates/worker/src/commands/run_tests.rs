// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ax_adapters::{FakeRunner, RunnerStatus};
use ax_core::{ExecutionEnvironment, JobDetails, JobStatus, SystemJobDetails, UnifiedJob};
use ax_storage::StoreState;
use tempfile::TempDir;
use yare::parameterized;

struct Fixture {
    dir: TempDir,
    args: RunArgs,
}

impl Fixture {
    fn new(job_ids: &[u64]) -> Self {
        let dir = TempDir::new().unwrap();
        let mut state = StoreState::default();
        for &id in &[1, 2] {
            let job = UnifiedJob::builder()
                .id(JobId::new(id))
                .details(JobDetails::SystemJob(SystemJobDetails { job_type: "cleanup_sessions".into() }))
                .build();
            state.jobs.insert(job.id, job);
        }
        let path = dir.path().join("state.json");
        save_snapshot(&path, &Snapshot::new(state)).unwrap();
        let args = RunArgs { state: path, passwords: Vec::new(), job_ids: job_ids.to_vec() };
        Self { dir, args }
    }

    fn settings(&self) -> Settings {
        let isolation = self.dir.path().join("tmp");
        std::fs::create_dir_all(&isolation).unwrap();
        Settings {
            isolation_base_path: isolation,
            default_execution_environment: Some(ExecutionEnvironment::builder().build()),
            ..Settings::default()
        }
    }

    fn saved_status(&self, id: u64) -> JobStatus {
        load_snapshot(&self.args.state).unwrap().state.jobs[&JobId::new(id)].status
    }
}

#[tokio::test]
async fn runs_jobs_and_saves_the_snapshot() {
    let fixture = Fixture::new(&[1, 2]);
    let runner = FakeRunner::new();
    runner.push_result(RunnerStatus::Successful, 0).push_result(RunnerStatus::Failed, 2);

    let outcomes =
        run_jobs(fixture.settings(), &fixture.args, Arc::new(runner.clone()), CancellationToken::new()).await.unwrap();

    assert_eq!(
        outcomes,
        vec![
            JobOutcome::finished(JobId::new(1), JobStatus::Successful),
            JobOutcome::finished(JobId::new(2), JobStatus::Failed),
        ]
    );
    assert_eq!(fixture.saved_status(1), JobStatus::Successful);
    assert_eq!(fixture.saved_status(2), JobStatus::Failed);
    assert_eq!(runner.requests()[0].args(), ["awx-manage", "cleanup_sessions"]);
}

#[tokio::test]
async fn unknown_job_is_reported_not_raised() {
    let fixture = Fixture::new(&[9]);

    let outcomes =
        run_jobs(fixture.settings(), &fixture.args, Arc::new(FakeRunner::new()), CancellationToken::new()).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, None);
    assert!(outcomes[0].error.is_some());
}

#[tokio::test]
async fn shutdown_skips_jobs_not_yet_started() {
    let fixture = Fixture::new(&[1, 2]);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let outcomes = run_jobs(fixture.settings(), &fixture.args, Arc::new(FakeRunner::new()), shutdown).await.unwrap();

    assert!(outcomes.is_empty());
    assert_eq!(fixture.saved_status(1), JobStatus::Pending);
}

#[tokio::test]
async fn missing_snapshot_is_an_error() {
    let mut fixture = Fixture::new(&[1]);
    fixture.args.state = fixture.dir.path().join("absent.json");

    let err = run_jobs(fixture.settings(), &fixture.args, Arc::new(FakeRunner::new()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("failed to load state from"));
}

#[parameterized(
    plain = { "ssh_password=hunter2", Some(("ssh_password", "hunter2")) },
    equals_in_value = { "vault_password.prod=a=b", Some(("vault_password.prod", "a=b")) },
    empty_value = { "become_password=", Some(("become_password", "")) },
    no_separator = { "ssh_password", None },
    empty_key = { "=x", None },
)]
fn password_flags(raw: &str, expected: Option<(&str, &str)>) {
    let parsed = parse_password(raw).ok();
    assert_eq!(parsed.as_ref().map(|(k, v)| (k.as_str(), v.as_str())), expected);
}
