// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use std::path::Path;
use std::sync::Arc;

use ax_adapters::{FakeEventSink, FakeNotifyAdapter, FakeRunner, FakeScheduler};
use ax_core::{ExecutionEnvironment, FakeClock, UnifiedJob};
use ax_storage::MemoryStore;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::cancel::CancelWatch;
use crate::config::Settings;
use crate::executor::{RunContext, RunState};
use crate::staging::PrivateDataDir;
use crate::task::{TaskDeps, TaskRunner};

/// A task runner wired to fakes, rooted in a temp dir.
pub(crate) struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub runner: FakeRunner,
    pub notifier: FakeNotifyAdapter,
    pub scheduler: FakeScheduler,
    pub events: FakeEventSink,
    pub shutdown: CancellationToken,
    pub clock: FakeClock,
    pub task: TaskRunner<FakeClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(configure: impl FnOnce(&mut Settings)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings {
            isolation_base_path: dir.path().join("tmp"),
            projects_root: dir.path().join("projects"),
            playbooks_dir: dir.path().join("playbooks"),
            lock_poll_interval_ms: 10,
            ..Settings::default()
        };
        configure(&mut settings);
        for path in [&settings.isolation_base_path, &settings.projects_root, &settings.playbooks_dir] {
            std::fs::create_dir_all(path).unwrap();
        }
        std::fs::write(settings.playbooks_dir.join("project_update.yml"), "- hosts: localhost\n").unwrap();

        let store = Arc::new(MemoryStore::new());
        store.set_default_execution_environment(ExecutionEnvironment::builder().build());
        let runner = FakeRunner::new();
        let notifier = FakeNotifyAdapter::new();
        let scheduler = FakeScheduler::new();
        let events = FakeEventSink::new();
        let shutdown = CancellationToken::new();
        let deps = TaskDeps::new(store.clone(), Arc::new(runner.clone()), settings)
            .with_notifier(Arc::new(notifier.clone()))
            .with_scheduler(Arc::new(scheduler.clone()))
            .with_events(Arc::new(events.clone()));
        let clock = FakeClock::new();
        let task = TaskRunner::new(deps, clock.clone(), shutdown.clone());
        Self { dir, store, runner, notifier, scheduler, events, shutdown, clock, task }
    }

    pub fn settings(&self) -> &Settings {
        &self.task.deps().settings
    }

    pub fn projects_root(&self) -> &Path {
        &self.settings().projects_root
    }

    /// Private data dir and cancel watch for driving hooks directly.
    pub fn stage(&self, job: &UnifiedJob) -> Staged {
        Staged {
            private_data: PrivateDataDir::create(self.settings(), job.id).unwrap(),
            cancel: CancelWatch::new(self.store.clone(), job.id, self.shutdown.clone()),
        }
    }

    pub fn context<'a>(&'a self, staged: &'a Staged, job: UnifiedJob) -> RunContext<'a> {
        RunContext {
            deps: self.task.deps(),
            job,
            private_data: &staged.private_data,
            cancel: &staged.cancel,
            nested: &self.task,
            clock: &self.clock,
            parent_private_data_dir: None,
            state: RunState::default(),
        }
    }
}

pub(crate) struct Staged {
    pub private_data: PrivateDataDir,
    pub cancel: CancelWatch,
}
