//! Shared setup for the specs: a task runner over the in-memory store with
//! a scripted runner, rooted in a temp dir.

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use ax_adapters::{FakeNotifyAdapter, FakeRunner, RunnerStatus};
pub use ax_core::{
    ExecutionEnvironment, FakeClock, Host, HostId, Inventory, InventoryId, JobDetails, JobId,
    JobStatus, PlaybookJob, Project, ProjectId, UnifiedJob,
};
pub use ax_engine::{Settings, TaskDeps, TaskFailure, TaskRunner};
pub use ax_storage::MemoryStore;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub struct World {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub runner: FakeRunner,
    pub notifier: FakeNotifyAdapter,
    pub task: TaskRunner<FakeClock>,
}

impl World {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            isolation_base_path: dir.path().join("tmp"),
            projects_root: dir.path().join("projects"),
            playbooks_dir: dir.path().join("playbooks"),
            lock_poll_interval_ms: 10,
            ..Settings::default()
        };
        for path in [&settings.isolation_base_path, &settings.projects_root, &settings.playbooks_dir] {
            std::fs::create_dir_all(path).unwrap();
        }

        let store = Arc::new(MemoryStore::new());
        store.set_default_execution_environment(ExecutionEnvironment::builder().build());
        let runner = FakeRunner::new();
        let notifier = FakeNotifyAdapter::new();
        let deps = TaskDeps::new(store.clone(), Arc::new(runner.clone()), settings)
            .with_notifier(Arc::new(notifier.clone()));
        let task = TaskRunner::new(deps, FakeClock::new(), CancellationToken::new());
        Self { dir, store, runner, notifier, task }
    }

    pub fn settings(&self) -> &Settings {
        &self.task.deps().settings
    }

    pub fn isolation_root(&self) -> &Path {
        &self.settings().isolation_base_path
    }

    /// Private data dirs left behind under the isolation root.
    pub fn private_dirs(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.isolation_root()).unwrap().map(|e| e.unwrap().path()).collect()
    }

    /// A manual project with `site.yml` checked out, and an inventory with one host.
    pub fn manual_project(&self) {
        let project = Project::builder().build();
        let checkout = project.project_path(&self.settings().projects_root);
        std::fs::create_dir_all(&checkout).unwrap();
        std::fs::write(checkout.join("site.yml"), "- hosts: all\n  tasks: []\n").unwrap();
        self.store.insert_project(project);
        self.store.insert_inventory(Inventory::builder().build());
        self.store.insert_host(Host::builder().id(HostId::new(1)).name("web1").build());
    }

    pub fn job(&self, id: u64) -> UnifiedJob {
        self.store.job(JobId::new(id)).unwrap()
    }
}

/// A pending playbook job against inventory 1 and project 1.
pub fn playbook_job(id: u64) -> UnifiedJob {
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
