// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-kind request building.
//!
//! [`TaskRunner`](crate::TaskRunner) owns the lifecycle and calls into a
//! [`JobExecutor`] for everything that differs between job kinds. Each kind
//! overrides only the hooks it needs; the defaults describe a kind that runs
//! in a container with no inventory, passwords or extra vars.

mod ad_hoc;
mod common;
mod inventory_update;
mod job;
mod paths;
mod project_update;
mod system_job;

pub use ad_hoc::AdHocCommandExecutor;
pub use common::{base_passwords, is_answer, BECOME_METHODS};
pub use inventory_update::InventoryUpdateExecutor;
pub use job::PlaybookExecutor;
pub use paths::{merge_search_path, read_ansible_config};
pub use project_update::{clear_project_cache, make_local_copy, ProjectUpdateExecutor};
pub use system_job::SystemJobExecutor;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ax_adapters::Execution;
use ax_core::{Clock, Credential, CredentialId, JobId, JobKind, JobStatus, Project, UnifiedJob};
use ax_storage::{update_model, JobStore, JobUpdate, RetryPolicy, StoreError};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::cancel::CancelWatch;
use crate::config::Settings;
use crate::error::{TaskError, TaskFailure};
use crate::extra_vars::ExtraVars;
use crate::fact_cache::FactCacheRun;
use crate::lock::SourceTreeGuard;
use crate::staging::PrivateDataDir;
use crate::task::TaskDeps;

/// Prompt answers by lookup key.
pub type Passwords = IndexMap<String, String>;

pub type Env = BTreeMap<String, String>;

/// Where the runner reads the command line from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgsFile {
    /// `env/cmdline`, shell-quoted arguments for the runner's own command.
    Cmdline,
    /// `args`, the complete raw command.
    Args,
}

/// Decrypted key material a kind needs on disk.
#[derive(Debug, Clone, Default)]
pub struct PrivateData {
    pub credentials: Vec<(Credential, String)>,
    pub certificates: Vec<(Credential, String)>,
}

/// Private data as written for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivateDataFiles {
    /// Credential id -> runner path of its key file.
    pub credentials: BTreeMap<CredentialId, String>,
    /// Key handed to the runner's ssh-agent instead of a file.
    pub ssh_key: Option<String>,
}

/// Runs a nested job (a project sync) to completion on this worker.
#[async_trait]
pub trait NestedRunner: Send + Sync {
    async fn run_nested(
        &self,
        job_id: JobId,
        parent_private_data_dir: PathBuf,
    ) -> Result<JobStatus, TaskFailure>;
}

/// Values a kind carries from one hook to a later one.
#[derive(Debug, Default)]
pub struct RunState {
    /// Project the run is bound to, when it has one.
    pub project: Option<Project>,
    /// Held by a project update from pre-run until post-run.
    pub source_lock: Option<SourceTreeGuard>,
    pub fact_cache: Option<FactCacheRun>,
    /// Revision reported by the project update playbook.
    pub new_revision: Option<String>,
    /// The runner produced a result.
    pub runner_finished: bool,
}

/// Wall time for hooks; any [`Clock`] qualifies.
pub trait Now: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock> Now for C {
    fn now(&self) -> DateTime<Utc> {
        Clock::now(self)
    }
}

/// Everything a hook may touch for the run in progress.
pub struct RunContext<'a> {
    pub deps: &'a TaskDeps,
    pub job: UnifiedJob,
    pub private_data: &'a PrivateDataDir,
    pub cancel: &'a CancelWatch,
    pub nested: &'a dyn NestedRunner,
    pub clock: &'a dyn Now,
    /// Private data dir of the job this sync runs for.
    pub parent_private_data_dir: Option<PathBuf>,
    pub state: RunState,
}

impl RunContext<'_> {
    pub fn settings(&self) -> &Settings {
        &self.deps.settings
    }

    /// Current time; read at each use, not fixed at the start of the run.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &dyn JobStore {
        self.deps.store.as_ref()
    }

    pub fn store_handle(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.deps.store)
    }

    pub fn retry(&self) -> RetryPolicy {
        self.deps.settings.retry_policy()
    }

    /// Path of `host_path` as the runner sees it.
    pub fn runner_path(&self, host_path: &Path) -> String {
        ax_adapters::PrivateDataWriter::runner_path(self.private_data, host_path)
    }

    /// Persist `update` and adopt the stored job.
    pub async fn update(&mut self, update: JobUpdate) -> Result<(), StoreError> {
        let job = update_model(self.deps.store.as_ref(), self.job.id, &update, self.retry()).await?;
        self.job = job;
        Ok(())
    }

    /// Re-read the job.
    pub async fn reload(&mut self) -> Result<(), StoreError> {
        self.update(JobUpdate::new()).await
    }
}

#[async_trait]
pub trait JobExecutor: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Run inside the execution environment container.
    fn use_container(&self, _job: &UnifiedJob) -> bool {
        true
    }

    /// Bind mounts beyond `isolation_show_paths`.
    fn extra_volume_mounts(&self, _ctx: &RunContext<'_>) -> Vec<String> {
        Vec::new()
    }

    fn args_file(&self) -> ArgsFile {
        ArgsFile::Cmdline
    }

    /// Global timeout for this kind in seconds; 0 disables.
    fn default_timeout(&self, _settings: &Settings) -> u64 {
        0
    }

    async fn pre_run_hook(&self, _ctx: &mut RunContext<'_>) -> Result<(), TaskError> {
        Ok(())
    }

    /// Populate `project/`, the runner's working directory.
    async fn build_project_dir(&self, ctx: &mut RunContext<'_>) -> Result<(), TaskError> {
        ctx.private_data.ensure_project_dir()?;
        Ok(())
    }

    fn build_private_data(&self, _ctx: &RunContext<'_>) -> PrivateData {
        PrivateData::default()
    }

    fn build_passwords(&self, _ctx: &RunContext<'_>, _runtime: &Passwords) -> Result<Passwords, TaskError> {
        Ok(base_passwords())
    }

    /// Prompt regex -> password key.
    fn password_prompts(&self, _passwords: &Passwords) -> IndexMap<String, String> {
        IndexMap::new()
    }

    fn build_extra_vars(&self, _ctx: &RunContext<'_>) -> Result<Option<ExtraVars>, TaskError> {
        Ok(None)
    }

    fn build_args(&self, ctx: &RunContext<'_>, passwords: &Passwords) -> Result<Vec<String>, TaskError>;

    /// Add kind-specific variables to the base environment.
    fn build_env(&self, _ctx: &RunContext<'_>, _files: &PrivateDataFiles, _env: &mut Env) -> Result<(), TaskError> {
        Ok(())
    }

    /// Credentials handed to the injector registry.
    fn build_credentials(&self, ctx: &RunContext<'_>) -> Vec<Credential> {
        ctx.job.credentials.clone()
    }

    /// Runner path of the inventory, if the runner takes one.
    async fn build_inventory(&self, _ctx: &RunContext<'_>) -> Result<Option<String>, TaskError> {
        Ok(None)
    }

    fn build_execution(&self, _ctx: &RunContext<'_>) -> Result<Execution, TaskError> {
        Ok(Execution::Command)
    }

    fn should_use_fact_cache(&self, _job: &UnifiedJob) -> bool {
        false
    }

    /// Runs before the final status write. A [`TaskError::PostRun`]
    /// overrides a successful status; other errors are logged.
    async fn post_run_hook(&self, _ctx: &mut RunContext<'_>, _status: JobStatus) -> Result<(), TaskError> {
        Ok(())
    }

    /// Runs after the final status write. Errors are logged.
    async fn final_run_hook(&self, _ctx: &mut RunContext<'_>, _status: JobStatus) -> Result<(), TaskError> {
        Ok(())
    }
}

/// One executor per kind.
pub fn builtin_executors() -> Vec<Arc<dyn JobExecutor>> {
    vec![
        Arc::new(PlaybookExecutor),
        Arc::new(ProjectUpdateExecutor),
        Arc::new(InventoryUpdateExecutor),
        Arc::new(AdHocCommandExecutor),
        Arc::new(SystemJobExecutor),
    ]
}
