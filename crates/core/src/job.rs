// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job-like entities.
//!
//! A [`UnifiedJob`] carries the fields every kind shares; the per-kind
//! fields live in [`JobDetails`]. The task engine dispatches on
//! [`JobKind`], never on the concrete details type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::credential::{Credential, CredentialCategory};
use crate::environment::ExecutionEnvironment;
use crate::id::{InventoryId, InventorySourceId, JobId, OrganizationId, ProjectId};
use crate::project::ScmType;
use crate::status::JobStatus;

crate::str_enum! {
    /// Kind of job-like entity.
    pub enum JobKind {
        Job => "job",
        ProjectUpdate => "project_update",
        InventoryUpdate => "inventory_update",
        AdHocCommand => "ad_hoc_command",
        SystemJob => "system_job",
    }
}

crate::str_enum! {
    pub enum JobType {
        Run => "run",
        Check => "check",
        Scan => "scan",
    }
}

crate::str_enum! {
    pub enum LaunchType {
        Manual => "manual",
        Relaunch => "relaunch",
        Callback => "callback",
        Scheduled => "scheduled",
        Dependency => "dependency",
        Workflow => "workflow",
        Webhook => "webhook",
        Sync => "sync",
        Scm => "scm",
    }
}

impl Default for JobType {
    fn default() -> Self {
        Self::Run
    }
}

impl Default for LaunchType {
    fn default() -> Self {
        Self::Manual
    }
}

/// Fields of a playbook run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookJob {
    pub job_type: JobType,
    pub inventory_id: Option<InventoryId>,
    pub project_id: Option<ProjectId>,
    pub playbook: String,
    /// Branch override; empty means the project's branch.
    pub scm_branch: String,
    pub forks: u32,
    pub job_tags: String,
    pub skip_tags: String,
    pub start_at_task: String,
    pub become_enabled: bool,
    pub diff_mode: bool,
    pub force_handlers: bool,
    pub use_fact_cache: bool,
    pub job_slice_number: u32,
    pub job_slice_count: u32,
    /// Sync spawned to refresh the checkout for this run.
    pub project_update_id: Option<JobId>,
}

/// Fields of a project update. SCM settings are copied from the project at launch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectUpdateDetails {
    pub project_id: ProjectId,
    pub job_type: JobType,
    /// Comma separated sync actions, e.g. `update_git,install_roles`.
    pub job_tags: String,
    pub scm_type: Option<ScmType>,
    pub scm_url: String,
    pub scm_branch: String,
    pub scm_refspec: String,
    pub scm_clean: bool,
    pub scm_track_submodules: bool,
    pub scm_delete_on_update: bool,
}

impl ProjectUpdateDetails {
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.job_tags.split(',').map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn has_tag_prefix(&self, prefix: &str) -> bool {
        self.tags().any(|t| t.starts_with(prefix))
    }
}

/// Fields of an inventory update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryUpdateDetails {
    pub inventory_id: Option<InventoryId>,
    pub inventory_source_id: InventorySourceId,
    /// Source plugin name: `scm`, `constructed`, `ec2`, `gce`, ...
    pub source: String,
    pub source_path: String,
    pub source_vars: Map<String, Value>,
    pub source_project_id: Option<ProjectId>,
    pub source_project_update_id: Option<JobId>,
    pub scm_branch: String,
    pub enabled_var: String,
    pub enabled_value: String,
    pub host_filter: String,
    pub overwrite: bool,
    pub overwrite_vars: bool,
}

/// Fields of an ad hoc command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdHocCommandDetails {
    pub job_type: JobType,
    pub inventory_id: Option<InventoryId>,
    pub module_name: String,
    pub module_args: String,
    pub forks: u32,
    pub become_enabled: bool,
    pub diff_mode: bool,
}

/// Fields of a management system job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemJobDetails {
    /// Management command, e.g. `cleanup_jobs`.
    pub job_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobDetails {
    Job(PlaybookJob),
    ProjectUpdate(ProjectUpdateDetails),
    InventoryUpdate(InventoryUpdateDetails),
    AdHocCommand(AdHocCommandDetails),
    SystemJob(SystemJobDetails),
}

impl JobDetails {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Job(_) => JobKind::Job,
            Self::ProjectUpdate(_) => JobKind::ProjectUpdate,
            Self::InventoryUpdate(_) => JobKind::InventoryUpdate,
            Self::AdHocCommand(_) => JobKind::AdHocCommand,
            Self::SystemJob(_) => JobKind::SystemJob,
        }
    }
}

macro_rules! details_from {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for JobDetails {
                fn from(d: $ty) -> Self {
                    Self::$variant(d)
                }
            }
        )+
    };
}

details_from! {
    Job(PlaybookJob),
    ProjectUpdate(ProjectUpdateDetails),
    InventoryUpdate(InventoryUpdateDetails),
    AdHocCommand(AdHocCommandDetails),
    SystemJob(SystemJobDetails),
}

/// A job-like entity as loaded from persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedJob {
    pub id: JobId,
    pub name: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub cancel_flag: bool,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default)]
    pub launch_type: LaunchType,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
    #[serde(default)]
    pub execution_environment: Option<ExecutionEnvironment>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub instance_group: Option<String>,
    #[serde(default)]
    pub execution_node: String,
    #[serde(default)]
    pub controller_node: String,
    #[serde(default)]
    pub job_explanation: String,
    #[serde(default)]
    pub result_traceback: String,
    /// Launch-time arguments; may hold unencrypted passwords until cleared.
    #[serde(default)]
    pub start_args: String,
    /// Redacted environment of the last run.
    #[serde(default)]
    pub job_env: BTreeMap<String, String>,
    #[serde(default)]
    pub job_args: String,
    #[serde(default)]
    pub job_cwd: String,
    /// Per-job timeout in seconds: 0 defers to the global default, negative disables.
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub verbosity: u32,
    #[serde(default)]
    pub limit: String,
    #[serde(default)]
    pub extra_vars: Map<String, Value>,
    #[serde(default)]
    pub scm_revision: String,
    /// Set by event processing once the playbook stats have been saved.
    #[serde(default)]
    pub host_status_counts: Option<Value>,
    #[serde(default)]
    pub installed_collections: Option<Value>,
    #[serde(default)]
    pub ansible_version: String,
    #[serde(default)]
    pub spawned_by_workflow: bool,
    #[serde(default)]
    pub workflow_job_id: Option<JobId>,
    /// Other jobs are waiting for this one to finish.
    #[serde(default)]
    pub has_blocked_dependents: bool,
    pub details: JobDetails,
}

impl UnifiedJob {
    pub fn kind(&self) -> JobKind {
        self.details.kind()
    }

    /// Short identifier for log lines, e.g. `project_update 12 (running)`.
    pub fn log_format(&self) -> String {
        format!("{} {} ({})", self.kind(), self.id, self.status)
    }

    pub fn credentials_of(&self, category: CredentialCategory) -> impl Iterator<Item = &Credential> {
        self.credentials.iter().filter(move |c| c.kind.category == category)
    }

    pub fn machine_credential(&self) -> Option<&Credential> {
        self.credentials_of(CredentialCategory::Machine).next()
    }

    pub fn vault_credentials(&self) -> Vec<&Credential> {
        self.credentials_of(CredentialCategory::Vault).collect()
    }

    pub fn network_credentials(&self) -> Vec<&Credential> {
        self.credentials_of(CredentialCategory::Network).collect()
    }

    pub fn as_job(&self) -> Option<&PlaybookJob> {
        match &self.details {
            JobDetails::Job(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_project_update(&self) -> Option<&ProjectUpdateDetails> {
        match &self.details {
            JobDetails::ProjectUpdate(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_inventory_update(&self) -> Option<&InventoryUpdateDetails> {
        match &self.details {
            JobDetails::InventoryUpdate(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_ad_hoc_command(&self) -> Option<&AdHocCommandDetails> {
        match &self.details {
            JobDetails::AdHocCommand(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_system_job(&self) -> Option<&SystemJobDetails> {
        match &self.details {
            JobDetails::SystemJob(d) => Some(d),
            _ => None,
        }
    }

    /// Inventory the run targets, for the kinds that have one.
    pub fn inventory_id(&self) -> Option<InventoryId> {
        match &self.details {
            JobDetails::Job(d) => d.inventory_id,
            JobDetails::InventoryUpdate(d) => d.inventory_id,
            JobDetails::AdHocCommand(d) => d.inventory_id,
            JobDetails::ProjectUpdate(_) | JobDetails::SystemJob(_) => None,
        }
    }
}

crate::test_builder! {
    pub struct UnifiedJobBuilder => UnifiedJob {
        id: JobId = JobId::new(1),
        name: String = "demo-job",
        status: JobStatus = JobStatus::Pending,
        cancel_flag: bool = false,
        launch_type: LaunchType = LaunchType::Manual,
        organization_id: Option<OrganizationId> = None::<OrganizationId>,
        execution_environment: Option<ExecutionEnvironment> = None::<ExecutionEnvironment>,
        credentials: Vec<Credential> = Vec::new(),
        instance_group: Option<String> = None::<String>,
        execution_node: String = "node1",
        controller_node: String = "node1",
        timeout: i64 = 0,
        verbosity: u32 = 0u32,
        limit: String = "",
        extra_vars: Map<String, Value> = Map::new(),
        scm_revision: String = "",
        host_status_counts: Option<Value> = None::<Value>,
        spawned_by_workflow: bool = false,
        workflow_job_id: Option<JobId> = None::<JobId>,
        has_blocked_dependents: bool = false,
        details: JobDetails = JobDetails::Job(PlaybookJob::default()),
    }
    computed {
        created = Utc::now(),
        started = None,
        finished = None,
        job_explanation = String::new(),
        result_traceback = String::new(),
        start_args = String::new(),
        job_env = BTreeMap::new(),
        job_args = String::new(),
        job_cwd = String::new(),
        installed_collections = None,
        ansible_version = String::new(),
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
