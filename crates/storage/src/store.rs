// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence collaborator contract.
//!
//! The task engine never talks to a database directly; everything it reads
//! or writes goes through [`JobStore`]. Each call is atomic. Transient
//! failures are reported as [`StoreError::Conflict`] or
//! [`StoreError::Unavailable`] and retried by [`crate::update_model`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use ax_core::{
    ExecutionEnvironment, Host, Inventory, InventoryId, JobDetails, JobId, JobStatus, JobType,
    LaunchType, Project, ProjectId, UnifiedJob,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },
    #[error("write conflict updating {kind} {id}")]
    Conflict { kind: &'static str, id: u64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors worth retrying: the write may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable(_))
    }
}

/// Partial update of a job-like entity. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub start_args: Option<String>,
    pub execution_environment: Option<ExecutionEnvironment>,
    pub job_explanation: Option<String>,
    pub result_traceback: Option<String>,
    pub job_env: Option<BTreeMap<String, String>>,
    pub job_args: Option<String>,
    pub job_cwd: Option<String>,
    pub scm_revision: Option<String>,
    pub installed_collections: Option<Value>,
    pub ansible_version: Option<String>,
    /// Project sync spawned on behalf of this job.
    pub project_update: Option<JobId>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    ax_core::setters! {
        status: JobStatus,
        start_args: String,
        execution_environment: ExecutionEnvironment,
        job_explanation: String,
        result_traceback: String,
        job_env: BTreeMap<String, String>,
        job_args: String,
        job_cwd: String,
        scm_revision: String,
        installed_collections: Value,
        ansible_version: String,
        project_update: JobId,
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to an in-memory copy. Timestamps follow the status.
    pub fn apply(&self, job: &mut UnifiedJob, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
            if status == JobStatus::Running && job.started.is_none() {
                job.started = Some(now);
            }
            if status.is_terminal() && job.finished.is_none() {
                job.finished = Some(now);
            }
        }
        if let Some(v) = &self.start_args {
            job.start_args = v.clone();
        }
        if let Some(v) = &self.execution_environment {
            job.execution_environment = Some(v.clone());
        }
        if let Some(v) = &self.job_explanation {
            job.job_explanation = v.clone();
        }
        if let Some(v) = &self.result_traceback {
            job.result_traceback = v.clone();
        }
        if let Some(v) = &self.job_env {
            job.job_env = v.clone();
        }
        if let Some(v) = &self.job_args {
            job.job_args = v.clone();
        }
        if let Some(v) = &self.job_cwd {
            job.job_cwd = v.clone();
        }
        if let Some(v) = &self.scm_revision {
            job.scm_revision = v.clone();
        }
        if let Some(v) = &self.installed_collections {
            job.installed_collections = Some(v.clone());
        }
        if let Some(v) = &self.ansible_version {
            job.ansible_version = v.clone();
        }
        if let Some(id) = self.project_update {
            match &mut job.details {
                JobDetails::Job(d) => d.project_update_id = Some(id),
                JobDetails::InventoryUpdate(d) => d.source_project_update_id = Some(id),
                _ => {}
            }
        }
    }
}

/// Partial update of a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub scm_revision: Option<String>,
    pub playbook_files: Option<Vec<String>>,
    pub inventory_files: Option<Vec<String>>,
    pub cache_id: Option<String>,
    pub last_update_failed: Option<bool>,
    pub last_update_id: Option<JobId>,
}

impl ProjectPatch {
    pub fn new() -> Self {
        Self::default()
    }

    ax_core::setters! {
        scm_revision: String,
        playbook_files: Vec<String>,
        inventory_files: Vec<String>,
        cache_id: String,
        last_update_failed: bool,
        last_update_id: JobId,
    }

    pub fn apply(&self, project: &mut Project) {
        if let Some(v) = &self.scm_revision {
            project.scm_revision = v.clone();
        }
        if let Some(v) = &self.playbook_files {
            project.playbook_files = v.clone();
        }
        if let Some(v) = &self.inventory_files {
            project.inventory_files = v.clone();
        }
        if let Some(v) = &self.cache_id {
            project.cache_id = v.clone();
        }
        if let Some(v) = self.last_update_failed {
            project.last_update_failed = v;
        }
        if let Some(v) = self.last_update_id {
            project.last_update_id = Some(v);
        }
    }
}

/// Request to create a nested project sync on behalf of a running job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProjectUpdate {
    pub project_id: ProjectId,
    pub launch_type: LaunchType,
    pub job_type: JobType,
    pub job_tags: String,
    pub status: JobStatus,
    pub instance_group: Option<String>,
    pub execution_node: String,
    pub controller_node: String,
    /// Branch override; the project's branch when `None`.
    pub scm_branch: Option<String>,
    pub scm_clean: Option<bool>,
    pub scm_revision: Option<String>,
    /// Used when the project has no default environment of its own.
    pub execution_environment: Option<ExecutionEnvironment>,
}

/// Host fields written by bulk updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostField {
    AnsibleFacts,
    AnsibleFactsModified,
    Variables,
}

/// Parameters for rendering an inventory as a dynamic inventory script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptParams {
    pub hostvars: bool,
    pub towervars: bool,
    pub slice_number: u32,
    pub slice_count: u32,
}

impl Default for ScriptParams {
    fn default() -> Self {
        Self { hostvars: true, towervars: true, slice_number: 1, slice_count: 1 }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn load_job(&self, id: JobId) -> Result<UnifiedJob, StoreError>;

    /// Atomically apply `update` and return the entity as persisted.
    async fn update_job(&self, id: JobId, update: &JobUpdate) -> Result<UnifiedJob, StoreError>;

    /// Re-read the cancel flag only.
    async fn refresh_cancel_flag(&self, id: JobId) -> Result<bool, StoreError> {
        Ok(self.load_job(id).await?.cancel_flag)
    }

    async fn create_project_update(&self, new: NewProjectUpdate) -> Result<UnifiedJob, StoreError>;

    async fn load_project(&self, id: ProjectId) -> Result<Project, StoreError>;

    async fn update_project(&self, id: ProjectId, patch: &ProjectPatch) -> Result<Project, StoreError>;

    async fn load_inventory(&self, id: InventoryId) -> Result<Inventory, StoreError>;

    /// Hosts targeted by `limit` (empty means all), in no particular order.
    async fn hosts_for_fact_cache(&self, inventory: InventoryId, limit: &str) -> Result<Vec<Host>, StoreError>;

    /// Write `fields` of each host in the order given. Returns rows touched.
    async fn bulk_update_hosts(&self, hosts: &[Host], fields: &[HostField]) -> Result<usize, StoreError>;

    /// Dynamic inventory data (`{"all": ..., "_meta": {"hostvars": ...}}`).
    async fn inventory_script(&self, inventory: InventoryId, params: ScriptParams) -> Result<Value, StoreError>;

    async fn resolve_execution_environment(&self, job: &UnifiedJob) -> Result<Option<ExecutionEnvironment>, StoreError>;

    /// Make sure event storage for the job exists before events arrive.
    async fn ensure_event_partition(&self, job: &UnifiedJob) -> Result<(), StoreError>;

    /// Hand the `ansible-inventory --list` output of an inventory update to the importer.
    async fn save_inventory_import(&self, job: &UnifiedJob, data: Value) -> Result<(), StoreError>;
}
