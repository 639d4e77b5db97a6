// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`JobStore`] used by the local harness and by tests.
//!
//! Host bulk updates take per-row locks in the order the rows are given,
//! mirroring the row locking of a relational store. Callers that do not
//! sort can deadlock against each other here just as they would there.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use ax_core::{
    ExecutionEnvironment, Host, HostId, Inventory, InventoryId, JobDetails, JobId, Project,
    ProjectId, ProjectUpdateDetails, UnifiedJob,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::store::{
    HostField, JobStore, JobUpdate, NewProjectUpdate, ProjectPatch, ScriptParams, StoreError,
};

/// Everything the in-memory store holds; also the snapshot payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub jobs: BTreeMap<JobId, UnifiedJob>,
    #[serde(default)]
    pub projects: BTreeMap<ProjectId, Project>,
    #[serde(default)]
    pub inventories: BTreeMap<InventoryId, Inventory>,
    #[serde(default)]
    pub hosts: BTreeMap<HostId, Host>,
    #[serde(default)]
    pub default_execution_environment: Option<ExecutionEnvironment>,
    /// Inventory update id -> imported `ansible-inventory` output.
    #[serde(default)]
    pub inventory_imports: BTreeMap<JobId, Value>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    pending_conflicts: Mutex<u32>,
    partitions: Mutex<BTreeSet<JobId>>,
    host_writes: Mutex<Vec<Vec<HostId>>>,
    row_locks: Mutex<HashMap<HostId, Arc<tokio::sync::Mutex<()>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: StoreState) -> Self {
        Self { state: Mutex::new(state), ..Self::default() }
    }

    /// Copy of the current state, e.g. for writing a snapshot.
    pub fn state(&self) -> StoreState {
        self.state.lock().clone()
    }

    pub fn insert_job(&self, job: UnifiedJob) {
        self.state.lock().jobs.insert(job.id, job);
    }

    pub fn insert_project(&self, project: Project) {
        self.state.lock().projects.insert(project.id, project);
    }

    pub fn insert_inventory(&self, inventory: Inventory) {
        self.state.lock().inventories.insert(inventory.id, inventory);
    }

    pub fn insert_host(&self, host: Host) {
        self.state.lock().hosts.insert(host.id, host);
    }

    pub fn set_default_execution_environment(&self, ee: ExecutionEnvironment) {
        self.state.lock().default_execution_environment = Some(ee);
    }

    /// Flip the cancel flag the way an operator would.
    pub fn request_cancel(&self, id: JobId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound { kind: "job", id: id.get() })?;
        job.cancel_flag = true;
        Ok(())
    }

    pub fn job(&self, id: JobId) -> Option<UnifiedJob> {
        self.state.lock().jobs.get(&id).cloned()
    }

    pub fn project(&self, id: ProjectId) -> Option<Project> {
        self.state.lock().projects.get(&id).cloned()
    }

    pub fn host(&self, id: HostId) -> Option<Host> {
        self.state.lock().hosts.get(&id).cloned()
    }

    pub fn inventory_import(&self, id: JobId) -> Option<Value> {
        self.state.lock().inventory_imports.get(&id).cloned()
    }

    pub fn has_event_partition(&self, id: JobId) -> bool {
        self.partitions.lock().contains(&id)
    }

    /// Make the next `n` job updates fail with a write conflict.
    pub fn inject_conflicts(&self, n: u32) {
        *self.pending_conflicts.lock() = n;
    }

    /// Host ids of every bulk write, in write order.
    pub fn host_writes(&self) -> Vec<Vec<HostId>> {
        self.host_writes.lock().clone()
    }

    fn row_lock(&self, id: HostId) -> Arc<tokio::sync::Mutex<()>> {
        self.row_locks.lock().entry(id).or_default().clone()
    }
}

fn not_found(kind: &'static str, id: u64) -> StoreError {
    StoreError::NotFound { kind, id }
}

fn limit_matches(limit: &str, name: &str) -> bool {
    let limit = limit.trim();
    if limit.is_empty() || limit == "all" {
        return true;
    }
    limit.split([',', ':']).map(str::trim).any(|pattern| pattern == name || pattern == "all")
}

fn host_vars(host: &Host, towervars: bool) -> Map<String, Value> {
    let mut vars = match serde_json::from_str::<Value>(&host.variables) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if towervars {
        vars.insert("remote_tower_enabled".to_string(), json!("true"));
        vars.insert("remote_tower_id".to_string(), json!(host.id.get()));
    }
    vars
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn load_job(&self, id: JobId) -> Result<UnifiedJob, StoreError> {
        self.job(id).ok_or(not_found("job", id.get()))
    }

    async fn update_job(&self, id: JobId, update: &JobUpdate) -> Result<UnifiedJob, StoreError> {
        {
            let mut conflicts = self.pending_conflicts.lock();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(StoreError::Conflict { kind: "job", id: id.get() });
            }
        }
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&id).ok_or(not_found("job", id.get()))?;
        update.apply(job, Utc::now());
        Ok(job.clone())
    }

    async fn create_project_update(&self, new: NewProjectUpdate) -> Result<UnifiedJob, StoreError> {
        let mut state = self.state.lock();
        let project = state
            .projects
            .get(&new.project_id)
            .cloned()
            .ok_or(not_found("project", new.project_id.get()))?;
        let id = JobId::new(state.jobs.keys().next_back().map_or(1, |k| k.get() + 1));
        let details = ProjectUpdateDetails {
            project_id: project.id,
            job_type: new.job_type,
            job_tags: new.job_tags,
            scm_type: project.scm_type,
            scm_url: project.scm_url.clone(),
            scm_branch: new.scm_branch.unwrap_or_else(|| project.scm_branch.clone()),
            scm_refspec: project.scm_refspec.clone(),
            scm_clean: new.scm_clean.unwrap_or(project.scm_clean),
            scm_track_submodules: project.scm_track_submodules,
            scm_delete_on_update: project.scm_delete_on_update,
        };
        let now = Utc::now();
        let job = UnifiedJob {
            id,
            name: project.name.clone(),
            status: new.status,
            cancel_flag: false,
            created: now,
            started: Some(now),
            finished: None,
            launch_type: new.launch_type,
            organization_id: project.organization_id,
            execution_environment: project
                .default_environment
                .clone()
                .or(new.execution_environment)
                .or_else(|| state.default_execution_environment.clone()),
            credentials: project.credential.iter().cloned().collect(),
            instance_group: new.instance_group,
            execution_node: new.execution_node,
            controller_node: new.controller_node,
            job_explanation: String::new(),
            result_traceback: String::new(),
            start_args: String::new(),
            job_env: BTreeMap::new(),
            job_args: String::new(),
            job_cwd: String::new(),
            timeout: 0,
            verbosity: 0,
            limit: String::new(),
            extra_vars: Map::new(),
            scm_revision: new.scm_revision.unwrap_or_default(),
            host_status_counts: None,
            installed_collections: None,
            ansible_version: String::new(),
            spawned_by_workflow: false,
            workflow_job_id: None,
            has_blocked_dependents: false,
            details: JobDetails::ProjectUpdate(details),
        };
        state.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn load_project(&self, id: ProjectId) -> Result<Project, StoreError> {
        self.project(id).ok_or(not_found("project", id.get()))
    }

    async fn update_project(&self, id: ProjectId, patch: &ProjectPatch) -> Result<Project, StoreError> {
        let mut state = self.state.lock();
        let project = state.projects.get_mut(&id).ok_or(not_found("project", id.get()))?;
        patch.apply(project);
        Ok(project.clone())
    }

    async fn load_inventory(&self, id: InventoryId) -> Result<Inventory, StoreError> {
        self.state.lock().inventories.get(&id).cloned().ok_or(not_found("inventory", id.get()))
    }

    async fn hosts_for_fact_cache(&self, inventory: InventoryId, limit: &str) -> Result<Vec<Host>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .hosts
            .values()
            .filter(|h| h.inventory_id == inventory && limit_matches(limit, &h.name))
            .cloned()
            .collect())
    }

    async fn bulk_update_hosts(&self, hosts: &[Host], fields: &[HostField]) -> Result<usize, StoreError> {
        let mut guards = Vec::with_capacity(hosts.len());
        for host in hosts {
            guards.push(self.row_lock(host.id).lock_owned().await);
            tokio::task::yield_now().await;
        }

        let mut updated = 0;
        {
            let mut state = self.state.lock();
            for host in hosts {
                let Some(row) = state.hosts.get_mut(&host.id) else {
                    continue;
                };
                for field in fields {
                    match field {
                        HostField::AnsibleFacts => row.ansible_facts = host.ansible_facts.clone(),
                        HostField::AnsibleFactsModified => {
                            row.ansible_facts_modified = host.ansible_facts_modified
                        }
                        HostField::Variables => row.variables = host.variables.clone(),
                    }
                }
                updated += 1;
            }
        }
        self.host_writes.lock().push(hosts.iter().map(|h| h.id).collect());
        drop(guards);
        Ok(updated)
    }

    async fn inventory_script(&self, inventory: InventoryId, params: ScriptParams) -> Result<Value, StoreError> {
        let state = self.state.lock();
        if !state.inventories.contains_key(&inventory) {
            return Err(not_found("inventory", inventory.get()));
        }
        let mut hosts: Vec<&Host> = state.hosts.values().filter(|h| h.inventory_id == inventory).collect();
        hosts.sort_by(|a, b| a.name.cmp(&b.name));
        let count = params.slice_count.max(1) as usize;
        let number = params.slice_number.max(1) as usize;
        let sliced: Vec<&Host> = hosts
            .into_iter()
            .enumerate()
            .filter(|(i, _)| count == 1 || i % count == number - 1)
            .map(|(_, h)| h)
            .collect();

        let names: Vec<&str> = sliced.iter().map(|h| h.name.as_str()).collect();
        let mut hostvars = Map::new();
        if params.hostvars {
            for host in &sliced {
                hostvars.insert(host.name.clone(), Value::Object(host_vars(host, params.towervars)));
            }
        }
        Ok(json!({
            "all": { "hosts": names },
            "_meta": { "hostvars": hostvars },
        }))
    }

    async fn resolve_execution_environment(&self, job: &UnifiedJob) -> Result<Option<ExecutionEnvironment>, StoreError> {
        let state = self.state.lock();
        let project_id = match &job.details {
            JobDetails::Job(d) => d.project_id,
            JobDetails::ProjectUpdate(d) => Some(d.project_id),
            JobDetails::InventoryUpdate(d) => d.source_project_id,
            _ => None,
        };
        let from_project = project_id
            .and_then(|id| state.projects.get(&id))
            .and_then(|p| p.default_environment.clone());
        Ok(from_project.or_else(|| state.default_execution_environment.clone()))
    }

    async fn ensure_event_partition(&self, job: &UnifiedJob) -> Result<(), StoreError> {
        self.partitions.lock().insert(job.id);
        Ok(())
    }

    async fn save_inventory_import(&self, job: &UnifiedJob, data: Value) -> Result<(), StoreError> {
        if !data.is_object() {
            return Err(StoreError::Invalid(format!(
                "inventory import for {} is not a JSON object",
                job.log_format()
            )));
        }
        self.state.lock().inventory_imports.insert(job.id, data);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
