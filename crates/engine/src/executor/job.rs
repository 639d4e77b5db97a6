// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Playbook runs.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;

use async_trait::async_trait;
use ax_adapters::Execution;
use ax_core::{CredentialCategory, InventoryId, JobKind, JobStatus, JobType, PlaybookJob, Project, UnifiedJob};
use ax_storage::{ScriptParams, StoreError};
use indexmap::IndexMap;
use serde_json::json;

use crate::config::Settings;
use crate::error::{StagingError, TaskError};
use crate::executor::common::{
    machine_passwords, meta_vars, ssh_key_private_data, ssh_prompts, vault_passwords, verbosity_flag,
    write_inventory_script, MachineOptions,
};
use crate::executor::paths::{apply_search_paths, SEARCH_PATHS};
use crate::executor::{base_passwords, Env, JobExecutor, Passwords, PrivateData, PrivateDataFiles, RunContext};
use crate::extra_vars::ExtraVars;
use crate::fact_cache::{finish_fact_cache, start_fact_cache};
use crate::sync::sync_and_copy;

const NO_INVENTORY: &str = "Job could not start because it does not have a valid inventory.";
const NO_PROJECT: &str = "Job could not start because it does not have a valid project.";
const NO_EXECUTION_ENVIRONMENT: &str = "Job could not start because no Execution Environment could be found.";

/// ControlPath sockets, inside the container.
const CONTROL_PATH_DIR: &str = "/runner/cp";

pub struct PlaybookExecutor;

fn details(job: &UnifiedJob) -> Result<&PlaybookJob, TaskError> {
    job.as_job().ok_or_else(|| TaskError::Internal(format!("{} is not a playbook job", job.log_format())))
}

fn project<'a>(ctx: &'a RunContext<'_>) -> Result<&'a Project, TaskError> {
    ctx.state.project.as_ref().ok_or_else(|| TaskError::Internal("project not loaded".to_string()))
}

fn inventory_id(job: &UnifiedJob) -> Result<InventoryId, TaskError> {
    details(job)?.inventory_id.ok_or_else(|| TaskError::precondition(JobStatus::Failed, NO_INVENTORY))
}

/// A missing row is a precondition failure; anything else is a store error.
fn missing_as(message: &str) -> impl FnOnce(StoreError) -> TaskError + '_ {
    move |e| match e {
        StoreError::NotFound { .. } => TaskError::precondition(JobStatus::Failed, message),
        other => other.into(),
    }
}

/// `--forks`, capped at `max_forks` when that is set.
fn forks_arg(forks: u32, settings: &Settings) -> Option<String> {
    if forks == 0 {
        return None;
    }
    if settings.max_forks > 0 && forks > settings.max_forks {
        tracing::warn!(max_forks = settings.max_forks, "maximum number of forks exceeded");
        return Some(format!("--forks={}", settings.max_forks));
    }
    Some(format!("--forks={forks}"))
}

/// `--ask-vault-pass` and one `--vault-id <id>@prompt` per vault id.
pub(crate) fn vault_args(passwords: &Passwords, args: &mut Vec<String>) {
    for key in passwords.keys() {
        if key == "vault_password" {
            args.push("--ask-vault-pass".to_string());
        } else if let Some(id) = key.strip_prefix("vault_password.") {
            args.push("--vault-id".to_string());
            args.push(format!("{id}@prompt"));
        }
    }
}

#[async_trait]
impl JobExecutor for PlaybookExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Job
    }

    fn default_timeout(&self, settings: &Settings) -> u64 {
        settings.default_job_timeout
    }

    async fn pre_run_hook(&self, ctx: &mut RunContext<'_>) -> Result<(), TaskError> {
        let details = details(&ctx.job)?.clone();
        let inventory = inventory_id(&ctx.job)?;
        ctx.store().load_inventory(inventory).await.map_err(missing_as(NO_INVENTORY))?;

        let project_id = details.project_id.ok_or_else(|| TaskError::precondition(JobStatus::Failed, NO_PROJECT))?;
        let project = ctx.store().load_project(project_id).await.map_err(missing_as(NO_PROJECT))?;

        if ctx.job.execution_environment.is_none() {
            return Err(TaskError::precondition(JobStatus::Error, NO_EXECUTION_ENVIRONMENT));
        }
        ctx.state.project = Some(project);

        if details.use_fact_cache {
            let dir = ctx.private_data.artifact_dir(ctx.job.id).join("fact_cache");
            let timeout = ctx.settings().ansible_fact_cache_timeout;
            let run = start_fact_cache(ctx.store(), inventory, &ctx.job.limit, &dir, timeout, ctx.now()).await?;
            tracing::debug!(job = %ctx.job.log_format(), hosts = run.hosts.len(), "started job fact cache");
            ctx.state.fact_cache = Some(run);
        }
        Ok(())
    }

    async fn build_project_dir(&self, ctx: &mut RunContext<'_>) -> Result<(), TaskError> {
        let project = project(ctx)?.clone();
        let scm_branch = details(&ctx.job)?.scm_branch.clone();
        sync_and_copy(ctx, &project, &scm_branch).await
    }

    fn build_private_data(&self, ctx: &RunContext<'_>) -> PrivateData {
        ssh_key_private_data(&ctx.job.credentials)
    }

    fn build_passwords(&self, ctx: &RunContext<'_>, runtime: &Passwords) -> Result<Passwords, TaskError> {
        let mut passwords = base_passwords();
        machine_passwords(&ctx.job, runtime, true, &mut passwords);
        vault_passwords(&ctx.job, runtime, &mut passwords)?;

        // One answer per prompt; the machine key wins over a network key.
        if !passwords.contains_key("ssh_key_unlock") {
            let network = ctx.job.network_credentials().into_iter().find(|c| c.input("ssh_key_unlock").is_some_and(|v| !v.is_empty()));
            if let Some(cred) = network {
                let value = runtime.get("ssh_key_unlock").cloned().unwrap_or_else(|| cred.input_or_default("ssh_key_unlock"));
                passwords.insert("ssh_key_unlock".to_string(), value);
            }
        }
        Ok(passwords)
    }

    fn password_prompts(&self, passwords: &Passwords) -> IndexMap<String, String> {
        let mut prompts = ssh_prompts();
        prompts.insert(r"Vault password:\s*?$".to_string(), "vault_password".to_string());
        for key in passwords.keys() {
            if let Some(id) = key.strip_prefix("vault_password.") {
                prompts.insert(format!(r"Vault password \({id}\):\s*?$"), key.clone());
            }
        }
        prompts
    }

    fn build_extra_vars(&self, ctx: &RunContext<'_>) -> Result<Option<ExtraVars>, TaskError> {
        let details = details(&ctx.job)?;
        let revision = if ctx.job.scm_revision.is_empty() {
            ctx.state.project.as_ref().map(|p| p.scm_revision.clone()).unwrap_or_default()
        } else {
            ctx.job.scm_revision.clone()
        };
        let meta = meta_vars(
            &ctx.job,
            &[("project_revision", json!(revision)), ("project_scm_branch", json!(details.scm_branch))],
        );
        let safe_keys: Vec<String> = meta.keys().cloned().collect();

        // Meta vars override anything the launch supplied.
        let mut vars = ctx.job.extra_vars.clone();
        vars.extend(meta);
        Ok(Some(ExtraVars::new(vars).with_safe_keys(safe_keys)))
    }

    fn build_args(&self, ctx: &RunContext<'_>, passwords: &Passwords) -> Result<Vec<String>, TaskError> {
        let job = &ctx.job;
        let details = details(job)?;
        let machine = MachineOptions::from_job(job)?;

        let mut args = Vec::new();
        if details.job_type == JobType::Check {
            args.push("--check".to_string());
        }
        args.extend(["-u".to_string(), machine.ssh_username]);
        if passwords.contains_key("ssh_password") {
            args.push("--ask-pass".to_string());
        }
        if details.become_enabled {
            args.push("--become".to_string());
        }
        if details.diff_mode {
            args.push("--diff".to_string());
        }
        if !machine.become_method.is_empty() {
            args.extend(["--become-method".to_string(), machine.become_method]);
        }
        if !machine.become_username.is_empty() {
            args.extend(["--become-user".to_string(), machine.become_username]);
        }
        if passwords.contains_key("become_password") {
            args.push("--ask-become-pass".to_string());
        }
        vault_args(passwords, &mut args);

        args.extend(forks_arg(details.forks, ctx.settings()));
        if details.force_handlers {
            args.push("--force-handlers".to_string());
        }
        if !job.limit.is_empty() {
            args.extend(["-l".to_string(), job.limit.clone()]);
        }
        args.extend(verbosity_flag(job.verbosity));
        if !details.job_tags.is_empty() {
            args.extend(["-t".to_string(), details.job_tags.clone()]);
        }
        if !details.skip_tags.is_empty() {
            args.push(format!("--skip-tags={}", details.skip_tags));
        }
        if !details.start_at_task.is_empty() {
            args.push(format!("--start-at-task={}", details.start_at_task));
        }
        Ok(args)
    }

    fn build_env(&self, ctx: &RunContext<'_>, files: &PrivateDataFiles, env: &mut Env) -> Result<(), TaskError> {
        let settings = ctx.settings();
        let job = &ctx.job;
        env.insert("JOB_ID".into(), job.id.to_string());
        env.insert("INVENTORY_ID".into(), inventory_id(job)?.to_string());
        if let Some(project) = &ctx.state.project {
            let revision = if job.scm_revision.is_empty() { &project.scm_revision } else { &job.scm_revision };
            env.insert("PROJECT_REVISION".into(), revision.clone());
        }
        env.insert("ANSIBLE_RETRY_FILES_ENABLED".into(), "False".into());
        env.insert("MAX_EVENT_RES".into(), settings.max_event_res.to_string());
        env.insert("AWX_HOST".into(), settings.tower_url_base.clone());

        let cp_dir = ctx.private_data.path().join("cp");
        if !cp_dir.exists() {
            DirBuilder::new()
                .mode(0o700)
                .create(&cp_dir)
                .map_err(|source| StagingError::Create { path: cp_dir.clone(), source })?;
        }
        env.insert("ANSIBLE_SSH_CONTROL_PATH_DIR".into(), CONTROL_PATH_DIR.into());

        for cred in job.credentials_of(CredentialCategory::Cloud) {
            if cred.namespace() == "openstack" {
                if let Some(path) = files.credentials.get(&cred.id) {
                    env.insert("OS_CLIENT_CONFIG_FILE".into(), path.clone());
                }
            }
        }

        for cred in job.network_credentials() {
            env.insert("ANSIBLE_NET_USERNAME".into(), cred.input_or_default("username"));
            env.insert("ANSIBLE_NET_PASSWORD".into(), cred.input_or_default("password"));
            if let Some(path) = files.credentials.get(&cred.id) {
                env.insert("ANSIBLE_NET_SSH_KEYFILE".into(), path.clone());
            }
            let authorize = cred.input_bool("authorize");
            env.insert("ANSIBLE_NET_AUTHORIZE".into(), u8::from(authorize).to_string());
            if authorize {
                env.insert("ANSIBLE_NET_AUTH_PASS".into(), cred.input_or_default("authorize_password"));
            }
        }

        apply_search_paths(env, &ctx.private_data.project_dir(), &SEARCH_PATHS);
        Ok(())
    }

    async fn build_inventory(&self, ctx: &RunContext<'_>) -> Result<Option<String>, TaskError> {
        let details = details(&ctx.job)?;
        let params = ScriptParams {
            slice_number: details.job_slice_number.max(1),
            slice_count: details.job_slice_count.max(1),
            ..ScriptParams::default()
        };
        let path = write_inventory_script(ctx, inventory_id(&ctx.job)?, "hosts", params).await?;
        Ok(Some(path))
    }

    fn build_execution(&self, ctx: &RunContext<'_>) -> Result<Execution, TaskError> {
        Ok(Execution::Playbook { playbook: details(&ctx.job)?.playbook.clone() })
    }

    fn should_use_fact_cache(&self, job: &UnifiedJob) -> bool {
        job.as_job().is_some_and(|d| d.use_fact_cache)
    }

    async fn post_run_hook(&self, ctx: &mut RunContext<'_>, _status: JobStatus) -> Result<(), TaskError> {
        // Without a runner result the cache dir was never read by ansible.
        if !ctx.state.runner_finished {
            return Ok(());
        }
        let Some(run) = ctx.state.fact_cache.take() else {
            return Ok(());
        };
        let written = finish_fact_cache(ctx.store(), run, ctx.now()).await?;
        tracing::debug!(job = %ctx.job.log_format(), hosts = written, "finished job fact cache");
        Ok(())
    }

    async fn final_run_hook(&self, ctx: &mut RunContext<'_>, _status: JobStatus) -> Result<(), TaskError> {
        if let Some(inventory) = details(&ctx.job)?.inventory_id {
            ctx.deps.scheduler.update_inventory_computed_fields(inventory);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
