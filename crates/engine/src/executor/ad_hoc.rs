// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ad hoc commands: one module against an inventory pattern.

use async_trait::async_trait;
use ax_adapters::Execution;
use ax_core::{AdHocCommandDetails, InventoryId, JobKind, JobStatus, JobType, UnifiedJob};
use ax_storage::ScriptParams;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::JinjaPolicy;
use crate::error::{BuildError, TaskError};
use crate::executor::common::{
    machine_passwords, meta_vars, ssh_key_private_data, ssh_prompts, verbosity_flag, write_inventory_script,
    MachineOptions,
};
use crate::executor::{base_passwords, Env, JobExecutor, Passwords, PrivateData, PrivateDataFiles, RunContext};
use crate::extra_vars::{sanitize_jinja, ExtraVars};

const NO_INVENTORY: &str = "Ad hoc command could not start because it does not have a valid inventory.";

pub struct AdHocCommandExecutor;

fn details(job: &UnifiedJob) -> Result<&AdHocCommandDetails, TaskError> {
    job.as_ad_hoc_command()
        .ok_or_else(|| TaskError::Internal(format!("{} is not an ad hoc command", job.log_format())))
}

fn inventory_id(job: &UnifiedJob) -> Result<InventoryId, TaskError> {
    details(job)?.inventory_id.ok_or_else(|| TaskError::precondition(JobStatus::Failed, NO_INVENTORY))
}

/// Connection and execution variables a user may not set on an ad hoc
/// command, sorted.
pub fn prohibited_vars(vars: &Map<String, Value>) -> Vec<&str> {
    let mut found: Vec<&str> = vars.keys().map(String::as_str).filter(|k| k.starts_with("ansible_")).collect();
    found.sort_unstable();
    found
}

#[async_trait]
impl JobExecutor for AdHocCommandExecutor {
    fn kind(&self) -> JobKind {
        JobKind::AdHocCommand
    }

    async fn pre_run_hook(&self, ctx: &mut RunContext<'_>) -> Result<(), TaskError> {
        inventory_id(&ctx.job)?;
        Ok(())
    }

    fn build_private_data(&self, ctx: &RunContext<'_>) -> PrivateData {
        ssh_key_private_data(ctx.job.machine_credential())
    }

    fn build_passwords(&self, ctx: &RunContext<'_>, runtime: &Passwords) -> Result<Passwords, TaskError> {
        let mut passwords = base_passwords();
        machine_passwords(&ctx.job, runtime, false, &mut passwords);
        Ok(passwords)
    }

    fn password_prompts(&self, _passwords: &Passwords) -> IndexMap<String, String> {
        ssh_prompts()
    }

    fn build_extra_vars(&self, ctx: &RunContext<'_>) -> Result<Option<ExtraVars>, TaskError> {
        let prohibited = prohibited_vars(&ctx.job.extra_vars);
        if !prohibited.is_empty() {
            return Err(BuildError::ProhibitedVars(prohibited.join(", ")).into());
        }
        let mut vars = ctx.job.extra_vars.clone();
        vars.extend(meta_vars(&ctx.job, &[]));
        Ok(Some(ExtraVars::new(vars)))
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
        if !machine.become_method.is_empty() {
            args.extend(["--become-method".to_string(), machine.become_method]);
        }
        if !machine.become_username.is_empty() {
            args.extend(["--become-user".to_string(), machine.become_username]);
        }
        if passwords.contains_key("become_password") {
            args.push("--ask-become-pass".to_string());
        }
        if details.forks > 0 {
            args.push(format!("--forks={}", details.forks));
        }
        if details.diff_mode {
            args.push("--diff".to_string());
        }
        args.extend(verbosity_flag(job.verbosity));
        args.push(if job.limit.is_empty() { "all".to_string() } else { job.limit.clone() });
        Ok(args)
    }

    fn build_env(&self, ctx: &RunContext<'_>, _files: &PrivateDataFiles, env: &mut Env) -> Result<(), TaskError> {
        env.insert("AD_HOC_COMMAND_ID".into(), ctx.job.id.to_string());
        env.insert("INVENTORY_ID".into(), inventory_id(&ctx.job)?.to_string());
        env.insert("INVENTORY_HOSTVARS".into(), "True".into());
        env.insert("ANSIBLE_LOAD_CALLBACK_PLUGINS".into(), "1".into());
        env.insert("ANSIBLE_SFTP_BATCH_MODE".into(), "False".into());
        Ok(())
    }

    async fn build_inventory(&self, ctx: &RunContext<'_>) -> Result<Option<String>, TaskError> {
        let path = write_inventory_script(ctx, inventory_id(&ctx.job)?, "hosts", ScriptParams::default()).await?;
        Ok(Some(path))
    }

    fn build_execution(&self, ctx: &RunContext<'_>) -> Result<Execution, TaskError> {
        let details = details(&ctx.job)?;
        let module_args = match ctx.settings().allow_jinja_in_extra_vars {
            JinjaPolicy::Always => details.module_args.as_str(),
            _ => sanitize_jinja(&details.module_args)?,
        };
        Ok(Execution::Module { module: details.module_name.clone(), module_args: module_args.to_string() })
    }
}

#[cfg(test)]
#[path = "ad_hoc_tests.rs"]
mod tests;
