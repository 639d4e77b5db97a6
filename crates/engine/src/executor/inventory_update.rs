// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inventory updates: `ansible-inventory --list --export` against a source,
//! with the JSON it writes handed to the store as an import.

use std::fs;

use async_trait::async_trait;
use ax_core::{InventoryUpdateDetails, JobKind, JobStatus, UnifiedJob};
use serde_json::{Map, Value};

use crate::config::Settings;
use crate::error::{BuildError, PostRunError, TaskError};
use crate::executor::common::verbosity_flag;
use crate::executor::paths::{apply_search_paths, DEFAULT_COLLECTIONS_PATH};
use crate::executor::{ArgsFile, Env, JobExecutor, Passwords, PrivateDataFiles, RunContext};
use crate::sync::sync_and_copy;

const SCM_SOURCE: &str = "scm";
const FILE_SOURCE: &str = "file";

/// Set for every inventory update; parse failures are fatal and verbose
/// output stays out of the JSON on stdout.
const STANDARD_ENV: [(&str, &str); 3] = [
    ("ANSIBLE_INVENTORY_UNPARSED_FAILED", "True"),
    ("ANSIBLE_INVENTORY_EXPORT", "True"),
    ("ANSIBLE_VERBOSE_TO_STDERR", "True"),
];

/// Source vars never copied into the environment.
const BLOCKED_ENV: [&str; 5] = ["HOME", "USER", "_", "TERM", "PATH"];

const COLLECTIONS_PATHS: &str = "ANSIBLE_COLLECTIONS_PATHS";
const CONTROLLER_COLLECTIONS: &str = "/usr/share/automation-controller/collections";

const SAVE_FAILED: &str = "Error occured while saving inventory data, see traceback or server logs";

/// Fully qualified inventory plugin per cloud source.
const PLUGINS: [(&str, &str); 10] = [
    ("ec2", "amazon.aws.aws_ec2"),
    ("gce", "google.cloud.gcp_compute"),
    ("azure_rm", "azure.azcollection.azure_rm"),
    ("vmware", "community.vmware.vmware_vm_inventory"),
    ("openstack", "openstack.cloud.openstack"),
    ("rhv", "ovirt.ovirt.ovirt"),
    ("satellite6", "theforeman.foreman.foreman"),
    ("controller", "awx.awx.tower"),
    ("insights", "redhatinsights.insights.insights"),
    ("constructed", "ansible.builtin.constructed"),
];

pub struct InventoryUpdateExecutor;

fn details(job: &UnifiedJob) -> Result<&InventoryUpdateDetails, TaskError> {
    job.as_inventory_update()
        .ok_or_else(|| TaskError::Internal(format!("{} is not an inventory update", job.log_format())))
}

/// Plugin name written into the source's config file.
pub fn plugin_name(source: &str) -> &str {
    PLUGINS.iter().find(|(s, _)| *s == source).map_or(source, |(_, plugin)| plugin)
}

/// YAML config for a plugin-backed source. The user's source vars are kept;
/// `plugin` always names the source's plugin.
pub fn plugin_config(details: &InventoryUpdateDetails) -> Result<String, BuildError> {
    let mut config: Map<String, Value> = details.source_vars.clone();
    config.insert("plugin".to_string(), Value::String(plugin_name(&details.source).to_string()));
    serde_yaml::to_string(&config).map_err(|e| BuildError::Render { what: "inventory plugin config", message: e.to_string() })
}

/// Source path relative to the private data dir. Plugin sources get their
/// config written here.
fn source_location(ctx: &RunContext<'_>, details: &InventoryUpdateDetails) -> Result<String, TaskError> {
    if details.source == SCM_SOURCE {
        return Ok(format!("project/{}", details.source_path));
    }
    let filename = format!("{}.yml", details.source);
    ctx.private_data.write_private_data_file(Some(&filename), &plugin_config(details)?, Some("inventory"), 0o700)?;
    Ok(format!("inventory/{filename}"))
}

fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl JobExecutor for InventoryUpdateExecutor {
    fn kind(&self) -> JobKind {
        JobKind::InventoryUpdate
    }

    fn args_file(&self) -> ArgsFile {
        ArgsFile::Args
    }

    fn default_timeout(&self, settings: &Settings) -> u64 {
        settings.default_inventory_update_timeout
    }

    async fn pre_run_hook(&self, ctx: &mut RunContext<'_>) -> Result<(), TaskError> {
        if details(&ctx.job)?.source == FILE_SOURCE {
            return Err(BuildError::FileSource.into());
        }
        Ok(())
    }

    async fn build_project_dir(&self, ctx: &mut RunContext<'_>) -> Result<(), TaskError> {
        let details = details(&ctx.job)?.clone();
        if details.source != SCM_SOURCE {
            ctx.private_data.ensure_project_dir()?;
            return Ok(());
        }
        let project_id = details
            .source_project_id
            .ok_or_else(|| TaskError::Internal("Could not find project to run SCM inventory update from.".to_string()))?;
        let project = ctx.store().load_project(project_id).await?;
        ctx.state.project = Some(project.clone());
        sync_and_copy(ctx, &project, &details.scm_branch).await
    }

    fn build_args(&self, ctx: &RunContext<'_>, _passwords: &Passwords) -> Result<Vec<String>, TaskError> {
        let job = &ctx.job;
        let details = details(job)?;
        if details.inventory_id.is_none() {
            return Err(BuildError::NoInventory.into());
        }

        let rel_path = source_location(ctx, details)?;
        let source = ctx.private_data.path().join(&rel_path);
        let runner_source = ctx.runner_path(&source);
        let playbook_dir = if source.is_dir() {
            runner_source.clone()
        } else {
            let parent = source.parent().unwrap_or(ctx.private_data.path());
            ctx.runner_path(parent)
        };
        let output = ctx.private_data.artifact_dir(job.id).join("output.json");

        let mut args: Vec<String> =
            ["ansible-inventory", "--list", "--export", "-i"].into_iter().map(String::from).collect();
        args.push(runner_source);
        if !job.limit.is_empty() {
            args.extend(["--limit".to_string(), job.limit.clone()]);
        }
        args.extend(["--output".to_string(), ctx.runner_path(&output)]);
        args.extend(["--playbook-dir".to_string(), playbook_dir]);
        if job.verbosity > 0 {
            args.extend(verbosity_flag(job.verbosity * 2 + 1));
        }
        Ok(args)
    }

    fn build_env(&self, ctx: &RunContext<'_>, _files: &PrivateDataFiles, env: &mut Env) -> Result<(), TaskError> {
        let details = details(&ctx.job)?;
        env.insert("INVENTORY_SOURCE_ID".into(), details.inventory_source_id.to_string());
        env.insert("INVENTORY_UPDATE_ID".into(), ctx.job.id.to_string());
        env.extend(STANDARD_ENV.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        if details.source == SCM_SOURCE {
            for (key, value) in &details.source_vars {
                if !env.contains_key(key) && !BLOCKED_ENV.contains(&key.as_str()) {
                    env.insert(key.clone(), env_value(value));
                }
            }
            if details.source_project_update_id.is_some() {
                apply_search_paths(
                    env,
                    &ctx.private_data.project_dir(),
                    &[(COLLECTIONS_PATHS, "collections_paths", "requirements_collections", DEFAULT_COLLECTIONS_PATH)],
                );
            }
        }

        let base = env.get(COLLECTIONS_PATHS).map_or(DEFAULT_COLLECTIONS_PATH, String::as_str);
        let paths = format!("{base}:{CONTROLLER_COLLECTIONS}");
        env.insert(COLLECTIONS_PATHS.into(), paths);
        Ok(())
    }

    async fn post_run_hook(&self, ctx: &mut RunContext<'_>, status: JobStatus) -> Result<(), TaskError> {
        if status != JobStatus::Successful {
            return Ok(());
        }
        let output = ctx.private_data.artifact_dir(ctx.job.id).join("output.json");
        let save_failed = |e: &dyn std::fmt::Display| {
            tracing::error!(job = %ctx.job.log_format(), error = %e, "error saving inventory content, rolling back changes");
            TaskError::from(PostRunError::new(JobStatus::Error, SAVE_FAILED).with_traceback(e.to_string()))
        };

        let text = fs::read_to_string(&output).map_err(|e| save_failed(&e))?;
        let data: Value = serde_json::from_str(&text).map_err(|e| save_failed(&e))?;
        ctx.store().save_inventory_import(&ctx.job, data).await.map_err(|e| save_failed(&e))?;
        tracing::info!(job = %ctx.job.log_format(), "saved inventory import");
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
#[path = "inventory_update_tests.rs"]
mod tests;
