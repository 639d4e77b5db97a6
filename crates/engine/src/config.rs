// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine settings.
//!
//! Built-in defaults, overlaid by an optional TOML file, overlaid by the
//! `AX_*` environment variables in [`crate::env`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ax_core::ExecutionEnvironment;
use ax_storage::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid settings in {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

ax_core::str_enum! {
    /// Where Jinja is honored in extra vars.
    pub enum JinjaPolicy {
        Always => "always",
        Template => "template",
        Never => "never",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub isolation_base_path: PathBuf,
    pub projects_root: PathBuf,
    /// Remove private data dirs when a run finishes.
    pub cleanup_paths: bool,
    /// Private data dir name prefix; `%s` is replaced with the job id.
    pub job_folder_prefix: String,
    /// `ANSIBLE_*` settings exported to every run.
    pub ansible_env: BTreeMap<String, String>,
    /// Operator supplied extra environment.
    pub task_env: BTreeMap<String, String>,
    pub max_forks: u32,
    pub default_job_timeout: u64,
    pub default_project_update_timeout: u64,
    pub default_inventory_update_timeout: u64,
    pub default_job_idle_timeout: u64,
    /// Facts older than this many seconds are not staged; 0 keeps all.
    pub ansible_fact_cache_timeout: u64,
    pub roles_enabled: bool,
    pub collections_enabled: bool,
    /// Credential namespaces whose key is handed to ssh-agent instead of a file.
    pub ssh_agent_namespaces: Vec<String>,
    /// Extra host paths exposed to containers, `src[:dest[:z|O]]`.
    pub isolation_show_paths: Vec<String>,
    pub default_container_run_options: Vec<String>,
    pub project_update_vvv: bool,
    pub galaxy_ignore_certs: bool,
    pub allow_jinja_in_extra_vars: JinjaPolicy,
    pub insights_url_base: String,
    pub max_event_res: u64,
    pub tower_url_base: String,
    /// Attempts for transient store failures.
    pub update_attempts: u32,
    pub runner_suppress_output_file: bool,
    /// Directory holding the bundled `project_update.yml`.
    pub playbooks_dir: PathBuf,
    pub default_execution_environment: Option<ExecutionEnvironment>,
    pub podman_binary: String,
    pub node_name: String,
    pub lock_poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            isolation_base_path: PathBuf::from("/tmp"),
            projects_root: PathBuf::from("/var/lib/awx/projects"),
            cleanup_paths: true,
            job_folder_prefix: "awx_%s_".to_string(),
            ansible_env: BTreeMap::new(),
            task_env: BTreeMap::new(),
            max_forks: 200,
            default_job_timeout: 0,
            default_project_update_timeout: 0,
            default_inventory_update_timeout: 0,
            default_job_idle_timeout: 0,
            ansible_fact_cache_timeout: 0,
            roles_enabled: true,
            collections_enabled: true,
            ssh_agent_namespaces: vec!["ssh".to_string(), "scm".to_string()],
            isolation_show_paths: Vec::new(),
            default_container_run_options: vec![
                "--network".to_string(),
                "slirp4netns:enable_ipv6=true".to_string(),
            ],
            project_update_vvv: false,
            galaxy_ignore_certs: false,
            allow_jinja_in_extra_vars: JinjaPolicy::Template,
            insights_url_base: "https://example.org".to_string(),
            max_event_res: 700_000,
            tower_url_base: "https://towerhost".to_string(),
            update_attempts: 5,
            runner_suppress_output_file: true,
            playbooks_dir: PathBuf::from("/usr/share/ax/playbooks"),
            default_execution_environment: None,
            podman_binary: "podman".to_string(),
            node_name: "localhost".to_string(),
            lock_poll_interval_ms: 1000,
        }
    }
}

impl Settings {
    /// Defaults, then `AX_CONFIG` if set, then env overrides.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = match crate::env::config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| SettingsError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&text).map_err(|source| SettingsError::Parse { path: path.to_path_buf(), source })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply_env(&mut self) {
        if let Some(path) = crate::env::isolation_base_path() {
            self.isolation_base_path = path;
        }
        if let Some(path) = crate::env::projects_root() {
            self.projects_root = path;
        }
        if let Some(cleanup) = crate::env::cleanup_paths() {
            self.cleanup_paths = cleanup;
        }
        if let Some(interval) = crate::env::lock_poll_interval() {
            self.lock_poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        }
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { attempts: self.update_attempts.max(1), ..RetryPolicy::default() }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
