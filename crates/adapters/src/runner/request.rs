// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fully resolved description of one runner invocation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ax_core::{JobId, JobKind};
use indexmap::IndexMap;
use serde::Serialize;

/// What the runner executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Execution {
    /// `ansible-playbook <args> <playbook>`
    Playbook { playbook: String },
    /// `ansible -m <module> -a <module_args> <args>`
    Module { module: String, module_args: String },
    /// `args` is the complete command line.
    Command,
}

/// Options written to `env/settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunnerSettings {
    /// Seconds; 0 disables.
    pub job_timeout: u64,
    pub suppress_ansible_output: bool,
    pub suppress_output_file: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u64>,
}

/// Registry login for pulling the execution environment image.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ContainerAuth {
    pub host: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub verify_ssl: bool,
}

impl std::fmt::Debug for ContainerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerAuth")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"**********")
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerParams {
    pub image: String,
    /// Container engine binary, e.g. `podman`.
    pub executable: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<ContainerAuth>,
    /// `src:dest:mode` bind mounts.
    pub volume_mounts: Vec<String>,
}

/// Immutable once built; construct through [`RunnerRequestBuilder`].
#[derive(Clone, Serialize)]
pub struct RunnerRequest {
    ident: JobId,
    kind: JobKind,
    private_data_dir: PathBuf,
    execution: Execution,
    args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inventory: Option<String>,
    /// Prompt pattern -> answer. Never serialized.
    #[serde(skip_serializing)]
    passwords: IndexMap<String, String>,
    envvars: BTreeMap<String, String>,
    #[serde(skip_serializing)]
    ssh_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fact_cache_type: Option<String>,
    suppress_env_files: bool,
    settings: RunnerSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    container: Option<ContainerParams>,
}

impl std::fmt::Debug for RunnerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRequest")
            .field("ident", &self.ident)
            .field("kind", &self.kind)
            .field("private_data_dir", &self.private_data_dir)
            .field("execution", &self.execution)
            .field("args", &self.args)
            .field("inventory", &self.inventory)
            .field("prompts", &self.passwords.keys().collect::<Vec<_>>())
            .field("has_ssh_key", &self.ssh_key.is_some())
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl RunnerRequest {
    pub fn builder(ident: JobId, kind: JobKind, private_data_dir: impl Into<PathBuf>) -> RunnerRequestBuilder {
        RunnerRequestBuilder {
            request: RunnerRequest {
                ident,
                kind,
                private_data_dir: private_data_dir.into(),
                execution: Execution::Command,
                args: Vec::new(),
                inventory: None,
                passwords: IndexMap::new(),
                envvars: BTreeMap::new(),
                ssh_key: None,
                fact_cache_type: None,
                suppress_env_files: true,
                settings: RunnerSettings::default(),
                container: None,
            },
        }
    }

    pub fn ident(&self) -> JobId {
        self.ident
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn private_data_dir(&self) -> &Path {
        &self.private_data_dir
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.private_data_dir.join("artifacts").join(self.ident.to_string())
    }

    pub fn project_dir(&self) -> PathBuf {
        self.private_data_dir.join("project")
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    pub fn playbook(&self) -> Option<&str> {
        match &self.execution {
            Execution::Playbook { playbook } => Some(playbook),
            _ => None,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn inventory(&self) -> Option<&str> {
        self.inventory.as_deref()
    }

    pub fn passwords(&self) -> &IndexMap<String, String> {
        &self.passwords
    }

    pub fn envvars(&self) -> &BTreeMap<String, String> {
        &self.envvars
    }

    pub fn ssh_key(&self) -> Option<&str> {
        self.ssh_key.as_deref()
    }

    pub fn fact_cache_type(&self) -> Option<&str> {
        self.fact_cache_type.as_deref()
    }

    pub fn suppress_env_files(&self) -> bool {
        self.suppress_env_files
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn container(&self) -> Option<&ContainerParams> {
        self.container.as_ref()
    }
}

pub struct RunnerRequestBuilder {
    request: RunnerRequest,
}

impl RunnerRequestBuilder {
    pub fn execution(mut self, execution: Execution) -> Self {
        self.request.execution = execution;
        self
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.request.args = args;
        self
    }

    /// Empty inventories are dropped.
    pub fn inventory(mut self, inventory: Option<String>) -> Self {
        self.request.inventory = inventory.filter(|i| !i.is_empty());
        self
    }

    pub fn passwords(mut self, passwords: IndexMap<String, String>) -> Self {
        self.request.passwords = passwords;
        self
    }

    pub fn envvars(mut self, envvars: BTreeMap<String, String>) -> Self {
        self.request.envvars = envvars;
        self
    }

    pub fn ssh_key(mut self, ssh_key: Option<String>) -> Self {
        self.request.ssh_key = ssh_key;
        self
    }

    pub fn fact_cache(mut self, enabled: bool) -> Self {
        self.request.fact_cache_type = enabled.then(|| "jsonfile".to_string());
        self
    }

    pub fn suppress_env_files(mut self, suppress: bool) -> Self {
        self.request.suppress_env_files = suppress;
        self
    }

    pub fn settings(mut self, settings: RunnerSettings) -> Self {
        self.request.settings = settings;
        self
    }

    pub fn container(mut self, container: Option<ContainerParams>) -> Self {
        self.request.container = container;
        self
    }

    pub fn build(self) -> RunnerRequest {
        self.request
    }
}
