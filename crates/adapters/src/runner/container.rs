// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runner: the process runner wrapped in `podman run`.
//!
//! The private data dir is mounted at [`CONTAINER_RUNNER_ROOT`]; requests
//! built for containerized execution address their files under that root.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::process::{command_line, runner_env};
use super::{
    CancelCheck, ContainerAuth, ContainerParams, ProcessRunner, RunnerAdapter, RunnerError,
    RunnerEvents, RunnerRequest, RunnerResult,
};
use crate::subprocess::REGISTRY_LOGIN_TIMEOUT;

/// Mount point of the private data dir inside the container.
pub const CONTAINER_RUNNER_ROOT: &str = "/runner";

/// Runs requests that carry [`ContainerParams`] inside a container and
/// everything else as a local process.
#[derive(Debug, Clone, Default)]
pub struct ContainerRunner {
    process: ProcessRunner,
}

impl ContainerRunner {
    pub fn new(process: ProcessRunner) -> Self {
        Self { process }
    }
}

#[async_trait]
impl RunnerAdapter for ContainerRunner {
    async fn run(
        &self,
        request: &RunnerRequest,
        events: &dyn RunnerEvents,
        cancel: &dyn CancelCheck,
    ) -> Result<Option<RunnerResult>, RunnerError> {
        let Some(params) = request.container() else {
            return self.process.run(request, events, cancel).await;
        };
        if let Some(auth) = &params.auth {
            registry_login(&params.executable, auth).await?;
        }
        let root = std::path::Path::new(CONTAINER_RUNNER_ROOT);
        let inner = command_line(request, root);
        let env = runner_env(request, root);
        let argv = container_command(request, params, &env, inner);
        // Values are passed through the podman process env, never on argv.
        let cwd = request.private_data_dir().to_path_buf();
        self.process.run_argv(request, argv, env, &cwd, events, cancel).await.map(Some)
    }
}

/// `podman run` command line for `inner`.
pub(crate) fn container_command(
    request: &RunnerRequest,
    params: &ContainerParams,
    env: &BTreeMap<String, String>,
    inner: Vec<String>,
) -> Vec<String> {
    let mut argv = vec![
        params.executable.clone(),
        "run".to_string(),
        "--rm".to_string(),
        "--tty".to_string(),
        "--interactive".to_string(),
        "--workdir".to_string(),
        format!("{CONTAINER_RUNNER_ROOT}/project"),
        "-v".to_string(),
        format!("{}/:{CONTAINER_RUNNER_ROOT}/:Z", request.private_data_dir().display()),
    ];
    for mount in &params.volume_mounts {
        argv.extend(["-v".to_string(), mount.clone()]);
    }
    for key in env.keys() {
        argv.extend(["--env".to_string(), key.clone()]);
    }
    argv.extend(params.options.iter().cloned());
    argv.extend([format!("--name=ansible_runner_{}", request.ident()), params.image.clone()]);
    argv.extend(inner);
    argv
}

async fn registry_login(executable: &str, auth: &ContainerAuth) -> Result<(), RunnerError> {
    let login_error = |message: String| RunnerError::RegistryLogin { host: auth.host.clone(), message };
    let mut cmd = Command::new(executable);
    cmd.args(["login", "--username", &auth.username, "--password-stdin"]);
    if !auth.verify_ssl {
        cmd.arg("--tls-verify=false");
    }
    cmd.arg(&auth.host)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = cmd.spawn().map_err(|e| login_error(e.to_string()))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(auth.password.as_bytes()).await?;
    }
    let output = tokio::time::timeout(REGISTRY_LOGIN_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| login_error(format!("timed out after {}s", REGISTRY_LOGIN_TIMEOUT.as_secs())))??;
    if !output.status.success() {
        return Err(login_error(String::from_utf8_lossy(&output.stderr).trim().to_string()));
    }
    tracing::debug!(host = %auth.host, "registry login succeeded");
    Ok(())
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
