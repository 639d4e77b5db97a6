// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kind-independent pieces of the runner request: private data files, the
//! base and redacted environments, container parameters, prompt answers
//! and the files the runner reads from `env/`.

use std::path::PathBuf;
use std::sync::LazyLock;

use ax_adapters::{ContainerAuth, ContainerParams, RunnerSettings, HIDDEN_PASSWORD};
use ax_core::{JobId, UnifiedJob};
use indexmap::IndexMap;
use regex::Regex;

use crate::config::Settings;
use crate::error::{BuildError, StagingError};
use crate::executor::{ArgsFile, Env, Passwords, PrivateData, PrivateDataFiles};
use crate::staging::{PrivateDataDir, SECRET_MODE};

const OPENSSH_KEY_MARKER: &str = "OPENSSH PRIVATE KEY";

/// Mount options accepted in `isolation_show_paths`.
const MOUNT_OPTIONS: [&str; 4] = ["z", "O", "ro", "rw"];

#[allow(clippy::expect_used)]
static SECRET_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)API|TOKEN|KEY|SECRET|PASS").expect("constant regex pattern is valid")
});

/// `scheme://user:password@`
#[allow(clippy::expect_used)]
static URL_CREDENTIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z][A-Za-z0-9+.\-]*://)([^:@/\s]+):([^@/\s]+)@")
        .expect("constant regex pattern is valid")
});

/// Write key material for the run.
///
/// Keys for namespaces in `ssh_agent_namespaces` are returned for the
/// runner's ssh-agent and never touch the disk; the rest land in `env/`.
/// When several agent keys are present the last one wins.
pub fn write_private_data_files(
    private_data: &PrivateDataDir,
    job_id: JobId,
    data: PrivateData,
    ssh_agent_namespaces: &[String],
) -> Result<PrivateDataFiles, StagingError> {
    let mut files = PrivateDataFiles::default();
    for (credential, mut key) in data.credentials {
        if key.contains(OPENSSH_KEY_MARKER) && !key.ends_with('\n') {
            key.push('\n');
        }
        if ssh_agent_namespaces.iter().any(|ns| ns == credential.namespace()) {
            files.ssh_key = Some(key);
            continue;
        }
        let path = private_data.write_private_data_file(None, &key, Some("env"), SECRET_MODE)?;
        let runner_path = ax_adapters::PrivateDataWriter::runner_path(private_data, &path);
        files.credentials.insert(credential.id, runner_path);
    }
    let artifacts = format!("artifacts/{job_id}");
    for (_, certificate) in data.certificates {
        private_data.write_private_data_file(
            Some("ssh_key_data-cert.pub"),
            &certificate,
            Some(&artifacts),
            SECRET_MODE,
        )?;
    }
    Ok(files)
}

/// Environment every kind starts from.
pub fn base_env(settings: &Settings, job: &UnifiedJob, private_data: &PrivateDataDir) -> Result<Env, BuildError> {
    if job.execution_environment.is_none() {
        return Err(BuildError::NoExecutionEnvironment(job.kind()));
    }
    let mut env = settings.ansible_env.clone();
    env.extend(settings.task_env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env.insert("AWX_PRIVATE_DATA_DIR".to_string(), private_data.path().display().to_string());
    Ok(env)
}

/// Copy of `env` that is safe to persist and log.
pub fn build_safe_env(env: &Env) -> Env {
    env.iter()
        .map(|(key, value)| {
            let redacted = if key == "AWS_ACCESS_KEY_ID" {
                value.clone()
            } else if key.starts_with("ANSIBLE_")
                && !key.starts_with("ANSIBLE_NET")
                && !key.starts_with("ANSIBLE_GALAXY_SERVER")
            {
                value.clone()
            } else if SECRET_KEY.is_match(key) {
                HIDDEN_PASSWORD.to_string()
            } else {
                redact_url_credentials(value)
            };
            (key.clone(), redacted)
        })
        .collect()
}

pub fn redact_url_credentials(value: &str) -> String {
    URL_CREDENTIALS.replace_all(value, format!("${{1}}${{2}}:{HIDDEN_PASSWORD}@")).into_owned()
}

/// Container parameters for the job's execution environment.
pub fn container_params(
    settings: &Settings,
    job: &UnifiedJob,
    extra_mounts: Vec<String>,
) -> Result<ContainerParams, BuildError> {
    let ee = job
        .execution_environment
        .as_ref()
        .ok_or(BuildError::NoExecutionEnvironment(job.kind()))?;

    let mut options = vec!["--user=root".to_string()];
    options.extend(settings.default_container_run_options.iter().cloned());

    let auth = match &ee.credential {
        Some(cred) => {
            if !["host", "username", "password"].iter().all(|f| cred.has_input(f)) {
                return Err(BuildError::RegistryCredential);
            }
            Some(ContainerAuth {
                host: cred.input_or_default("host"),
                username: cred.input_or_default("username"),
                password: cred.input_or_default("password"),
                verify_ssl: cred.input_bool("verify_ssl"),
            })
        }
        None => None,
    };

    if let Some(pull) = ee.pull {
        options.push(format!("--pull={pull}"));
    }

    let mut volume_mounts: Vec<String> =
        settings.isolation_show_paths.iter().map(|p| volume_mount(p)).collect();
    volume_mounts.extend(extra_mounts);

    Ok(ContainerParams {
        image: ee.image.clone(),
        executable: settings.podman_binary.clone(),
        options,
        auth,
        volume_mounts,
    })
}

/// Normalize one `isolation_show_paths` entry to `src:dest:option`.
fn volume_mount(path: &str) -> String {
    let parts: Vec<&str> = path.split(':').collect();
    match parts.as_slice() {
        [src, dest, option] => {
            let option = if MOUNT_OPTIONS.contains(option) {
                *option
            } else {
                tracing::warn!(path, "unsupported volume mount type, using \"z\" instead");
                "z"
            };
            format!("{src}:{dest}:{option}")
        }
        [src, dest] => format!("{src}:{dest}:z"),
        _ => format!("{path}:{path}:z"),
    }
}

/// Prompt regex -> answer. Prompts whose key has no password get "".
pub fn expect_passwords(prompts: &IndexMap<String, String>, passwords: &Passwords) -> IndexMap<String, String> {
    prompts
        .iter()
        .map(|(pattern, key)| (pattern.clone(), passwords.get(key).cloned().unwrap_or_default()))
        .collect()
}

/// Effective timeout: a local 0 defers to the global value, a negative local
/// value disables the timeout.
pub fn instance_timeout(local: i64, global: u64) -> u64 {
    match local {
        0 => global,
        t if t < 0 => 0,
        t => t.unsigned_abs(),
    }
}

pub fn runner_settings(settings: &Settings, job_timeout: u64) -> RunnerSettings {
    RunnerSettings {
        job_timeout,
        suppress_ansible_output: true,
        suppress_output_file: settings.runner_suppress_output_file,
        idle_timeout: (settings.default_job_idle_timeout > 0).then_some(settings.default_job_idle_timeout),
    }
}

/// Write `env/settings`.
pub fn write_runner_settings(private_data: &PrivateDataDir, settings: &RunnerSettings) -> Result<PathBuf, BuildError> {
    let json = serde_json::to_string(settings)
        .map_err(|e| BuildError::Render { what: "runner settings", message: e.to_string() })?;
    Ok(private_data.write_private_data_file(Some("settings"), &json, Some("env"), SECRET_MODE)?)
}

pub fn write_args_file(private_data: &PrivateDataDir, kind: ArgsFile, args: &[String]) -> Result<PathBuf, StagingError> {
    match kind {
        ArgsFile::Cmdline => {
            private_data.write_private_data_file(Some("cmdline"), &args2cmdline(args), Some("env"), SECRET_MODE)
        }
        ArgsFile::Args => private_data.write_private_data_file(Some("args"), &args.join(" "), None, SECRET_MODE),
    }
}

/// Shell-quote and join.
pub fn args2cmdline(args: &[String]) -> String {
    args.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ")
}

fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let safe = arg.chars().all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
