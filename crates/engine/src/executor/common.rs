// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pieces shared by the kinds that drive ansible against an inventory.

use ax_core::{Credential, InventoryId, UnifiedJob};
use ax_storage::ScriptParams;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::error::{BuildError, TaskError};
use crate::executor::{Passwords, PrivateData, RunContext};
use crate::extra_vars::sanitize_jinja;

/// Privilege escalation methods ansible knows how to prompt for.
pub const BECOME_METHODS: &[&str] = &[
    "sudo", "su", "pbrun", "pfexec", "dzdo", "pmrun", "runas", "enable", "doas", "ksu",
    "machinectl", "sesu",
];

/// Answers every run can give.
pub fn base_passwords() -> Passwords {
    [("yes", "yes"), ("no", "no"), ("", "")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// `""` and `ASK` mean nobody supplied a value.
pub fn is_answer(value: &str) -> bool {
    !value.is_empty() && value != "ASK"
}

/// Runtime value first, then the credential's stored input.
fn answer(runtime: &Passwords, key: &str, credential: &Credential, input: &str) -> Option<String> {
    let value = runtime.get(key).cloned().unwrap_or_else(|| credential.input_or_default(input));
    is_answer(&value).then_some(value)
}

/// Passwords carried by the machine credential.
pub(crate) fn machine_passwords(
    job: &UnifiedJob,
    runtime: &Passwords,
    with_vault: bool,
    passwords: &mut Passwords,
) {
    let Some(cred) = job.machine_credential() else {
        return;
    };
    let mut fields = vec![
        ("ssh_key_unlock", "ssh_key_unlock"),
        ("ssh_password", "password"),
        ("become_password", "become_password"),
    ];
    if with_vault {
        fields.push(("vault_password", "vault_password"));
    }
    for (key, input) in fields {
        if let Some(value) = answer(runtime, key, cred, input) {
            passwords.insert(key.to_string(), value);
        }
    }
}

/// One password per vault credential; a vault id keys `vault_password.<id>`.
pub(crate) fn vault_passwords(
    job: &UnifiedJob,
    runtime: &Passwords,
    passwords: &mut Passwords,
) -> Result<(), BuildError> {
    for cred in job.vault_credentials() {
        let key = match cred.input("vault_id").filter(|id| !id.is_empty()) {
            Some(id) => {
                let key = format!("vault_password.{id}");
                if passwords.contains_key(&key) {
                    return Err(BuildError::DuplicateVaultId(id));
                }
                key
            }
            None => "vault_password".to_string(),
        };
        if let Some(value) = answer(runtime, &key, cred, "vault_password") {
            passwords.insert(key, value);
        }
    }
    Ok(())
}

/// Prompts shared by playbook runs and ad hoc commands.
pub(crate) fn ssh_prompts() -> IndexMap<String, String> {
    let mut prompts = IndexMap::new();
    let mut add = |pattern: String, key: &str| {
        prompts.insert(pattern, key.to_string());
    };
    add(r"Enter passphrase for .*:\s*?$".to_string(), "ssh_key_unlock");
    add(r"Bad passphrase, try again for .*:\s*?$".to_string(), "");
    for method in BECOME_METHODS {
        add(format!(r"{method} password.*:\s*?$"), "become_password");
        add(format!(r"{} password.*:\s*?$", method.to_uppercase()), "become_password");
    }
    add(r"BECOME password.*:\s*?$".to_string(), "become_password");
    add(r"SSH password:\s*?$".to_string(), "ssh_password");
    add(r"Password:\s*?$".to_string(), "ssh_password");
    prompts
}

/// Connection settings read from the machine credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MachineOptions {
    pub ssh_username: String,
    pub become_method: String,
    pub become_username: String,
}

impl MachineOptions {
    /// The user defaults to `root`; the worker's own account is meaningless on targets.
    pub fn from_job(job: &UnifiedJob) -> Result<Self, BuildError> {
        let cred = job.machine_credential();
        let input = |field: &str| cred.map(|c| c.input_or_default(field)).unwrap_or_default();
        let user = input("username");
        let user = if user.is_empty() { "root".to_string() } else { user };
        Ok(Self {
            ssh_username: sanitize_jinja(&user)?.to_string(),
            become_method: sanitize_jinja(&input("become_method"))?.to_string(),
            become_username: sanitize_jinja(&input("become_username"))?.to_string(),
        })
    }
}

/// `-v` repeated, at most five times.
pub(crate) fn verbosity_flag(verbosity: u32) -> Option<String> {
    (verbosity > 0).then(|| format!("-{}", "v".repeat(verbosity.min(5) as usize)))
}

/// Key material from `ssh_key_data` and signed certificates from
/// `ssh_public_key_data`.
pub(crate) fn ssh_key_private_data<'a>(credentials: impl IntoIterator<Item = &'a Credential>) -> PrivateData {
    let mut data = PrivateData::default();
    for cred in credentials {
        if cred.has_input("ssh_key_data") {
            data.credentials.push((cred.clone(), cred.input_or_default("ssh_key_data")));
        }
        if cred.has_input("ssh_public_key_data") {
            data.certificates.push((cred.clone(), cred.input_or_default("ssh_public_key_data")));
        }
    }
    data
}

/// `awx_*` and `tower_*` variables describing the run, plus `extra`.
pub(crate) fn meta_vars(job: &UnifiedJob, extra: &[(&str, Value)]) -> Map<String, Value> {
    let mut fields: Vec<(&str, Value)> = vec![
        ("job_id", json!(job.id.get())),
        ("job_launch_type", json!(job.launch_type.as_str())),
    ];
    if let Some(workflow) = job.workflow_job_id {
        fields.push(("workflow_job_id", json!(workflow.get())));
    }
    fields.extend(extra.iter().cloned());

    let mut vars = Map::new();
    for prefix in ["awx", "tower"] {
        for (name, value) in &fields {
            vars.insert(format!("{prefix}_{name}"), value.clone());
        }
    }
    vars.insert("awx_execution_node".to_string(), json!(job.execution_node));
    vars
}

/// Write `inventory/<name>` as an executable script printing the inventory
/// JSON. Returns the runner path.
pub(crate) async fn write_inventory_script(
    ctx: &RunContext<'_>,
    inventory: InventoryId,
    name: &str,
    params: ScriptParams,
) -> Result<String, TaskError> {
    let data = ctx.store().inventory_script(inventory, params).await?;
    let json = serde_json::to_string(&data)
        .map_err(|e| BuildError::Render { what: "inventory", message: e.to_string() })?;
    let script = format!("#!/bin/sh\ncat <<'AX_INVENTORY_EOF'\n{json}\nAX_INVENTORY_EOF\n");
    let path = ctx.private_data.write_private_data_file(Some(name), &script, Some("inventory"), 0o700)?;
    Ok(ctx.runner_path(&path))
}

#[cfg(test)]
#[path = "common_tests.rs"]
mod tests;
