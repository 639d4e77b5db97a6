// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-defined credential types.
//!
//! A custom type declares env, extra var and file templates that reference
//! its inputs as `{{ field }}`. The rendered file is addressed in the other
//! templates as `{{ tower.filename }}`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use ax_core::Credential;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::{write_error, CredentialInjector, InjectionTarget, InjectorError, PrivateDataWriter};

/// Variables a custom type may never set.
pub const ENV_BLOCKLIST: &[&str] = &[
    "VIRTUAL_ENV",
    "PATH",
    "PYTHONPATH",
    "JOB_ID",
    "INVENTORY_ID",
    "INVENTORY_SOURCE_ID",
    "INVENTORY_UPDATE_ID",
    "AD_HOC_COMMAND_ID",
    "REST_API_URL",
    "REST_API_TOKEN",
    "MAX_EVENT_RES",
    "CALLBACK_QUEUE",
    "CALLBACK_CONNECTION",
    "CACHE",
    "JOB_CALLBACK_DEBUG",
    "INVENTORY_HOSTVARS",
    "AWX_HOST",
    "PROJECT_REVISION",
    "SUPERVISOR_CONFIG_PATH",
];

const FILENAME_VAR: &str = "tower.filename";

/// Regex for `{{ name }}` references.
#[allow(clippy::expect_used)]
static TEMPLATE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("constant regex pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomInjector {
    pub env: BTreeMap<String, String>,
    pub extra_vars: BTreeMap<String, String>,
    pub file: Option<String>,
    /// Inputs whose values must not appear in the safe environment.
    pub secret_fields: Vec<String>,
}

impl CustomInjector {
    fn references_secret(&self, template: &str) -> bool {
        TEMPLATE_VAR
            .captures_iter(template)
            .any(|c| self.secret_fields.iter().any(|s| s == &c[1]))
    }
}

/// Replace `{{ name }}` references; unknown names render empty.
fn render(template: &str, credential: &Credential, filename: Option<&str>) -> String {
    TEMPLATE_VAR
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            if name == FILENAME_VAR {
                return filename.unwrap_or_default().to_string();
            }
            credential.input(name).unwrap_or_default()
        })
        .into_owned()
}

impl CredentialInjector for CustomInjector {
    fn inject(
        &self,
        credential: &Credential,
        target: &mut InjectionTarget,
        private_data: &dyn PrivateDataWriter,
    ) -> Result<(), InjectorError> {
        let filename = match &self.file {
            Some(template) => {
                let contents = render(template, credential, None);
                let host_path = private_data
                    .write_file(None, &contents, Some("env"), 0o600)
                    .map_err(write_error(credential))?;
                Some(private_data.runner_path(&host_path))
            }
            None => None,
        };

        for (key, template) in &self.env {
            if ENV_BLOCKLIST.contains(&key.as_str()) {
                tracing::warn!(credential_id = %credential.id, env = %key, "custom credential may not set variable");
                continue;
            }
            let value = render(template, credential, filename.as_deref());
            if self.references_secret(template) {
                target.set_secret(key.clone(), value);
            } else {
                target.set(key.clone(), value);
            }
        }
        for (key, template) in &self.extra_vars {
            let value = render(template, credential, filename.as_deref());
            target.extra_vars.insert(key.clone(), serde_json::Value::String(value));
        }
        Ok(())
    }
}
