// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credentials attached to jobs, projects and execution environments.
//!
//! Inputs arrive already decrypted from the persistence layer; the engine
//! treats every input value as secret unless an injector says otherwise.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::CredentialId;

crate::str_enum! {
    /// Broad credential category, used to pick credentials by role.
    pub enum CredentialCategory {
        Machine => "ssh",
        Vault => "vault",
        Network => "net",
        SourceControl => "scm",
        Cloud => "cloud",
        Insights => "insights",
        Galaxy => "galaxy",
        Registry => "registry",
        Kubernetes => "kubernetes",
        Token => "token",
        External => "external",
    }
}

/// Credential type: the category plus the namespace that selects an injector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialKind {
    pub category: CredentialCategory,
    /// Injector namespace, e.g. `ssh`, `scm`, `aws`, `openstack`.
    pub namespace: String,
}

impl CredentialKind {
    pub fn new(category: CredentialCategory, namespace: impl Into<String>) -> Self {
        Self { category, namespace: namespace.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub name: String,
    pub kind: CredentialKind,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

impl Credential {
    /// True when the input exists and is not an empty string.
    pub fn has_input(&self, field: &str) -> bool {
        match self.inputs.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Input rendered as a string; booleans and numbers are stringified.
    pub fn input(&self, field: &str) -> Option<String> {
        match self.inputs.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn input_or_default(&self, field: &str) -> String {
        self.input(field).unwrap_or_default()
    }

    pub fn input_bool(&self, field: &str) -> bool {
        match self.inputs.get(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "True" | "1"),
            _ => false,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.kind.namespace
    }
}

crate::test_builder! {
    pub struct CredentialBuilder => Credential {
        id: CredentialId = CredentialId::new(1),
        name: String = "cred",
        kind: CredentialKind = CredentialKind::new(CredentialCategory::Machine, "ssh"),
        inputs: BTreeMap<String, Value> = BTreeMap::new(),
    }
}

#[cfg(any(test, feature = "test-support"))]
impl CredentialBuilder {
    pub fn input(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.inputs.insert(field.to_string(), value.into());
        self
    }

    pub fn category(mut self, category: CredentialCategory, namespace: &str) -> Self {
        self.kind = CredentialKind::new(category, namespace);
        self
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
