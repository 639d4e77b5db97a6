// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `env/extravars` rendering.
//!
//! Extra vars may come from users who must not be able to run templates on
//! the controller, so strings carrying Jinja markers are emitted with the
//! `!unsafe` tag, which ansible never templates.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::Value as Yaml;

use crate::config::JinjaPolicy;
use crate::error::BuildError;

const JINJA_MARKERS: [&str; 3] = ["{{", "{%", "{#"];

/// Variables for one run plus the top-level keys trusted to template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraVars {
    pub vars: Map<String, Value>,
    pub safe_keys: BTreeSet<String>,
    /// Built by the engine alone; nothing is marked.
    pub trusted: bool,
}

impl ExtraVars {
    pub fn new(vars: Map<String, Value>) -> Self {
        Self { vars, safe_keys: BTreeSet::new(), trusted: false }
    }

    pub fn trusted(vars: Map<String, Value>) -> Self {
        Self { trusted: true, ..Self::new(vars) }
    }

    pub fn with_safe_keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.safe_keys.extend(keys);
        self
    }
}

pub fn has_jinja(s: &str) -> bool {
    JINJA_MARKERS.iter().any(|m| s.contains(m))
}

/// Reject a value that would be templated.
pub fn sanitize_jinja(s: &str) -> Result<&str, BuildError> {
    if has_jinja(s) {
        return Err(BuildError::Jinja);
    }
    Ok(s)
}

pub fn render(extra: &ExtraVars, policy: JinjaPolicy) -> Result<String, BuildError> {
    let mapping = extra
        .vars
        .iter()
        .map(|(key, value)| {
            let mark = match policy {
                _ if extra.trusted => false,
                JinjaPolicy::Always => false,
                JinjaPolicy::Template => !extra.safe_keys.contains(key),
                JinjaPolicy::Never => true,
            };
            (Yaml::String(key.clone()), to_yaml(value, mark))
        })
        .collect();
    serde_yaml::to_string(&Yaml::Mapping(mapping))
        .map_err(|e| BuildError::Render { what: "extra vars", message: e.to_string() })
}

fn to_yaml(value: &Value, mark: bool) -> Yaml {
    match value {
        Value::Null => Yaml::Null,
        Value::Bool(b) => Yaml::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Yaml::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Yaml::Number(u.into())
            } else {
                n.as_f64().map_or(Yaml::Null, |f| Yaml::Number(f.into()))
            }
        }
        Value::String(s) if mark && has_jinja(s) => Yaml::Tagged(Box::new(TaggedValue {
            tag: Tag::new("unsafe"),
            value: Yaml::String(s.clone()),
        })),
        Value::String(s) => Yaml::String(s.clone()),
        Value::Array(items) => Yaml::Sequence(items.iter().map(|v| to_yaml(v, mark)).collect()),
        Value::Object(map) => Yaml::Mapping(
            map.iter().map(|(k, v)| (Yaml::String(k.clone()), to_yaml(v, mark))).collect(),
        ),
    }
}

#[cfg(test)]
#[path = "extra_vars_tests.rs"]
mod tests;
