// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Role and collection search paths.

use std::collections::BTreeMap;
use std::path::Path;

use ax_adapters::CONTAINER_RUNNER_ROOT;

use crate::executor::Env;

pub(crate) const DEFAULT_ROLES_PATH: &str = "~/.ansible/roles:/usr/share/ansible/roles:/etc/ansible/roles";
pub(crate) const DEFAULT_COLLECTIONS_PATH: &str = "~/.ansible/collections:/usr/share/ansible/collections";

/// `(env var, ansible.cfg key, cache folder, default)`
pub(crate) const SEARCH_PATHS: [(&str, &str, &str, &str); 2] = [
    ("ANSIBLE_ROLES_PATH", "roles_path", "requirements_roles", DEFAULT_ROLES_PATH),
    ("ANSIBLE_COLLECTIONS_PATH", "collections_path", "requirements_collections", DEFAULT_COLLECTIONS_PATH),
];

/// Values of `keys` in the `[defaults]` section of `<project_dir>/ansible.cfg`.
///
/// A missing or unreadable file yields an empty map.
pub fn read_ansible_config(project_dir: &Path, keys: &[&str]) -> BTreeMap<String, String> {
    let path = project_dir.join("ansible.cfg");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return BTreeMap::new();
    };
    let mut values = BTreeMap::new();
    let mut in_defaults = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_defaults = section.trim() == "defaults";
            continue;
        }
        if !in_defaults {
            continue;
        }
        let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
            continue;
        };
        let key = key.trim();
        if keys.contains(&key) {
            values.insert(key.to_string(), value.trim().to_string());
        }
    }
    values
}

/// `<runner root>/<folder>`, then the override (env value, else ansible.cfg
/// value), then the defaults. Duplicates keep their first position.
pub fn merge_search_path(override_paths: Option<&str>, default: &str, folder: &str) -> String {
    let cache = format!("{CONTAINER_RUNNER_ROOT}/{folder}");
    let mut paths: Vec<&str> = vec![&cache];
    let candidates = override_paths.into_iter().flat_map(|p| p.split(':')).chain(default.split(':'));
    for path in candidates {
        if !path.is_empty() && !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths.join(":")
}

/// Set each of `vars` in `env`, merging what the environment or the
/// project's ansible.cfg already asks for.
pub(crate) fn apply_search_paths(env: &mut Env, project_dir: &Path, vars: &[(&str, &str, &str, &str)]) {
    let keys: Vec<&str> = vars.iter().map(|(_, key, _, _)| *key).collect();
    let config = read_ansible_config(project_dir, &keys);
    for (env_key, config_key, folder, default) in vars {
        let override_paths = env.get(*env_key).or_else(|| config.get(*config_key)).cloned();
        env.insert(env_key.to_string(), merge_search_path(override_paths.as_deref(), default, folder));
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
