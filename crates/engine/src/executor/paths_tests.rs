// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;
use yare::parameterized;

#[parameterized(
    defaults_only = { None, "/runner/requirements_roles:~/.ansible/roles:/usr/share/ansible/roles:/etc/ansible/roles" },
    override_first = { Some("/opt/roles"), "/runner/requirements_roles:/opt/roles:~/.ansible/roles:/usr/share/ansible/roles:/etc/ansible/roles" },
    duplicate_kept_once = { Some("/etc/ansible/roles:/x"), "/runner/requirements_roles:/etc/ansible/roles:/x:~/.ansible/roles:/usr/share/ansible/roles" },
)]
fn search_path_priority(override_paths: Option<&str>, expected: &str) {
    assert_eq!(merge_search_path(override_paths, DEFAULT_ROLES_PATH, "requirements_roles"), expected);
}

#[test]
fn reads_only_the_defaults_section() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("ansible.cfg"),
        "[galaxy]\nroles_path = /nope\n\n[defaults]\n# comment\nroles_path = ./roles\ncollections_path: ./collections\nforks = 5\n",
    )
    .unwrap();

    let values = read_ansible_config(dir.path(), &["roles_path", "collections_path"]);
    assert_eq!(values.get("roles_path").map(String::as_str), Some("./roles"));
    assert_eq!(values.get("collections_path").map(String::as_str), Some("./collections"));
    assert!(!values.contains_key("forks"));
}

#[test]
fn missing_config_is_empty() {
    let dir = TempDir::new().unwrap();
    assert!(read_ansible_config(dir.path(), &["roles_path"]).is_empty());
}

#[test]
fn env_override_beats_ansible_cfg() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ansible.cfg"), "[defaults]\nroles_path = /cfg\ncollections_path = /cfg-c\n")
        .unwrap();
    let mut env = Env::new();
    env.insert("ANSIBLE_ROLES_PATH".into(), "/env".into());

    apply_search_paths(&mut env, dir.path(), &SEARCH_PATHS);

    assert!(env["ANSIBLE_ROLES_PATH"].starts_with("/runner/requirements_roles:/env:"));
    assert!(!env["ANSIBLE_ROLES_PATH"].contains("/cfg"));
    assert!(env["ANSIBLE_COLLECTIONS_PATH"].starts_with("/runner/requirements_collections:/cfg-c:"));
}
