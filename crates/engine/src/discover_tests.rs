// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fs;

use super::*;
use tempfile::TempDir;
use yare::parameterized;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn playbooks_are_found_and_sorted() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "site.yml", "---\n- hosts: all\n  tasks: []\n");
    write(root, "Deploy.yaml", "- import_playbook: site.yml\n");
    write(root, "sub/builtin.yml", "- ansible.builtin.import_playbook: x.yml\n");
    write(root, "vaulted.yml", "$ANSIBLE_VAULT;1.1;AES256\n6162\n");
    write(root, "vars.yml", "foo: bar\n");
    write(root, "notes.txt", "- hosts: all\n");
    write(root, "roles/r/tasks/main.yml", "- hosts: all\n");
    write(root, ".github/workflow.yml", "- hosts: all\n");
    write(root, "group_vars/all.yml", "- hosts: all\n");

    assert_eq!(discover_playbooks(root), vec!["Deploy.yaml", "site.yml", "sub/builtin.yml", "vaulted.yml"]);
}

#[test]
fn inventories_by_extension_and_content() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "hosts", "[web]\nweb1 ansible_host=10.0.0.1\n");
    write(root, "prod.ini", "anything goes\n");
    write(root, "README", "# Not an inventory\n");
    write(root, "script.py", "print('hi')\n");

    assert_eq!(discover_inventories(root), vec!["hosts", "prod.ini"]);
}

#[test]
fn executables_count_as_inventories() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "dyn.py", "#!/usr/bin/env python\n");
    let path = dir.path().join("dyn.py");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    assert!(could_be_inventory(&path));
}

#[test]
fn inventory_listing_is_capped() {
    let dir = TempDir::new().unwrap();
    for i in 0..80 {
        write(dir.path(), &format!("inv{i}.ini"), "x\n");
    }
    assert_eq!(discover_inventories(dir.path()).len(), MAX_INVENTORY_LISTING + 1);
}

#[parameterized(
    hosts = { "- hosts: all", true },
    indented = { "  hosts: web", true },
    import = { "- import_playbook: other.yml", true },
    tasks_only = { "- name: x", false },
)]
fn playbook_lines(line: &str, expected: bool) {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "p.yml", &format!("{line}\n"));
    assert_eq!(could_be_playbook(&dir.path().join("p.yml")), expected);
}
