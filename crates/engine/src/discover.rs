// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Playbook and inventory discovery in a project checkout.
//!
//! Line-based checks rather than YAML parsing, so files with invalid YAML
//! still show up.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use walkdir::{DirEntry, WalkDir};

/// Inventory listings stop growing past this many entries.
pub const MAX_INVENTORY_LISTING: usize = 50;

#[allow(clippy::expect_used)]
static PLAYBOOK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*?-?\s*?(?:hosts|(?:ansible\.builtin\.)?import_playbook):\s*?.*?$")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static INVENTORY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.=\[\]]").expect("constant regex pattern is valid"));

/// Directories that never hold playbooks or inventories of their own.
const SKIPPED_DIRS: [&str; 4] = ["roles", "tasks", "group_vars", "host_vars"];

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') && entry.file_type().is_dir() {
        return true;
    }
    entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref())
}

fn files(root: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
}

fn relative(root: &Path, entry: &DirEntry) -> Option<String> {
    entry.path().strip_prefix(root).ok().map(|p| p.display().to_string())
}

fn sort_case_insensitive(items: &mut [String]) {
    items.sort_by_key(|s| s.to_lowercase());
}

/// Relative paths of the playbooks under `root`.
pub fn discover_playbooks(root: &Path) -> Vec<String> {
    let mut playbooks: Vec<String> = files(root)
        .filter(|e| could_be_playbook(e.path()))
        .filter_map(|e| relative(root, &e))
        .collect();
    sort_case_insensitive(&mut playbooks);
    playbooks
}

/// Relative paths of files under `root` that look like inventories.
pub fn discover_inventories(root: &Path) -> Vec<String> {
    let mut inventories = Vec::new();
    for entry in files(root) {
        if !could_be_inventory(entry.path()) {
            continue;
        }
        if let Some(path) = relative(root, &entry) {
            inventories.push(path);
        }
        if inventories.len() > MAX_INVENTORY_LISTING {
            break;
        }
    }
    sort_case_insensitive(&mut inventories);
    inventories
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().into_owned())
}

/// A `.yml`/`.yaml` file with a `hosts:` or `import_playbook:` line, or a
/// vault-encrypted one.
pub fn could_be_playbook(path: &Path) -> bool {
    if !matches!(extension(path).as_deref(), Some("yml" | "yaml")) {
        return false;
    }
    let Ok(file) = File::open(path) else {
        return false;
    };
    for (n, line) in BufReader::new(file).split(b'\n').enumerate() {
        let Ok(line) = line else {
            return false;
        };
        let line = String::from_utf8_lossy(&line);
        if PLAYBOOK_LINE.is_match(&line) || (n == 0 && line.starts_with("$ANSIBLE_VAULT;")) {
            return true;
        }
    }
    false
}

/// Inventory extensions and executables always count; other files must
/// have no extension and start every one of their first ten lines with an
/// inventory character.
pub fn could_be_inventory(path: &Path) -> bool {
    let executable = path.metadata().is_ok_and(|m| m.permissions().mode() & 0o111 != 0);
    match extension(path).as_deref() {
        Some("yml" | "yaml" | "ini") => return true,
        _ if executable => return true,
        Some(_) => return false,
        None => {}
    }
    let Ok(file) = File::open(path) else {
        return false;
    };
    BufReader::new(file)
        .split(b'\n')
        .take(10)
        .all(|line| line.is_ok_and(|l| INVENTORY_LINE.is_match(&String::from_utf8_lossy(&l))))
}

#[cfg(test)]
#[path = "discover_tests.rs"]
mod tests;
