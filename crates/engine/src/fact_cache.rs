// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-host fact cache staged for ansible's `jsonfile` cache plugin.
//!
//! Before the run, each host's stored facts are written to
//! `<dest>/<host name>`. After the run, files newer than the last one we
//! wrote are loaded back, and files the run deleted clear the host's facts.

use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use ax_core::{Host, InventoryId};
use ax_storage::{bulk_update_sorted_by_id, HostField, JobStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use crate::error::StagingError;
use crate::staging::{write_with_mode, SECRET_MODE};

/// Hosts per bulk write when saving facts back.
pub const FACT_CACHE_BATCH: usize = 100;

const FACT_FIELDS: [HostField; 2] = [HostField::AnsibleFacts, HostField::AnsibleFactsModified];

/// Hosts staged for one run and the low water mark for reading them back.
#[derive(Debug, Clone)]
pub struct FactCacheRun {
    pub dir: PathBuf,
    pub hosts: Vec<Host>,
    /// Mtime of the last file written; later files were written by the run.
    pub write_time: Option<SystemTime>,
}

/// Load the inventory's hosts matching `limit` and stage their facts.
pub async fn start_fact_cache(
    store: &dyn JobStore,
    inventory: InventoryId,
    limit: &str,
    dir: &Path,
    timeout_secs: u64,
    now: DateTime<Utc>,
) -> Result<FactCacheRun, crate::error::TaskError> {
    let hosts = store.hosts_for_fact_cache(inventory, limit).await?;
    Ok(write_fact_cache(hosts, dir, timeout_secs, now)?)
}

/// Write one JSON file per host with fresh facts.
///
/// Facts older than `timeout_secs` (0 never expires) are not written. A host
/// whose name would escape `dir` is skipped.
pub fn write_fact_cache(
    hosts: Vec<Host>,
    dir: &Path,
    timeout_secs: u64,
    now: DateTime<Utc>,
) -> Result<FactCacheRun, StagingError> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|source| StagingError::Create { path: dir.to_path_buf(), source })?;

    let expired_before = (timeout_secs > 0)
        .then(|| now - Duration::seconds(i64::try_from(timeout_secs).unwrap_or(i64::MAX)));
    let mut last_written = None;
    let mut written = 0usize;

    for host in &hosts {
        let Some(modified) = host.ansible_facts_modified else {
            continue;
        };
        if expired_before.is_some_and(|cutoff| modified < cutoff) {
            continue;
        }
        let Some(path) = host_file(dir, &host.name) else {
            tracing::error!(host = %host.name, "facts for host could not be cached");
            continue;
        };
        let data = match serde_json::to_string(&host.ansible_facts) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(host = %host.name, error = %e, "could not serialize facts");
                continue;
            }
        };
        match write_with_mode(&path, &data, SECRET_MODE) {
            Ok(()) => {
                written += 1;
                last_written = Some(path);
            }
            Err(e) => tracing::error!(host = %host.name, error = %e, "could not write fact cache file"),
        }
    }

    let write_time = last_written.and_then(|p| fs::metadata(p).and_then(|m| m.modified()).ok());
    tracing::debug!(dir = %dir.display(), hosts = hosts.len(), written, "fact cache staged");
    Ok(FactCacheRun { dir: dir.to_path_buf(), hosts, write_time })
}

/// Read facts back and persist the hosts that changed.
///
/// Returns the number of hosts written.
pub async fn finish_fact_cache(
    store: &dyn JobStore,
    run: FactCacheRun,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let changed = collect_fact_changes(run, now);
    if changed.is_empty() {
        return Ok(0);
    }
    bulk_update_sorted_by_id(store, changed, &FACT_FIELDS, FACT_CACHE_BATCH).await
}

/// Hosts whose facts the run changed, with the new values applied.
pub fn collect_fact_changes(run: FactCacheRun, now: DateTime<Utc>) -> Vec<Host> {
    let FactCacheRun { dir, mut hosts, write_time } = run;
    hosts.sort_by_key(|h| h.id);

    let mut changed = Vec::new();
    for mut host in hosts {
        let Some(path) = host_file(&dir, &host.name) else {
            tracing::error!(host = %host.name, "facts for host could not be cached");
            continue;
        };
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => {
                host.ansible_facts = Value::Object(Map::new());
                host.ansible_facts_modified = Some(now);
                tracing::info!(host = %host.name, "facts cleared");
                changed.push(host);
                continue;
            }
        };
        if write_time.is_some_and(|mark| modified <= mark) {
            tracing::debug!(host = %host.name, "facts unchanged");
            continue;
        }
        let facts = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
        match facts {
            Ok(facts) => {
                host.ansible_facts = facts;
                host.ansible_facts_modified = Some(now);
                tracing::info!(host = %host.name, "facts updated");
                changed.push(host);
            }
            Err(e) => tracing::warn!(host = %host.name, error = %e, "invalid fact cache file, skipping"),
        }
    }
    changed
}

/// `<dir>/<name>`, or `None` when the normalized path leaves `dir`.
fn host_file(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let path = normalize(&dir.join(name));
    (path.starts_with(dir) && path != dir).then_some(path)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
#[path = "fact_cache_tests.rs"]
mod tests;
