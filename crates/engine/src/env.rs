// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine crate.

use std::path::PathBuf;
use std::time::Duration;

/// Settings file: `AX_CONFIG`.
pub fn config_path() -> Option<PathBuf> {
    std::env::var("AX_CONFIG").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Root under which private data dirs are created.
pub fn isolation_base_path() -> Option<PathBuf> {
    std::env::var("AX_ISOLATION_BASE_PATH").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Root holding the project checkouts, lock files and caches.
pub fn projects_root() -> Option<PathBuf> {
    std::env::var("AX_PROJECTS_ROOT").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// `AX_CLEANUP_PATHS=0` keeps private data dirs around for debugging.
pub fn cleanup_paths() -> Option<bool> {
    std::env::var("AX_CLEANUP_PATHS").ok().and_then(|s| parse_bool(&s))
}

/// Tracing filter directive, e.g. `ax_engine=debug`.
pub fn log_filter() -> Option<String> {
    std::env::var("AX_LOG").ok().filter(|s| !s.is_empty())
}

/// Directory for the rolling log file; stderr only when unset.
pub fn log_dir() -> Option<PathBuf> {
    std::env::var("AX_LOG_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Source tree lock poll interval override
pub fn lock_poll_interval() -> Option<Duration> {
    std::env::var("AX_LOCK_POLL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
