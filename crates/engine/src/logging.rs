// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing subscriber setup for binaries embedding the engine.

use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_NAME: &str = "ax-engine.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {message}")]
    Filter { filter: String, message: String },
    #[error("failed to create log directory {path}: {source}")]
    Dir { path: PathBuf, source: std::io::Error },
    #[error("tracing subscriber already installed")]
    AlreadyInstalled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// Filter directive; `AX_LOG` and then `info` when unset.
    pub filter: Option<String>,
    /// Write a daily rolling file here in addition to stderr.
    pub dir: Option<PathBuf>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self { filter: crate::env::log_filter(), dir: crate::env::log_dir() }
    }

    fn directive(&self) -> String {
        self.filter.clone().unwrap_or_else(|| DEFAULT_FILTER.to_string())
    }

    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        let directive = self.directive();
        EnvFilter::try_new(&directive)
            .map_err(|e| LoggingError::Filter { filter: directive, message: e.to_string() })
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init_tracing(settings: &LogSettings) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = settings.env_filter()?;
    let stderr = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let (file, guard) = match &settings.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|source| LoggingError::Dir { path: dir.clone(), source })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)?;
    Ok(guard)
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
