// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Private data dir staging.
//!
//! Each run gets a fresh `0700` directory under the isolation root holding
//! everything the runner needs: `project/`, `inventory/`, `env/` and the
//! runner's `artifacts/`. Secrets are written `0600`. The directory is
//! removed when the [`PrivateDataDir`] is dropped unless cleanup is off.

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use ax_adapters::{PrivateDataWriter, CONTAINER_RUNNER_ROOT};
use ax_core::JobId;

use crate::config::Settings;
use crate::error::StagingError;

const DIR_MODE: u32 = 0o700;
pub const SECRET_MODE: u32 = 0o600;

#[derive(Debug)]
pub struct PrivateDataDir {
    path: PathBuf,
    /// Root of the dir as the runner sees it.
    runner_root: PathBuf,
    cleanup: bool,
}

impl PrivateDataDir {
    /// Create `<isolation root>/<prefix><random>` with `inventory/` and `env/`.
    pub fn create(settings: &Settings, job_id: JobId) -> Result<Self, StagingError> {
        let base = &settings.isolation_base_path;
        if !base.is_dir() {
            return Err(StagingError::MissingBase(base.clone()));
        }
        let prefix = settings.job_folder_prefix.replace("%s", &job_id.to_string());
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let path = base.join(format!("{prefix}{suffix}"));
        let create_error = |source| StagingError::Create { path: base.clone(), source };

        DirBuilder::new().mode(DIR_MODE).create(&path).map_err(create_error)?;
        // umask may have narrowed the mode
        fs::set_permissions(&path, fs::Permissions::from_mode(DIR_MODE)).map_err(create_error)?;
        for sub in ["inventory", "env"] {
            DirBuilder::new().mode(DIR_MODE).create(path.join(sub)).map_err(create_error)?;
        }
        tracing::debug!(%job_id, path = %path.display(), "created private data dir");
        Ok(Self { runner_root: path.clone(), path, cleanup: settings.cleanup_paths })
    }

    /// Address files under the container mount instead of the host path.
    pub fn containerized(mut self, containerized: bool) -> Self {
        self.runner_root =
            if containerized { PathBuf::from(CONTAINER_RUNNER_ROOT) } else { self.path.clone() };
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn runner_root(&self) -> &Path {
        &self.runner_root
    }

    pub fn project_dir(&self) -> PathBuf {
        self.path.join("project")
    }

    pub fn artifact_dir(&self, job_id: JobId) -> PathBuf {
        self.path.join("artifacts").join(job_id.to_string())
    }

    /// Make sure `project/` exists; the runner requires it.
    pub fn ensure_project_dir(&self) -> Result<PathBuf, StagingError> {
        let dir = self.project_dir();
        if !dir.exists() {
            DirBuilder::new()
                .mode(DIR_MODE)
                .create(&dir)
                .map_err(|source| StagingError::Create { path: dir.clone(), source })?;
        }
        Ok(dir)
    }

    /// Write `data` to `<sub_dir>/<name>`; a random name when `name` is `None`.
    pub fn write_private_data_file(
        &self,
        name: Option<&str>,
        data: &str,
        sub_dir: Option<&str>,
        mode: u32,
    ) -> Result<PathBuf, StagingError> {
        let dir = match sub_dir {
            Some(sub) => self.path.join(sub),
            None => self.path.clone(),
        };
        if !dir.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(&dir)
                .map_err(|source| StagingError::Create { path: dir.clone(), source })?;
        }
        let path = match name {
            Some(name) => dir.join(name),
            None => dir.join(format!("tmp{}", uuid::Uuid::new_v4().simple())),
        };
        write_with_mode(&path, data, mode)
            .map_err(|source| StagingError::Write { path: path.clone(), source })?;
        Ok(path)
    }

    /// Keep the directory after the run, e.g. for debugging.
    pub fn keep(&mut self) {
        self.cleanup = false;
    }

    /// Remove now, reporting failures instead of logging them on drop.
    pub fn cleanup(mut self) -> io::Result<()> {
        let cleanup = std::mem::replace(&mut self.cleanup, false);
        if cleanup && self.path.exists() {
            fs::remove_dir_all(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for PrivateDataDir {
    fn drop(&mut self) {
        if self.cleanup && self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove private data dir");
            }
        }
    }
}

impl PrivateDataWriter for PrivateDataDir {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, name: Option<&str>, data: &str, sub_dir: Option<&str>, mode: u32) -> io::Result<PathBuf> {
        self.write_private_data_file(name, data, sub_dir, mode).map_err(|e| match e {
            StagingError::Write { source, .. }
            | StagingError::Create { source, .. }
            | StagingError::Copy { source, .. } => source,
            StagingError::MissingBase(path) => {
                io::Error::new(io::ErrorKind::NotFound, path.display().to_string())
            }
        })
    }

    fn runner_path(&self, host_path: &Path) -> String {
        match host_path.strip_prefix(&self.path) {
            Ok(rel) => self.runner_root.join(rel).display().to_string(),
            Err(_) => host_path.display().to_string(),
        }
    }
}

pub(crate) fn write_with_mode(path: &Path, data: &str, mode: u32) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).mode(mode).open(path)?;
    file.write_all(data.as_bytes())?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(test)]
#[path = "staging_tests.rs"]
mod tests;
