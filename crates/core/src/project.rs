// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Projects: the shared, durable source checkouts that jobs run against.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::environment::ExecutionEnvironment;
use crate::id::{JobId, OrganizationId, ProjectId};

crate::str_enum! {
    /// Source control backend. Manual projects have no SCM type.
    pub enum ScmType {
        Git => "git",
        Svn => "svn",
        Insights => "insights",
        Archive => "archive",
    }
}

/// Directory under the projects root that holds per-project dependency caches.
pub const CACHE_DIR_NAME: &str = ".__awx_cache";

/// Explanation recorded when a job depends on a project whose last update failed.
pub const FAILED_UPDATE_REASON: &str =
    "The project revision for this job template is unknown due to a failed update.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
    #[serde(default)]
    pub scm_type: Option<ScmType>,
    #[serde(default)]
    pub scm_url: String,
    #[serde(default)]
    pub scm_branch: String,
    #[serde(default)]
    pub scm_refspec: String,
    #[serde(default)]
    pub scm_clean: bool,
    #[serde(default)]
    pub scm_track_submodules: bool,
    #[serde(default)]
    pub scm_delete_on_update: bool,
    /// Revision of the last successful update; empty when unknown.
    #[serde(default)]
    pub scm_revision: String,
    #[serde(default)]
    pub allow_override: bool,
    /// Checkout directory name relative to the projects root.
    pub local_path: String,
    /// Key of the dependency cache written by the last successful update.
    #[serde(default)]
    pub cache_id: String,
    #[serde(default)]
    pub credential: Option<Credential>,
    /// Galaxy credentials inherited from the owning organization, in priority order.
    #[serde(default)]
    pub galaxy_credentials: Vec<Credential>,
    #[serde(default)]
    pub default_environment: Option<ExecutionEnvironment>,
    #[serde(default)]
    pub playbook_files: Vec<String>,
    #[serde(default)]
    pub inventory_files: Vec<String>,
    #[serde(default)]
    pub last_update_failed: bool,
    #[serde(default)]
    pub last_update_id: Option<JobId>,
}

impl Project {
    pub fn project_path(&self, projects_root: &Path) -> PathBuf {
        projects_root.join(&self.local_path)
    }

    /// Lock file guarding the checkout; a sibling of the checkout directory.
    pub fn lock_path(&self, projects_root: &Path) -> PathBuf {
        projects_root.join(format!("{}.lock", self.local_path))
    }

    pub fn cache_path(&self, projects_root: &Path) -> PathBuf {
        projects_root.join(CACHE_DIR_NAME).join(&self.local_path)
    }

    /// Why jobs against this project must not start, if its last update failed.
    pub fn reason_if_failed(&self) -> Option<&'static str> {
        self.last_update_failed.then_some(FAILED_UPDATE_REASON)
    }

    pub fn is_manual(&self) -> bool {
        self.scm_type.is_none()
    }
}

crate::test_builder! {
    pub struct ProjectBuilder => Project {
        id: ProjectId = ProjectId::new(1),
        name: String = "demo-project",
        organization_id: Option<OrganizationId> = None::<OrganizationId>,
        scm_type: Option<ScmType> = None::<ScmType>,
        scm_url: String = "",
        scm_branch: String = "",
        scm_refspec: String = "",
        scm_clean: bool = false,
        scm_track_submodules: bool = false,
        scm_delete_on_update: bool = false,
        scm_revision: String = "",
        allow_override: bool = false,
        local_path: String = "_1__demo_project",
        cache_id: String = "",
        credential: Option<Credential> = None::<Credential>,
        galaxy_credentials: Vec<Credential> = Vec::new(),
        default_environment: Option<ExecutionEnvironment> = None::<ExecutionEnvironment>,
        playbook_files: Vec<String> = Vec::new(),
        inventory_files: Vec<String> = Vec::new(),
        last_update_failed: bool = false,
        last_update_id: Option<JobId> = None::<JobId>,
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
