// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project sync coordination.
//!
//! A job that runs against a project first decides whether the shared
//! checkout is usable as-is. If not, it spawns a nested project update with
//! `launch_type=sync` and runs it on this worker, under the project's
//! source tree lock. The nested update copies the tree into the job's
//! private data dir before the lock is released.

use std::path::Path;

use ax_adapters::git::{self, HeadState};
use ax_core::{JobKind, JobStatus, JobType, LaunchType, Project, ScmType, UnifiedJob};
use ax_storage::{JobUpdate, NewProjectUpdate};

use crate::error::TaskError;
use crate::executor::{make_local_copy, RunContext};
use crate::lock::SourceTreeLock;

/// Tag prefix of the checkout refresh action.
pub const UPDATE_TAG_PREFIX: &str = "update_";
pub const INSTALL_ROLES: &str = "install_roles";
pub const INSTALL_COLLECTIONS: &str = "install_collections";

/// Actions a sync must run before a job of `kind` can use `project`, as
/// project update playbook tags. Empty means the checkout is usable.
pub async fn sync_needs(
    project: &Project,
    projects_root: &Path,
    branch_override: Option<&str>,
    kind: JobKind,
) -> Vec<String> {
    let Some(scm_type) = project.scm_type else {
        tracing::debug!(project_id = %project.id, "manual project, no sync");
        return Vec::new();
    };
    let project_path = project.project_path(projects_root);
    let update = format!("{UPDATE_TAG_PREFIX}{scm_type}");
    let mut needs = Vec::new();

    if kind == JobKind::InventoryUpdate {
        needs.push(update);
    } else if !project_path.exists() {
        tracing::debug!(project_id = %project.id, path = %project_path.display(), "checkout missing, syncing");
        needs.push(update);
    } else if scm_type == ScmType::Git && !project.scm_revision.is_empty() && branch_override.is_none() {
        match git::head_commit(&project_path).await {
            Ok(head) if head == project.scm_revision => {
                tracing::debug!(project_id = %project.id, revision = %head, "checkout at pinned revision, skipping sync");
            }
            Ok(head) => {
                tracing::debug!(project_id = %project.id, head = %head, revision = %project.scm_revision, "checkout moved, syncing");
                needs.push(update);
            }
            Err(e) => {
                tracing::debug!(project_id = %project.id, error = %e, "could not read checkout head, syncing");
                needs.push(update);
            }
        }
    } else {
        needs.push(update);
    }

    let cache = project.cache_path(projects_root).join(&project.cache_id);
    if project.cache_id.is_empty() || !cache.exists() || branch_override.is_some() {
        needs.push(INSTALL_ROLES.to_string());
        needs.push(INSTALL_COLLECTIONS.to_string());
    }
    needs
}

/// Create the nested project update that runs `needs` for `job`.
pub fn project_sync_request(
    job: &UnifiedJob,
    project: &Project,
    needs: &[String],
    branch_override: Option<&str>,
    node: &str,
) -> NewProjectUpdate {
    let refreshes = needs.iter().any(|n| n.starts_with(UPDATE_TAG_PREFIX));
    NewProjectUpdate {
        project_id: project.id,
        launch_type: LaunchType::Sync,
        job_type: JobType::Run,
        job_tags: needs.join(","),
        status: JobStatus::Running,
        instance_group: job.instance_group.clone(),
        execution_node: node.to_string(),
        controller_node: node.to_string(),
        scm_branch: branch_override.map(str::to_string),
        scm_clean: branch_override.map(|_| true),
        scm_revision: (!refreshes).then(|| project.scm_revision.clone()),
        execution_environment: None,
    }
}

/// Branch the job asks for, when it differs from the project's own.
pub fn branch_override<'a>(project: &Project, scm_branch: &'a str) -> Option<&'a str> {
    (!scm_branch.is_empty() && scm_branch != project.scm_branch).then_some(scm_branch)
}

/// Make `<pdd>/project` hold the project tree the job should run.
///
/// Holds the project's source tree lock throughout. A branch override moves
/// the shared checkout, so its previous head is restored before the lock
/// is released.
pub async fn sync_and_copy(ctx: &mut RunContext<'_>, project: &Project, scm_branch: &str) -> Result<(), TaskError> {
    let root = ctx.settings().projects_root.clone();
    let lock = SourceTreeLock::new(project.lock_path(&root), ctx.settings().lock_poll_interval());
    let guard = lock.acquire(ctx.job.id, ctx.cancel).await?;

    if let Some(reason) = project.reason_if_failed() {
        guard.release();
        return Err(TaskError::precondition(JobStatus::Failed, reason));
    }

    let branch = branch_override(project, scm_branch);
    let project_path = project.project_path(&root);
    let original_head = if project.scm_type == Some(ScmType::Git) && branch.is_some() && project_path.exists() {
        match git::head_state(&project_path).await {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(project_id = %project.id, error = %e, "could not record checkout head");
                None
            }
        }
    } else {
        None
    };

    let result = sync_and_copy_without_lock(ctx, project, branch).await;

    if let Some(state) = original_head {
        restore_head(&project_path, &state).await;
    }
    guard.release();
    result
}

async fn restore_head(project_path: &Path, state: &HeadState) {
    match git::restore(project_path, state).await {
        Ok(()) => tracing::debug!(path = %project_path.display(), head = ?state, "restored checkout head"),
        Err(e) => tracing::error!(path = %project_path.display(), error = %e, "failed to restore checkout head"),
    }
}

async fn sync_and_copy_without_lock(
    ctx: &mut RunContext<'_>,
    project: &Project,
    branch: Option<&str>,
) -> Result<(), TaskError> {
    let root = ctx.settings().projects_root.clone();
    let needs = sync_needs(project, &root, branch, ctx.job.kind()).await;

    if needs.is_empty() {
        ctx.update(JobUpdate::new().scm_revision(project.scm_revision.clone())).await?;
        make_local_copy(project, &project.cache_id, &root, ctx.private_data.path(), ctx.settings())?;
        return Ok(());
    }

    let request = project_sync_request(&ctx.job, project, &needs, branch, &ctx.settings().node_name);
    let sync = ctx.store().create_project_update(request).await?;
    tracing::info!(
        job_id = %ctx.job.id,
        project_update_id = %sync.id,
        tags = %needs.join(","),
        "spawned project sync"
    );
    ctx.update(JobUpdate::new().project_update(sync.id)).await?;

    let outcome = ctx.nested.run_nested(sync.id, ctx.private_data.path().to_path_buf()).await;
    let sync = ctx.store().load_job(sync.id).await?;
    match outcome {
        Ok(_) => {
            ctx.update(JobUpdate::new().scm_revision(sync.scm_revision.clone())).await?;
            Ok(())
        }
        Err(failure) if sync.status != JobStatus::Canceled => {
            tracing::warn!(job_id = %ctx.job.id, project_update_id = %sync.id, error = %failure, "project sync failed");
            Err(TaskError::Sync { update_id: sync.id, explanation: sync_failure_explanation(&sync) })
        }
        Err(_) => {
            ctx.reload().await?;
            if ctx.job.cancel_flag {
                tracing::debug!(job_id = %ctx.job.id, "project sync canceled with the job");
            }
            Ok(())
        }
    }
}

pub fn sync_failure_explanation(sync: &UnifiedJob) -> String {
    format!(
        r#"Previous Task Failed: {{"job_type": "project_update", "job_name": "{}", "job_id": "{}"}}"#,
        sync.name, sync.id
    )
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
