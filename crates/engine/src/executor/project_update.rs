// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project updates: refresh the shared checkout with the bundled
//! `project_update.yml` playbook and install roles and collections into the
//! project's dependency cache.

use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use async_trait::async_trait;
use ax_adapters::Execution;
use ax_core::{
    Credential, CredentialCategory, JobKind, JobStatus, JobType, LaunchType, Project,
    ProjectUpdateDetails, ScmType, UnifiedJob,
};
use ax_storage::{JobUpdate, ProjectPatch};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use url::Url;
use walkdir::WalkDir;

use crate::config::Settings;
use crate::discover::{discover_inventories, discover_playbooks};
use crate::error::{BuildError, StagingError, TaskError};
use crate::executor::{base_passwords, Env, JobExecutor, Passwords, PrivateData, PrivateDataFiles, RunContext};
use crate::extra_vars::ExtraVars;
use crate::lock::SourceTreeLock;
use crate::sync::branch_override;

pub const PROJECT_UPDATE_PLAYBOOK: &str = "project_update.yml";

/// Cache entry being written by the update in progress.
const STAGE_DIR: &str = "stage";
/// Cache entries are renamed with this prefix before they are deleted.
const DELETE_PREFIX: &str = ".~~delete~~";
const ALL_BRANCHES_REFSPEC: &str = "refs/heads/*:refs/remotes/origin/*";

pub struct ProjectUpdateExecutor;

fn details(job: &UnifiedJob) -> Result<&ProjectUpdateDetails, TaskError> {
    job.as_project_update()
        .ok_or_else(|| TaskError::Internal(format!("{} is not a project update", job.log_format())))
}

fn project<'a>(ctx: &'a RunContext<'_>) -> Result<&'a Project, TaskError> {
    ctx.state.project.as_ref().ok_or_else(|| TaskError::Internal("project not loaded".to_string()))
}

fn is_override(project: &Project, details: &ProjectUpdateDetails) -> bool {
    branch_override(project, &details.scm_branch).is_some()
}

/// Cache entry this update writes. Overrides and checks get their own
/// entry so the project's main cache survives them.
pub fn update_cache_id(job: &UnifiedJob) -> String {
    job.id.to_string()
}

/// Cache entry to keep when the update commits its own.
fn keep_cache_id(job: &UnifiedJob, project: &Project, details: &ProjectUpdateDetails) -> String {
    if is_override(project, details) || details.job_type == JobType::Check {
        project.cache_id.clone()
    } else {
        update_cache_id(job)
    }
}

fn scm_credential(job: &UnifiedJob) -> Option<&Credential> {
    job.credentials_of(CredentialCategory::SourceControl).next()
}

#[async_trait]
impl JobExecutor for ProjectUpdateExecutor {
    fn kind(&self) -> JobKind {
        JobKind::ProjectUpdate
    }

    fn extra_volume_mounts(&self, ctx: &RunContext<'_>) -> Vec<String> {
        let Some(project) = ctx.state.project.as_ref() else {
            return Vec::new();
        };
        let root = &ctx.settings().projects_root;
        let project_path = project.project_path(root).display().to_string();
        let cache_path = project.cache_path(root).display().to_string();
        vec![format!("{project_path}:{project_path}:z"), format!("{cache_path}:{cache_path}:z")]
    }

    fn default_timeout(&self, settings: &Settings) -> u64 {
        settings.default_project_update_timeout
    }

    async fn pre_run_hook(&self, ctx: &mut RunContext<'_>) -> Result<(), TaskError> {
        let project_id = details(&ctx.job)?.project_id;
        let project = ctx.store().load_project(project_id).await?;
        let root = ctx.settings().projects_root.clone();

        if ctx.job.launch_type != LaunchType::Sync {
            let lock = SourceTreeLock::new(project.lock_path(&root), ctx.settings().lock_poll_interval());
            ctx.state.source_lock = Some(lock.acquire(ctx.job.id, ctx.cancel).await?);
        }

        let project_path = project.project_path(&root);
        create_dir(&project_path)?;

        let stage = project.cache_path(&root).join(STAGE_DIR);
        if stage.exists() {
            tracing::warn!(path = %stage.display(), "stage unexpectedly existed before update");
            remove_tree(&stage)?;
        }
        create_dir(&stage)?;

        ctx.state.project = Some(project);
        Ok(())
    }

    async fn build_project_dir(&self, ctx: &mut RunContext<'_>) -> Result<(), TaskError> {
        let dest = ctx.private_data.project_dir();
        copy_tree(&ctx.settings().playbooks_dir, &dest, &[])?;
        Ok(())
    }

    fn build_private_data(&self, ctx: &RunContext<'_>) -> PrivateData {
        let mut data = PrivateData::default();
        if let Some(cred) = scm_credential(&ctx.job) {
            if cred.has_input("ssh_key_data") {
                data.credentials.push((cred.clone(), cred.input_or_default("ssh_key_data")));
            }
        }
        data
    }

    fn build_passwords(&self, ctx: &RunContext<'_>, _runtime: &Passwords) -> Result<Passwords, TaskError> {
        let mut passwords = base_passwords();
        if let Some(cred) = scm_credential(&ctx.job) {
            passwords.insert("scm_key_unlock".into(), cred.input_or_default("ssh_key_unlock"));
            passwords.insert("scm_username".into(), cred.input_or_default("username"));
            passwords.insert("scm_password".into(), cred.input_or_default("password"));
        }
        Ok(passwords)
    }

    fn password_prompts(&self, _passwords: &Passwords) -> IndexMap<String, String> {
        [
            (r"Username for.*:\s*?$", "scm_username"),
            (r"Password for.*:\s*?$", "scm_password"),
            (r"Password:\s*?$", "scm_password"),
            (r"\S+?@\S+?'s\s+?password:\s*?$", "scm_password"),
            (r"Enter passphrase for .*:\s*?$", "scm_key_unlock"),
            (r"Bad passphrase, try again for .*:\s*?$", ""),
            (r"^Are you sure you want to continue connecting \(yes/no\)\?\s*?$", "yes"),
        ]
        .into_iter()
        .map(|(pattern, key)| (pattern.to_string(), key.to_string()))
        .collect()
    }

    fn build_extra_vars(&self, ctx: &RunContext<'_>) -> Result<Option<ExtraVars>, TaskError> {
        let details = details(&ctx.job)?;
        let project = project(ctx)?;
        let settings = ctx.settings();
        let (scm_url, mut vars) = scm_url_extra_vars(details, scm_credential(&ctx.job));

        let scm_branch = if details.job_type == JobType::Run && !is_override(project, details) {
            if !project.scm_revision.is_empty() {
                project.scm_revision.clone()
            } else if details.scm_branch.is_empty() {
                return Err(BuildError::NoRevision.into());
            } else {
                details.scm_branch.clone()
            }
        } else if details.scm_branch.is_empty() {
            "HEAD".to_string()
        } else {
            details.scm_branch.clone()
        };

        let galaxy_defined = !project.galaxy_credentials.is_empty();
        if !galaxy_defined && (settings.roles_enabled || settings.collections_enabled) {
            tracing::warn!(
                project_id = %project.id,
                "Galaxy role/collection syncing is enabled, but no credentials are configured"
            );
        }

        let project_path = project.project_path(&settings.projects_root);
        let local_path = Path::new(&project.local_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let projects_root = settings.projects_root.display().to_string();

        vars.insert("projects_root".into(), json!(projects_root.trim_end_matches('/')));
        vars.insert("local_path".into(), json!(local_path));
        vars.insert("project_path".into(), json!(project_path.display().to_string()));
        vars.insert("insights_url".into(), json!(settings.insights_url_base));
        vars.insert("scm_type".into(), json!(details.scm_type.map(|t| t.as_str()).unwrap_or_default()));
        vars.insert("scm_url".into(), json!(scm_url));
        vars.insert("scm_branch".into(), json!(scm_branch));
        vars.insert("scm_clean".into(), json!(details.scm_clean));
        vars.insert("scm_track_submodules".into(), json!(details.scm_track_submodules));
        vars.insert("scm_delete_on_update".into(), json!(details.scm_delete_on_update));
        vars.insert("roles_enabled".into(), json!(galaxy_defined && settings.roles_enabled));
        vars.insert("collections_enabled".into(), json!(galaxy_defined && settings.collections_enabled));

        if !details.scm_refspec.is_empty() {
            vars.insert("scm_refspec".into(), json!(details.scm_refspec));
        } else if project.allow_override {
            vars.insert("scm_refspec".into(), json!(ALL_BRANCHES_REFSPEC));
        }
        if details.scm_type == Some(ScmType::Archive) {
            let tmp = project_path.join(".ansible_awx").join("tmp");
            vars.insert("ansible_remote_tmp".into(), json!(tmp.display().to_string()));
        }
        Ok(Some(ExtraVars::trusted(vars)))
    }

    fn build_args(&self, ctx: &RunContext<'_>, _passwords: &Passwords) -> Result<Vec<String>, TaskError> {
        let details = details(&ctx.job)?;
        let mut args = Vec::new();
        if ctx.settings().project_update_vvv {
            args.push("-vvv".to_string());
        }
        if !details.job_tags.is_empty() {
            args.push("-t".to_string());
            args.push(details.job_tags.clone());
        }
        Ok(args)
    }

    fn build_env(&self, ctx: &RunContext<'_>, _files: &PrivateDataFiles, env: &mut Env) -> Result<(), TaskError> {
        let settings = ctx.settings();
        env.insert("ANSIBLE_RETRY_FILES_ENABLED".into(), "False".into());
        env.insert("ANSIBLE_ASK_PASS".into(), "False".into());
        env.insert("ANSIBLE_BECOME_ASK_PASS".into(), "False".into());
        env.insert("DISPLAY".into(), String::new());
        env.insert("TMP".into(), settings.isolation_base_path.display().to_string());
        env.insert("PROJECT_UPDATE_ID".into(), ctx.job.id.to_string());
        if settings.galaxy_ignore_certs {
            env.insert("ANSIBLE_GALAXY_IGNORE".into(), "True".into());
        }

        let mut servers = Vec::new();
        for (i, cred) in project(ctx)?.galaxy_credentials.iter().enumerate() {
            env.insert(format!("ANSIBLE_GALAXY_SERVER_SERVER{i}_URL"), cred.input_or_default("url"));
            if let Some(token) = cred.input("token").filter(|t| !t.is_empty()) {
                env.insert(format!("ANSIBLE_GALAXY_SERVER_SERVER{i}_TOKEN"), token);
            }
            if let Some(auth_url) = cred.input("auth_url").filter(|u| !u.is_empty()) {
                env.insert(format!("ANSIBLE_GALAXY_SERVER_SERVER{i}_AUTH_URL"), auth_url);
            }
            servers.push(format!("server{i}"));
        }
        if !servers.is_empty() {
            env.insert("ANSIBLE_GALAXY_SERVER_LIST".into(), servers.join(","));
        }
        Ok(())
    }

    async fn build_inventory(&self, _ctx: &RunContext<'_>) -> Result<Option<String>, TaskError> {
        Ok(Some("localhost,".to_string()))
    }

    fn build_execution(&self, _ctx: &RunContext<'_>) -> Result<Execution, TaskError> {
        Ok(Execution::Playbook { playbook: PROJECT_UPDATE_PLAYBOOK.to_string() })
    }

    async fn post_run_hook(&self, ctx: &mut RunContext<'_>, status: JobStatus) -> Result<(), TaskError> {
        let result = commit_update(ctx, status).await;
        if ctx.job.launch_type != LaunchType::Sync {
            if let Some(guard) = ctx.state.source_lock.take() {
                guard.release();
            }
        }
        result?;

        let details = details(&ctx.job)?;
        if details.job_type == JobType::Check && !matches!(status, JobStatus::Failed | JobStatus::Canceled) {
            let project = project(ctx)?;
            let project_path = project.project_path(&ctx.settings().projects_root);
            let mut patch = ProjectPatch::new()
                .playbook_files(discover_playbooks(&project_path))
                .inventory_files(discover_inventories(&project_path));
            match &ctx.state.new_revision {
                Some(revision) => patch = patch.scm_revision(revision.clone()),
                None if status == JobStatus::Successful => {
                    tracing::error!(job = %ctx.job.log_format(), "could not find scm revision in check");
                }
                None => {}
            }
            ctx.store().update_project(project.id, &patch).await?;
        }
        Ok(())
    }

    async fn final_run_hook(&self, ctx: &mut RunContext<'_>, status: JobStatus) -> Result<(), TaskError> {
        if ctx.job.launch_type == LaunchType::Sync {
            return Ok(());
        }
        let project_id = details(&ctx.job)?.project_id;
        let patch = ProjectPatch::new()
            .last_update_failed(status != JobStatus::Successful)
            .last_update_id(ctx.job.id);
        ctx.store().update_project(project_id, &patch).await?;
        Ok(())
    }
}

/// Record the new revision, commit or discard the staged cache, and copy
/// the tree into the private data dir of the job this sync runs for.
async fn commit_update(ctx: &mut RunContext<'_>, status: JobStatus) -> Result<(), TaskError> {
    if let Some(revision) = ctx.state.new_revision.clone() {
        ctx.update(JobUpdate::new().scm_revision(revision)).await?;
    }
    let details = details(&ctx.job)?.clone();
    let project = project(ctx)?.clone();
    let root = ctx.settings().projects_root.clone();
    let base = project.cache_path(&root);
    let stage = base.join(STAGE_DIR);
    let cache_id = update_cache_id(&ctx.job);

    if status == JobStatus::Successful && details.has_tag_prefix("install_") {
        clear_project_cache(&base, &keep_cache_id(&ctx.job, &project, &details));
        let cache = base.join(&cache_id);
        if stage.exists() {
            if cache.exists() {
                tracing::warn!(path = %cache.display(), "rewriting cache, performance may suffer");
                remove_tree(&cache)?;
            }
            fs::rename(&stage, &cache)
                .map_err(|source| StagingError::Copy { from: stage.clone(), to: cache.clone(), source })?;
            tracing::debug!(job = %ctx.job.log_format(), path = %cache.display(), "wrote dependency cache");
        }
        if !is_override(&project, &details) && details.job_type != JobType::Check {
            let updated = ctx.store().update_project(project.id, &ProjectPatch::new().cache_id(cache_id.clone())).await?;
            ctx.state.project = Some(updated);
        }
    } else if stage.exists() {
        remove_tree(&stage)?;
    }

    if let Some(parent) = ctx.parent_private_data_dir.clone() {
        if status == JobStatus::Successful {
            make_local_copy(&project, &cache_id, &root, &parent, ctx.settings())?;
        }
    }
    Ok(())
}

/// Remote URL with credentials embedded the way the scm module expects,
/// plus the extra vars that carry the rest.
pub fn scm_url_extra_vars(details: &ProjectUpdateDetails, credential: Option<&Credential>) -> (String, Map<String, Value>) {
    let mut vars = Map::new();
    let raw = details.scm_url.as_str();
    let parsed = Url::parse(raw).ok();
    let scheme = match &parsed {
        Some(url) => url.scheme().to_string(),
        None if is_scp_like(raw) => "ssh".to_string(),
        None => String::new(),
    };

    let mut username = credential.map(|c| c.input_or_default("username")).unwrap_or_default();
    let mut password = credential.map(|c| c.input_or_default("password")).unwrap_or_default();
    if let Some(url) = &parsed {
        if !url.username().is_empty() {
            username = url.username().to_string();
        }
        if let Some(p) = url.password() {
            password = p.to_string();
        }
    }

    let mut url_username = Some(username.clone()).filter(|u| !u.is_empty());
    let mut url_password = Some(password.clone()).filter(|p| !p.is_empty());
    if url_username.is_some() {
        match details.scm_type {
            Some(ScmType::Svn) => {
                vars.insert("scm_username".into(), json!(username));
                vars.insert("scm_password".into(), json!(password));
                url_password = None;
                if scheme != "svn+ssh" {
                    url_username = None;
                }
            }
            _ if scheme.ends_with("ssh") => url_password = None,
            Some(ScmType::Insights | ScmType::Archive) => {
                vars.insert("scm_username".into(), json!(username));
                vars.insert("scm_password".into(), json!(password));
            }
            _ => {}
        }
    }

    if details.scm_type == Some(ScmType::Git) && scheme.ends_with("ssh") {
        vars.insert("scm_accept_hostkey".into(), json!("true"));
    }

    let url = match parsed {
        Some(url) => embed_credentials(url, url_username.as_deref(), url_password.as_deref()).unwrap_or_else(|| raw.to_string()),
        None => raw.to_string(),
    };
    (url, vars)
}

/// `user@host:path`
fn is_scp_like(url: &str) -> bool {
    !url.contains("://")
        && url.split_once(':').is_some_and(|(host, _)| !host.is_empty() && !host.contains('/'))
}

fn embed_credentials(mut url: Url, username: Option<&str>, password: Option<&str>) -> Option<String> {
    if url.scheme() == "file" || url.cannot_be_a_base() {
        return Some(url.to_string());
    }
    url.set_username(username.unwrap_or_default()).ok()?;
    url.set_password(username.and(password)).ok()?;
    Some(url.to_string())
}

/// Remove every cache entry except `keep_value` and the stage in progress.
/// Entries are renamed first so a half-deleted one is never read.
pub fn clear_project_cache(cache_dir: &Path, keep_value: &str) {
    let Ok(entries) = fs::read_dir(cache_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == keep_value || name == STAGE_DIR {
            continue;
        }
        let old_path = entry.path();
        let new_path = cache_dir.join(format!("{DELETE_PREFIX}{name}"));
        let removed = fs::rename(&old_path, &new_path).and_then(|()| fs::remove_dir_all(&new_path));
        if let Err(e) = removed {
            tracing::warn!(path = %old_path.display(), error = %e, "could not remove cache directory");
        }
    }
}

/// Copy the checkout into `<private_data_dir>/project` and the enabled
/// dependency folders of cache entry `cache_id` next to it.
pub fn make_local_copy(
    project: &Project,
    cache_id: &str,
    projects_root: &Path,
    private_data_dir: &Path,
    settings: &Settings,
) -> Result<(), StagingError> {
    let project_path = project.project_path(projects_root);
    copy_tree(&project_path, &private_data_dir.join("project"), &[".git"])?;

    let cache = project.cache_path(projects_root).join(cache_id);
    let folders = [
        ("requirements_collections", settings.collections_enabled),
        ("requirements_roles", settings.roles_enabled),
    ];
    for (folder, enabled) in folders {
        let src = cache.join(folder);
        if !enabled || cache_id.is_empty() || !src.exists() {
            continue;
        }
        let dest = private_data_dir.join(folder);
        copy_tree(&src, &dest, &[])?;
        tracing::debug!(project_id = %project.id, path = %dest.display(), "prepared from cache");
    }
    Ok(())
}

/// Recursive copy that keeps symlinks as links and skips entries named in
/// `skip`.
pub(crate) fn copy_tree(src: &Path, dest: &Path, skip: &[&str]) -> Result<(), StagingError> {
    let copy_error = |from: &Path, to: &Path| {
        let (from, to) = (from.to_path_buf(), to.to_path_buf());
        move |source| StagingError::Copy { from, to, source }
    };
    let walker = WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !skip.iter().any(|s| e.file_name() == *s));
    for entry in walker {
        let entry = entry.map_err(|e| StagingError::Copy {
            from: src.to_path_buf(),
            to: dest.to_path_buf(),
            source: e.into(),
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(copy_error(entry.path(), &target))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(copy_error(entry.path(), &target))?;
            std::os::unix::fs::symlink(&link, &target).map_err(copy_error(entry.path(), &target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(copy_error(entry.path(), &target))?;
        }
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), StagingError> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
        .map_err(|source| StagingError::Create { path: path.to_path_buf(), source })
}

fn remove_tree(path: &Path) -> Result<(), StagingError> {
    fs::remove_dir_all(path).map_err(|source| StagingError::Write { path: path.to_path_buf(), source })
}

#[cfg(test)]
#[path = "project_update_tests.rs"]
mod tests;
