// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read and restore the HEAD of a local git checkout.
//!
//! Only what source-tree coordination needs: compare HEAD with a pinned
//! revision, remember where HEAD was, and put it back afterwards.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;

use crate::subprocess::{run_with_timeout, GIT_COMMAND_TIMEOUT};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),
    #[error("git {op} failed in {}: {stderr}", path.display())]
    Failed { op: &'static str, path: PathBuf, stderr: String },
    #[error("{0}")]
    Command(String),
}

/// Where HEAD points in a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// On a local branch.
    Branch(String),
    /// Detached at a commit.
    Detached(String),
}

fn git(path: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(path)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

async fn run(path: &Path, op: &'static str, args: &[&str]) -> Result<String, GitError> {
    if !path.is_dir() {
        return Err(GitError::NotARepository(path.to_path_buf()));
    }
    let mut cmd = git(path);
    cmd.args(args);
    let output = run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, op).await.map_err(GitError::Command)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepository(path.to_path_buf()));
        }
        return Err(GitError::Failed { op, path: path.to_path_buf(), stderr });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Full hash of the commit HEAD resolves to.
pub async fn head_commit(path: &Path) -> Result<String, GitError> {
    run(path, "rev-parse", &["rev-parse", "--verify", "HEAD"]).await
}

pub async fn head_state(path: &Path) -> Result<HeadState, GitError> {
    match run(path, "symbolic-ref", &["symbolic-ref", "--quiet", "--short", "HEAD"]).await {
        Ok(branch) => Ok(HeadState::Branch(branch)),
        Err(GitError::Failed { op: "symbolic-ref", .. }) => {
            Ok(HeadState::Detached(head_commit(path).await?))
        }
        Err(e) => Err(e),
    }
}

pub async fn checkout(path: &Path, branch: &str) -> Result<(), GitError> {
    run(path, "checkout", &["checkout", "--quiet", branch]).await.map(|_| ())
}

/// Point HEAD at `commit` and reset index and working tree to it.
pub async fn reset_to_commit(path: &Path, commit: &str) -> Result<(), GitError> {
    run(path, "checkout", &["checkout", "--quiet", "--detach", commit]).await?;
    run(path, "reset", &["reset", "--quiet", "--hard", commit]).await.map(|_| ())
}

/// Put HEAD back where [`head_state`] found it.
pub async fn restore(path: &Path, state: &HeadState) -> Result<(), GitError> {
    match state {
        HeadState::Branch(branch) => checkout(path, branch).await,
        HeadState::Detached(commit) => reset_to_commit(path, commit).await,
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
