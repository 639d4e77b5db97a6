// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded execution of short helper commands (git, podman login).

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

/// Upper bound for local git inspection and checkout commands.
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for registry logins before a containerized run.
pub const REGISTRY_LOGIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Run `cmd` to completion, killing it if it outlives `timeout`.
///
/// `label` names the command in error messages.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, String> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("{label} failed to run: {e}")),
        Err(_) => Err(format!("{label} timed out after {}s", timeout.as_secs())),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
