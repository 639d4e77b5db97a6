// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local process runner.
//!
//! Spawns the ansible command described by a request, answers password
//! prompts on stdin, forwards output lines as events, and enforces the job
//! and idle timeouts. Cancellation is polled through the [`CancelCheck`].

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use ax_core::JobId;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{
    CancelCheck, Execution, RunnerAdapter, RunnerError, RunnerEvent, RunnerEvents, RunnerRequest,
    RunnerResult, RunnerStatus,
};

/// How often cancellation and timeouts are checked.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long output is still collected after the child has exited.
const EXIT_DRAIN: Duration = Duration::from_secs(1);

/// How long a terminated child gets to exit before it is killed.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Runs ansible directly on this host.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    poll_interval: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Run an explicit command line on behalf of `request`.
    ///
    /// Shared with the container runner, which supplies its own argv.
    pub(crate) async fn run_argv(
        &self,
        request: &RunnerRequest,
        argv: Vec<String>,
        envs: BTreeMap<String, String>,
        cwd: &Path,
        events: &dyn RunnerEvents,
        cancel: &dyn CancelCheck,
    ) -> Result<RunnerResult, RunnerError> {
        let prompts = compile_prompts(request)?;
        let artifact_dir = request.artifact_dir();
        fs::create_dir_all(&artifact_dir)?;

        let argv = match request.ssh_key() {
            Some(key) => wrap_ssh_agent(&artifact_dir, key, argv)?,
            None => argv,
        };
        let (program, rest) = argv.split_first().ok_or(RunnerError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .envs(&envs)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if prompts.is_empty() { Stdio::null() } else { Stdio::piped() })
            .kill_on_drop(true);

        events.on_status("starting");
        tracing::debug!(job_id = %request.ident(), %program, "spawning runner process");
        let mut child = cmd
            .spawn()
            .map_err(|source| RunnerError::Spawn { program: program.clone(), source })?;
        events.on_status("running");

        let (tx, mut rx) = mpsc::channel::<Chunk>(64);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_chunks(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_chunks(stderr, Stream::Stderr, tx.clone()));
        }
        drop(tx);

        let settings = request.settings();
        let mut transcript = Transcript::new(prompts, child.stdin.take(), !settings.suppress_output_file);
        let started = Instant::now();
        let deadline =
            (settings.job_timeout > 0).then(|| started + Duration::from_secs(settings.job_timeout));
        let idle_limit = settings.idle_timeout.filter(|s| *s > 0).map(Duration::from_secs);
        let mut last_output = started;
        let mut tick = tokio::time::interval(self.poll_interval.unwrap_or(POLL_INTERVAL));

        let forced = loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some(chunk) => {
                        last_output = Instant::now();
                        transcript.feed(chunk, events).await;
                    }
                    None => break None,
                },
                _ = tick.tick() => {
                    if cancel.is_canceled().await {
                        break Some(RunnerStatus::Canceled);
                    }
                    let now = Instant::now();
                    if deadline.is_some_and(|d| now >= d) {
                        tracing::info!(job_id = %request.ident(), "job timeout reached");
                        break Some(RunnerStatus::Timeout);
                    }
                    if idle_limit.is_some_and(|limit| now.duration_since(last_output) >= limit) {
                        tracing::info!(job_id = %request.ident(), "idle timeout reached");
                        break Some(RunnerStatus::Timeout);
                    }
                    if matches!(child.try_wait(), Ok(Some(_))) {
                        // Descendants may keep the pipes open after the child exits.
                        let drain = async {
                            while let Some(chunk) = rx.recv().await {
                                transcript.feed(chunk, events).await;
                            }
                        };
                        let _ = tokio::time::timeout(EXIT_DRAIN, drain).await;
                        break None;
                    }
                }
            }
        };

        let result = match forced {
            Some(status) => {
                terminate(&mut child, request.ident()).await;
                let exit = child.wait().await?;
                RunnerResult::new(status, exit.code().unwrap_or(-1))
            }
            None => {
                let exit = child.wait().await?;
                let status =
                    if exit.success() { RunnerStatus::Successful } else { RunnerStatus::Failed };
                RunnerResult::new(status, exit.code().unwrap_or(-1))
            }
        };
        transcript.flush(events);

        write_artifacts(&artifact_dir, &result, transcript.output.as_deref())?;
        events.on_status(result.status.as_str());
        events.on_finished(&result);
        Ok(result)
    }
}

/// SIGTERM first so ansible can clean up, SIGKILL after [`KILL_GRACE`].
async fn terminate(child: &mut Child, job_id: JobId) {
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {
                if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
                    return;
                }
                tracing::info!(%job_id, "runner ignored SIGTERM, killing");
            }
            Err(e) => tracing::debug!(%job_id, error = %e, "SIGTERM failed"),
        }
    }
    if let Err(e) = child.start_kill() {
        tracing::warn!(%job_id, error = %e, "failed to kill runner process");
    }
}

#[async_trait]
impl RunnerAdapter for ProcessRunner {
    async fn run(
        &self,
        request: &RunnerRequest,
        events: &dyn RunnerEvents,
        cancel: &dyn CancelCheck,
    ) -> Result<Option<RunnerResult>, RunnerError> {
        let root = request.private_data_dir().to_path_buf();
        let argv = command_line(request, &root);
        let envs = runner_env(request, &root);
        let project = request.project_dir();
        let cwd = if project.is_dir() { project } else { root };
        self.run_argv(request, argv, envs, &cwd, events, cancel).await.map(Some)
    }
}

/// Command line for `request` with private data files addressed under `root`.
pub(crate) fn command_line(request: &RunnerRequest, root: &Path) -> Vec<String> {
    let extravars = request.private_data_dir().join("env").join("extravars");
    let extravars = extravars.is_file().then(|| format!("@{}", root.join("env/extravars").display()));
    let mut argv = Vec::new();
    match request.execution() {
        Execution::Playbook { playbook } => {
            argv.push("ansible-playbook".to_string());
            argv.extend(request.args().iter().cloned());
            push_inventory(&mut argv, request);
            if let Some(ev) = extravars {
                argv.extend(["-e".to_string(), ev]);
            }
            argv.push(playbook.clone());
        }
        Execution::Module { module, module_args } => {
            argv.extend(["ansible".to_string(), "-m".to_string(), module.clone()]);
            if !module_args.is_empty() {
                argv.extend(["-a".to_string(), module_args.clone()]);
            }
            push_inventory(&mut argv, request);
            if let Some(ev) = extravars {
                argv.extend(["-e".to_string(), ev]);
            }
            argv.extend(request.args().iter().cloned());
        }
        Execution::Command => argv.extend(request.args().iter().cloned()),
    }
    argv
}

fn push_inventory(argv: &mut Vec<String>, request: &RunnerRequest) {
    if let Some(inventory) = request.inventory() {
        argv.extend(["-i".to_string(), inventory.to_string()]);
    }
}

/// Environment for the runner process, including the fact cache plugin.
pub(crate) fn runner_env(request: &RunnerRequest, root: &Path) -> BTreeMap<String, String> {
    let mut env = request.envvars().clone();
    if let Some(plugin) = request.fact_cache_type() {
        let cache = root.join("artifacts").join(request.ident().to_string()).join("fact_cache");
        env.insert("ANSIBLE_CACHE_PLUGIN".to_string(), plugin.to_string());
        env.insert("ANSIBLE_CACHE_PLUGIN_CONNECTION".to_string(), cache.display().to_string());
    }
    env
}

/// Prefix `argv` with an ssh-agent that has `key` loaded.
///
/// The key file is removed as soon as it has been added to the agent. The
/// key path is passed as `$0` so it needs no quoting.
fn wrap_ssh_agent(artifact_dir: &Path, key: &str, argv: Vec<String>) -> Result<Vec<String>, RunnerError> {
    let key_path = artifact_dir.join("ssh_key_data");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&key_path)?;
    file.write_all(key.as_bytes())?;
    let script = "ssh-add \"$0\" && rm -f \"$0\" && exec \"$@\"".to_string();
    let mut wrapped = vec![
        "ssh-agent".to_string(),
        "sh".to_string(),
        "-c".to_string(),
        script,
        key_path.display().to_string(),
    ];
    wrapped.extend(argv);
    Ok(wrapped)
}

fn compile_prompts(request: &RunnerRequest) -> Result<Vec<(Regex, String)>, RunnerError> {
    request
        .passwords()
        .iter()
        .map(|(pattern, answer)| {
            Regex::new(pattern)
                .map(|re| (re, answer.clone()))
                .map_err(|e| RunnerError::Prompt { pattern: pattern.clone(), message: e.to_string() })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout = 0,
    Stderr = 1,
}

/// Raw bytes read from one of the child's pipes.
type Chunk = (Stream, Vec<u8>);

/// Forward raw reads; decoding waits for whole lines so a character split
/// across two reads survives.
async fn forward_chunks<R: AsyncRead + Unpin>(mut reader: R, stream: Stream, tx: mpsc::Sender<Chunk>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send((stream, buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Line splitting per stream plus the prompt-answering state.
struct Transcript {
    prompts: Vec<(Regex, String)>,
    stdin: Option<ChildStdin>,
    partial: [Vec<u8>; 2],
    /// Raw output, kept only when it will be written to the `stdout` artifact.
    output: Option<Vec<u8>>,
    counter: u64,
}

impl Transcript {
    fn new(prompts: Vec<(Regex, String)>, stdin: Option<ChildStdin>, keep_output: bool) -> Self {
        Self {
            prompts,
            stdin,
            partial: [Vec::new(), Vec::new()],
            output: keep_output.then(Vec::new),
            counter: 0,
        }
    }

    async fn feed(&mut self, (stream, bytes): Chunk, events: &dyn RunnerEvents) {
        if let Some(output) = self.output.as_mut() {
            output.extend_from_slice(&bytes);
        }
        let idx = stream as usize;
        self.partial[idx].extend_from_slice(&bytes);
        while let Some(pos) = self.partial[idx].iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial[idx].drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.emit(line.trim_end_matches(['\r', '\n']), events);
        }
        if self.partial[idx].is_empty() {
            return;
        }
        let pending = String::from_utf8_lossy(&self.partial[idx]).into_owned();
        let answer = self
            .prompts
            .iter()
            .find(|(re, _)| re.is_match(&pending))
            .map(|(_, answer)| answer.clone());
        if let (Some(answer), Some(stdin)) = (answer, self.stdin.as_mut()) {
            let line = format!("{answer}\n");
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                tracing::warn!(error = %e, "failed to answer prompt");
            }
            let _ = stdin.flush().await;
            self.partial[idx].clear();
            self.emit(pending.trim_end(), events);
        }
    }

    fn flush(&mut self, events: &dyn RunnerEvents) {
        for idx in 0..self.partial.len() {
            if !self.partial[idx].is_empty() {
                let rest = std::mem::take(&mut self.partial[idx]);
                self.emit(String::from_utf8_lossy(&rest).trim_end(), events);
            }
        }
    }

    /// JSON lines carrying an `event` key are structured events.
    fn emit(&mut self, line: &str, events: &dyn RunnerEvents) {
        self.counter += 1;
        let event = match serde_json::from_str::<RunnerEvent>(line) {
            Ok(mut event) => {
                event.counter = self.counter;
                event
            }
            Err(_) => RunnerEvent::verbose(self.counter, line),
        };
        events.on_event(&event);
    }
}

fn write_artifacts(artifact_dir: &Path, result: &RunnerResult, output: Option<&[u8]>) -> Result<(), RunnerError> {
    fs::write(artifact_dir.join("status"), result.status.as_str())?;
    fs::write(artifact_dir.join("rc"), result.rc.to_string())?;
    if let Some(output) = output {
        fs::write(artifact_dir.join("stdout"), output)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
