// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle: claim a job, stage and run it, and record the outcome.
//!
//! [`TaskRunner::run_job`] is the only entry point. Everything between the
//! `running` write and the runner's result is absorbed into a terminal
//! status and an explanation; only a job that cannot be loaded or is no
//! longer active escapes as [`TaskFailure::Fatal`].

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ax_adapters::{
    CancelCheck, EventSink, InjectionTarget, InjectorRegistry, NotificationTrigger, NotifyAdapter,
    RunnerAdapter, RunnerRequest, RunnerStatus, SchedulerHooks,
};
use ax_core::{Clock, JobId, JobKind, JobStatus, UnifiedJob};
use ax_storage::{update_model, JobStore, JobUpdate};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::callback::{DelayedUpdate, RunCallback};
use crate::cancel::CancelWatch;
use crate::config::{JinjaPolicy, Settings};
use crate::error::{TaskError, TaskFailure};
use crate::executor::{builtin_executors, JobExecutor, NestedRunner, Passwords, RunContext, RunState};
use crate::extra_vars::{self, ExtraVars};
use crate::request::{
    args2cmdline, base_env, build_safe_env, container_params, expect_passwords, instance_timeout,
    runner_settings, write_args_file, write_private_data_files, write_runner_settings,
};
use crate::staging::{PrivateDataDir, SECRET_MODE};

/// Collaborators shared by every run on this worker.
pub struct TaskDeps {
    pub store: Arc<dyn JobStore>,
    pub runner: Arc<dyn RunnerAdapter>,
    pub notifier: Arc<dyn NotifyAdapter>,
    pub scheduler: Arc<dyn SchedulerHooks>,
    pub events: Arc<dyn EventSink>,
    pub injectors: Arc<InjectorRegistry>,
    pub settings: Settings,
}

impl TaskDeps {
    /// Logging notifier, scheduler and event sink with the builtin injectors.
    pub fn new(store: Arc<dyn JobStore>, runner: Arc<dyn RunnerAdapter>, settings: Settings) -> Self {
        Self {
            store,
            runner,
            notifier: Arc::new(ax_adapters::LogNotifyAdapter::new()),
            scheduler: Arc::new(ax_adapters::LogScheduler),
            events: Arc::new(ax_adapters::LogEventSink),
            injectors: Arc::new(InjectorRegistry::with_builtins()),
            settings,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotifyAdapter>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn SchedulerHooks>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_injectors(mut self, injectors: InjectorRegistry) -> Self {
        self.injectors = Arc::new(injectors);
        self
    }
}

/// Result of the staging and runner phase.
enum Execution {
    Finished { status: JobStatus, rc: Option<i32> },
    /// The runner handed the work off; another process records the outcome.
    HandedOff,
}

pub struct TaskRunner<C: Clock> {
    deps: TaskDeps,
    executors: HashMap<JobKind, Arc<dyn JobExecutor>>,
    clock: C,
    shutdown: CancellationToken,
}

impl<C: Clock> TaskRunner<C> {
    pub fn new(deps: TaskDeps, clock: C, shutdown: CancellationToken) -> Self {
        let executors = builtin_executors().into_iter().map(|e| (e.kind(), e)).collect();
        Self { deps, executors, clock, shutdown }
    }

    pub fn deps(&self) -> &TaskDeps {
        &self.deps
    }

    /// Run job `job_id` to a terminal status.
    pub async fn run(&self, job_id: JobId) -> Result<JobStatus, TaskFailure> {
        self.run_job(job_id, &Passwords::new(), None).await
    }

    /// Run job `job_id` with prompt answers supplied at launch. A project
    /// sync copies its tree into `parent_private_data_dir`.
    pub async fn run_job(
        &self,
        job_id: JobId,
        runtime_passwords: &Passwords,
        parent_private_data_dir: Option<PathBuf>,
    ) -> Result<JobStatus, TaskFailure> {
        let job = self.claim(job_id).await?;
        let executor = self
            .executors
            .get(&job.kind())
            .cloned()
            .ok_or_else(|| TaskError::Internal(format!("no executor for {}", job.kind())))?;
        tracing::info!(job = %job.log_format(), "starting task");
        self.send_templates(&job, NotificationTrigger::Running).await;

        let cancel = CancelWatch::new(Arc::clone(&self.deps.store), job_id, self.shutdown.clone());
        let callback = RunCallback::new(job_id, Arc::clone(&self.deps.events));
        let mut delayed = DelayedUpdate::default();

        let private_data = match PrivateDataDir::create(&self.deps.settings, job_id) {
            Ok(dir) => dir.containerized(executor.use_container(&job)),
            Err(e) => {
                let error = TaskError::from(e);
                tracing::error!(job = %job.log_format(), error = %error, "could not stage private data");
                let status = record_error(&mut delayed, &error);
                return self.finish_unstaged(job, status, &delayed).await;
            }
        };

        let mut ctx = RunContext {
            deps: &self.deps,
            job,
            private_data: &private_data,
            cancel: &cancel,
            nested: self,
            clock: &self.clock,
            parent_private_data_dir,
            state: RunState::default(),
        };

        let execution =
            self.execute(executor.as_ref(), &mut ctx, runtime_passwords, &callback, &mut delayed).await;
        let (mut status, rc) = match execution {
            Ok(Execution::Finished { status, rc }) => (status, rc),
            Ok(Execution::HandedOff) => {
                tracing::info!(job = %ctx.job.log_format(), "run handed off");
                return Ok(ctx.job.status);
            }
            Err(e) => {
                tracing::error!(job = %ctx.job.log_format(), error = %e, "exception occurred while running task");
                (record_error(&mut delayed, &e), None)
            }
        };
        tracing::debug!(job = %ctx.job.log_format(), events = callback.event_count(), "finished running");

        match executor.post_run_hook(&mut ctx, status).await {
            Ok(()) => {}
            Err(TaskError::PostRun(e)) => {
                if status == JobStatus::Successful {
                    status = e.status;
                    delayed.explanation(e.message.clone(), false);
                    if let Some(traceback) = &e.traceback {
                        delayed.traceback(traceback.clone(), false);
                    }
                }
            }
            Err(e) => tracing::error!(job = %ctx.job.log_format(), error = %e, "post run hook errored"),
        }

        if let Err(e) = ctx.update(delayed.apply(JobUpdate::new().status(status))).await {
            tracing::error!(job = %ctx.job.log_format(), error = %e, "failed to save final status");
        }

        if ctx.job.host_status_counts.is_some() || !callback.wrapup_dispatched() {
            self.send_notifications(&ctx.job, status).await;
        }

        self.final_run_hook(&mut ctx).await;
        if let Err(e) = executor.final_run_hook(&mut ctx, status).await {
            tracing::error!(job = %ctx.job.log_format(), error = %e, "final run hook errored");
        }

        self.deps.notifier.status_changed(&ctx.job, status);
        tracing::info!(job = %ctx.job.log_format(), %status, "task finished");
        drop(ctx);

        if let Err(e) = private_data.cleanup() {
            tracing::warn!(%job_id, error = %e, "failed to remove private data dir");
        }
        completion(job_id, status, rc)
    }

    /// Load the job and make sure this worker may run it.
    async fn claim(&self, job_id: JobId) -> Result<UnifiedJob, TaskFailure> {
        let store = self.deps.store.as_ref();
        let retry = self.deps.settings.retry_policy();
        let mut job = store.load_job(job_id).await.map_err(|source| TaskError::Load { job_id, source })?;

        if job.status != JobStatus::Canceled && job.cancel_flag {
            let update = JobUpdate::new().start_args(String::new()).status(JobStatus::Canceled);
            job = update_model(store, job_id, &update, retry).await.map_err(TaskError::from)?;
            self.deps.notifier.status_changed(&job, JobStatus::Canceled);
            tracing::info!(job = %job.log_format(), "canceled before start");
            return Err(TaskFailure::Cancel { job_id, rc: None });
        }
        if !job.status.is_active() {
            tracing::error!(job = %job.log_format(), "not starting task in an inactive state");
            return Err(TaskError::NotActive { job_id, status: job.status }.into());
        }

        // start_args may hold unencrypted passwords from the launch
        let mut update = JobUpdate::new().status(JobStatus::Running).start_args(String::new());
        if job.execution_environment.is_none() {
            match store.resolve_execution_environment(&job).await.map_err(TaskError::from)? {
                Some(ee) => update = update.execution_environment(ee),
                None => tracing::debug!(job = %job.log_format(), "no execution environment resolved"),
            }
        }
        job = update_model(store, job_id, &update, retry).await.map_err(TaskError::from)?;
        self.deps.notifier.status_changed(&job, JobStatus::Running);
        Ok(job)
    }

    /// Staging, request building and the runner call.
    async fn execute(
        &self,
        executor: &dyn JobExecutor,
        ctx: &mut RunContext<'_>,
        runtime_passwords: &Passwords,
        callback: &RunCallback,
        delayed: &mut DelayedUpdate,
    ) -> Result<Execution, TaskError> {
        ctx.store().ensure_event_partition(&ctx.job).await?;
        executor.pre_run_hook(ctx).await?;
        executor.build_project_dir(ctx).await?;

        if ctx.cancel.is_canceled().await {
            ctx.update(JobUpdate::new().status(JobStatus::Canceled)).await?;
        }
        if ctx.job.status != JobStatus::Running {
            ctx.reload().await?;
            return match ctx.job.status {
                JobStatus::Canceled => Err(TaskError::Canceled),
                status => Err(TaskError::NotActive { job_id: ctx.job.id, status }),
            };
        }

        let request = self.build_request(executor, ctx, runtime_passwords).await?;
        tracing::info!(job = %ctx.job.log_format(), execution = ?request.execution(), "running playbook");
        let result = self.deps.runner.run(&request, callback, ctx.cancel).await?;

        ctx.state.new_revision = callback.take_new_revision();
        let Some(result) = result else {
            return Ok(Execution::HandedOff);
        };
        ctx.state.runner_finished = true;

        let status = match result.status {
            RunnerStatus::Successful => JobStatus::Successful,
            RunnerStatus::Failed => JobStatus::Failed,
            RunnerStatus::Timeout => {
                delayed.explanation("Job terminated due to timeout", true);
                JobStatus::Failed
            }
            RunnerStatus::Error => {
                delayed.explanation("Job terminated due to error", true);
                JobStatus::Error
            }
            RunnerStatus::Canceled => {
                ctx.reload().await?;
                if ctx.job.cancel_flag {
                    JobStatus::Canceled
                } else if ctx.cancel.signal_fired() {
                    delayed.explanation("Task was canceled due to receiving a shutdown signal.", true);
                    JobStatus::Failed
                } else {
                    delayed.explanation("The running ansible process received a shutdown signal.", true);
                    JobStatus::Failed
                }
            }
        };
        Ok(Execution::Finished { status, rc: Some(result.rc) })
    }

    /// Write private data, extra vars, args and settings, and assemble the
    /// runner request.
    async fn build_request(
        &self,
        executor: &dyn JobExecutor,
        ctx: &mut RunContext<'_>,
        runtime_passwords: &Passwords,
    ) -> Result<RunnerRequest, TaskError> {
        let settings = ctx.settings();
        let private_data = ctx.private_data;

        let files = write_private_data_files(
            private_data,
            ctx.job.id,
            executor.build_private_data(ctx),
            &settings.ssh_agent_namespaces,
        )?;
        let passwords = executor.build_passwords(ctx, runtime_passwords)?;
        if let Some(extra) = executor.build_extra_vars(ctx)? {
            let rendered = extra_vars::render(&extra, settings.allow_jinja_in_extra_vars)?;
            private_data.write_private_data_file(Some("extravars"), &rendered, Some("env"), SECRET_MODE)?;
        }
        let args = executor.build_args(ctx, &passwords)?;
        let mut env = base_env(settings, &ctx.job, private_data)?;
        executor.build_env(ctx, &files, &mut env)?;

        let mut target = InjectionTarget { env, args, ..InjectionTarget::new() };
        let credentials = executor.build_credentials(ctx);
        self.deps.injectors.inject_all(&credentials, &mut target, private_data).map_err(crate::error::BuildError::from)?;
        let InjectionTarget { env, safe_env: injected_safe_env, mut args, extra_vars: injected_vars } = target;

        if !injected_vars.is_empty() {
            let rendered = extra_vars::render(&ExtraVars::new(injected_vars), JinjaPolicy::Never)?;
            let path = private_data.write_private_data_file(None, &rendered, Some("env"), SECRET_MODE)?;
            args.push("-e".to_string());
            args.push(format!("@{}", ctx.runner_path(&path)));
        }

        let mut safe_env = build_safe_env(&env);
        safe_env.extend(injected_safe_env);
        write_args_file(private_data, executor.args_file(), &args)?;

        let prompts = executor.password_prompts(&passwords);
        let timeout = instance_timeout(ctx.job.timeout, executor.default_timeout(settings));
        let runner_settings = runner_settings(settings, timeout);
        write_runner_settings(private_data, &runner_settings)?;

        let container = if executor.use_container(&ctx.job) {
            Some(container_params(settings, &ctx.job, executor.extra_volume_mounts(ctx))?)
        } else {
            None
        };
        let request = RunnerRequest::builder(ctx.job.id, ctx.job.kind(), private_data.path())
            .execution(executor.build_execution(ctx)?)
            .args(args.clone())
            .inventory(executor.build_inventory(ctx).await?)
            .passwords(expect_passwords(&prompts, &passwords))
            .envvars(env)
            .ssh_key(files.ssh_key.clone())
            .fact_cache(executor.should_use_fact_cache(&ctx.job))
            .suppress_env_files(true)
            .settings(runner_settings)
            .container(container)
            .build();

        let cwd = ctx.runner_path(&private_data.project_dir());
        ctx.update(JobUpdate::new().job_env(safe_env).job_args(args2cmdline(&args)).job_cwd(cwd)).await?;
        Ok(request)
    }

    async fn send_notifications(&self, job: &UnifiedJob, status: JobStatus) {
        if let Some(trigger) = NotificationTrigger::for_status(status) {
            self.send_templates(job, trigger).await;
        }
    }

    async fn send_templates(&self, job: &UnifiedJob, trigger: NotificationTrigger) {
        if let Err(e) = self.deps.notifier.send_notification_templates(job, trigger).await {
            tracing::warn!(job = %job.log_format(), %trigger, error = %e, "failed to send notifications");
        }
    }

    /// Runner metadata and scheduler hooks shared by every kind.
    async fn final_run_hook(&self, ctx: &mut RunContext<'_>) {
        let artifacts = ctx.private_data.artifact_dir(ctx.job.id);
        let mut update = JobUpdate::new();
        if let Ok(text) = fs::read_to_string(artifacts.join("collections.json")) {
            match serde_json::from_str::<Value>(&text) {
                Ok(collections) => update = update.installed_collections(collections),
                Err(e) => tracing::warn!(job = %ctx.job.log_format(), error = %e, "invalid collections.json"),
            }
        }
        if let Ok(text) = fs::read_to_string(artifacts.join("ansible_version.txt")) {
            let version = text.lines().next().unwrap_or_default().trim().to_string();
            update = update.ansible_version(version);
        }
        if !update.is_empty() {
            if let Err(e) = ctx.update(update).await {
                tracing::warn!(job = %ctx.job.log_format(), error = %e, "failed to save runner metadata");
            }
        }

        if ctx.job.has_blocked_dependents {
            self.deps.scheduler.schedule_task_manager();
        }
        if ctx.job.spawned_by_workflow {
            self.deps.scheduler.schedule_workflow_manager();
        }
    }

    /// Record the outcome of a job that failed before staging.
    async fn finish_unstaged(
        &self,
        job: UnifiedJob,
        status: JobStatus,
        delayed: &DelayedUpdate,
    ) -> Result<JobStatus, TaskFailure> {
        let update = delayed.apply(JobUpdate::new().status(status));
        let job = match update_model(self.deps.store.as_ref(), job.id, &update, self.deps.settings.retry_policy()).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job = %job.log_format(), error = %e, "failed to save final status");
                job
            }
        };
        self.send_notifications(&job, status).await;
        self.deps.notifier.status_changed(&job, status);
        completion(job.id, status, None)
    }
}

#[async_trait]
impl<C: Clock> NestedRunner for TaskRunner<C> {
    async fn run_nested(&self, job_id: JobId, parent_private_data_dir: PathBuf) -> Result<JobStatus, TaskFailure> {
        self.run_job(job_id, &Passwords::new(), Some(parent_private_data_dir)).await
    }
}

/// Terminal status for `error`, with its explanation and traceback stashed.
fn record_error(delayed: &mut DelayedUpdate, error: &TaskError) -> JobStatus {
    if let Some(explanation) = error.explanation() {
        delayed.explanation(explanation, false);
    }
    if let Some(traceback) = error.traceback() {
        delayed.traceback(traceback, false);
    }
    error.terminal_status()
}

/// The completion signal for the dispatcher.
fn completion(job_id: JobId, status: JobStatus, rc: Option<i32>) -> Result<JobStatus, TaskFailure> {
    match status {
        JobStatus::Successful => Ok(status),
        JobStatus::Canceled => Err(TaskFailure::Cancel { job_id, rc }),
        status => Err(TaskFailure::Error { job_id, status, rc }),
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
