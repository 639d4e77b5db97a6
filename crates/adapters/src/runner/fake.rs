// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    CancelCheck, RunnerAdapter, RunnerError, RunnerEvent, RunnerEvents, RunnerRequest,
    RunnerResult, RunnerStatus,
};

type RunHook = Arc<dyn Fn(&RunnerRequest) + Send + Sync>;

/// A run observed by the fake.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub request: RunnerRequest,
    /// Whether the cancel check reported cancellation when polled.
    pub saw_cancel: bool,
}

enum Scripted {
    Result(Option<RunnerResult>),
    Error(String),
}

#[derive(Default)]
struct FakeRunnerState {
    script: VecDeque<Scripted>,
    events: Vec<RunnerEvent>,
    runs: Vec<RecordedRun>,
    hook: Option<RunHook>,
}

/// Scripted runner for tests.
///
/// Returns queued results in order, then `successful` with rc 0. A cancel
/// check that fires turns the next result into `canceled`.
#[derive(Clone, Default)]
pub struct FakeRunner {
    inner: Arc<Mutex<FakeRunnerState>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&self, status: RunnerStatus, rc: i32) -> &Self {
        self.inner.lock().script.push_back(Scripted::Result(Some(RunnerResult::new(status, rc))));
        self
    }

    /// Queue a hand-off: the run produces no result.
    pub fn push_handoff(&self) -> &Self {
        self.inner.lock().script.push_back(Scripted::Result(None));
        self
    }

    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.inner.lock().script.push_back(Scripted::Error(message.into()));
        self
    }

    /// Events emitted on every run before the result.
    pub fn emit_events(&self, events: Vec<RunnerEvent>) -> &Self {
        self.inner.lock().events = events;
        self
    }

    /// Called with each request while it runs, e.g. to write artifacts.
    pub fn on_run(&self, hook: impl Fn(&RunnerRequest) + Send + Sync + 'static) -> &Self {
        self.inner.lock().hook = Some(Arc::new(hook));
        self
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.inner.lock().runs.clone()
    }

    pub fn requests(&self) -> Vec<RunnerRequest> {
        self.inner.lock().runs.iter().map(|r| r.request.clone()).collect()
    }
}

#[async_trait]
impl RunnerAdapter for FakeRunner {
    async fn run(
        &self,
        request: &RunnerRequest,
        events: &dyn RunnerEvents,
        cancel: &dyn CancelCheck,
    ) -> Result<Option<RunnerResult>, RunnerError> {
        let (hook, emitted, scripted) = {
            let mut state = self.inner.lock();
            (state.hook.clone(), state.events.clone(), state.script.pop_front())
        };
        events.on_status("starting");
        events.on_status("running");
        if let Some(hook) = hook {
            hook(request);
        }
        for event in &emitted {
            events.on_event(event);
        }
        let saw_cancel = cancel.is_canceled().await;
        self.inner.lock().runs.push(RecordedRun { request: request.clone(), saw_cancel });

        let result = match scripted {
            Some(Scripted::Error(message)) => {
                return Err(RunnerError::Io(std::io::Error::other(message)));
            }
            Some(Scripted::Result(None)) => return Ok(None),
            Some(Scripted::Result(Some(result))) => result,
            None => RunnerResult::successful(),
        };
        let result = if saw_cancel { RunnerResult::new(RunnerStatus::Canceled, -1) } else { result };
        events.on_status(result.status.as_str());
        events.on_finished(&result);
        Ok(Some(result))
    }
}
