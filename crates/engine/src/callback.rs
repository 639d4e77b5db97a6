// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner callbacks for one run, and the fields stashed until the final
//! status write.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ax_adapters::{EventSink, RunnerEvent, RunnerEvents, RunnerResult};
use ax_core::JobId;
use ax_storage::JobUpdate;
use parking_lot::Mutex;

/// Forwards runner events to the event pipeline and watches for the
/// revision a project sync reports.
pub struct RunCallback {
    job_id: JobId,
    sink: Arc<dyn EventSink>,
    event_count: AtomicU64,
    wrapup_dispatched: AtomicBool,
    new_revision: Mutex<Option<String>>,
}

impl RunCallback {
    pub fn new(job_id: JobId, sink: Arc<dyn EventSink>) -> Self {
        Self {
            job_id,
            sink,
            event_count: AtomicU64::new(0),
            wrapup_dispatched: AtomicBool::new(false),
            new_revision: Mutex::new(None),
        }
    }

    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    /// The pipeline took over sending notifications for this job.
    pub fn wrapup_dispatched(&self) -> bool {
        self.wrapup_dispatched.load(Ordering::SeqCst)
    }

    /// `scm_version` fact set by the project update playbook.
    pub fn take_new_revision(&self) -> Option<String> {
        self.new_revision.lock().take()
    }
}

impl RunnerEvents for RunCallback {
    fn on_event(&self, event: &RunnerEvent) {
        self.event_count.fetch_add(1, Ordering::SeqCst);
        if let Some(revision) = scm_version(event) {
            *self.new_revision.lock() = Some(revision.to_string());
        }
        self.sink.dispatch(self.job_id, event);
    }

    fn on_status(&self, status: &str) {
        tracing::debug!(job_id = %self.job_id, status, "runner status");
    }

    fn on_finished(&self, result: &RunnerResult) {
        let count = self.event_count();
        tracing::debug!(job_id = %self.job_id, status = %result.status, rc = result.rc, events = count, "runner finished");
        if self.sink.finish(self.job_id, count) {
            self.wrapup_dispatched.store(true, Ordering::SeqCst);
        }
    }
}

fn scm_version(event: &RunnerEvent) -> Option<&str> {
    let data = &event.event_data;
    if data.get("task_action").and_then(|v| v.as_str()) != Some("set_fact") {
        return None;
    }
    data.pointer("/res/ansible_facts/scm_version").and_then(|v| v.as_str())
}

/// Explanation and traceback written together with the final status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelayedUpdate {
    job_explanation: Option<String>,
    result_traceback: Option<String>,
}

impl DelayedUpdate {
    pub fn explanation(&mut self, value: impl Into<String>, skip_if_already_set: bool) {
        merge(&mut self.job_explanation, value.into(), skip_if_already_set);
    }

    pub fn traceback(&mut self, value: impl Into<String>, skip_if_already_set: bool) {
        merge(&mut self.result_traceback, value.into(), skip_if_already_set);
    }

    pub fn job_explanation(&self) -> Option<&str> {
        self.job_explanation.as_deref()
    }

    pub fn result_traceback(&self) -> Option<&str> {
        self.result_traceback.as_deref()
    }

    pub fn apply(&self, mut update: JobUpdate) -> JobUpdate {
        if let Some(v) = &self.job_explanation {
            update = update.job_explanation(v.clone());
        }
        if let Some(v) = &self.result_traceback {
            update = update.result_traceback(v.clone());
        }
        update
    }
}

/// Later values are appended on a new line unless already present.
fn merge(slot: &mut Option<String>, value: String, skip_if_already_set: bool) {
    match slot {
        Some(_) if skip_if_already_set => {}
        Some(existing) => {
            if !existing.contains(&value) {
                existing.push('\n');
                existing.push_str(&value);
            }
        }
        None => *slot = Some(value),
    }
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
