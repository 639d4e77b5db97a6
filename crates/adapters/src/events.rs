// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Destination for runner events (the job event pipeline).

use ax_core::JobId;

use crate::runner::RunnerEvent;

pub trait EventSink: Send + Sync {
    fn dispatch(&self, job_id: JobId, event: &RunnerEvent);

    /// Close the stream for `job_id` after `event_count` events.
    ///
    /// Returns true when the wrap-up event was handed to the pipeline, which
    /// then sends the job's notifications itself.
    fn finish(&self, job_id: JobId, event_count: u64) -> bool;
}

/// Logs events at trace level and never takes over notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn dispatch(&self, job_id: JobId, event: &RunnerEvent) {
        tracing::trace!(%job_id, counter = event.counter, event = %event.event, "{}", event.stdout);
    }

    fn finish(&self, job_id: JobId, event_count: u64) -> bool {
        tracing::debug!(%job_id, event_count, "event stream finished");
        false
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::EventSink;
    use crate::runner::RunnerEvent;
    use ax_core::JobId;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeEventState {
        events: Vec<(JobId, RunnerEvent)>,
        finished: Vec<(JobId, u64)>,
        wrapup: bool,
    }

    /// Records events; the wrap-up result is configurable.
    #[derive(Clone, Default)]
    pub struct FakeEventSink {
        inner: Arc<Mutex<FakeEventState>>,
    }

    impl FakeEventSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Report the wrap-up event as dispatched.
        pub fn dispatch_wrapup(&self, dispatched: bool) {
            self.inner.lock().wrapup = dispatched;
        }

        pub fn events(&self) -> Vec<RunnerEvent> {
            self.inner.lock().events.iter().map(|(_, e)| e.clone()).collect()
        }

        pub fn finished(&self) -> Vec<(JobId, u64)> {
            self.inner.lock().finished.clone()
        }
    }

    impl EventSink for FakeEventSink {
        fn dispatch(&self, job_id: JobId, event: &RunnerEvent) {
            self.inner.lock().events.push((job_id, event.clone()));
        }

        fn finish(&self, job_id: JobId, event_count: u64) -> bool {
            let mut inner = self.inner.lock();
            inner.finished.push((job_id, event_count));
            inner.wrapup
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeEventSink;
