// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fire-and-forget hooks back into the scheduler that launches jobs.

use ax_core::InventoryId;
use tokio::sync::mpsc;

/// A request for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleRequest {
    /// Run a task manager pass; jobs were blocked on the finished one.
    TaskManager,
    /// Run a workflow manager pass; the finished job belongs to a workflow.
    WorkflowManager,
    /// Recompute inventory host/group counts.
    InventoryComputedFields(InventoryId),
}

/// None of these block or report failure to the caller.
pub trait SchedulerHooks: Send + Sync {
    fn schedule_task_manager(&self);

    fn schedule_workflow_manager(&self);

    fn update_inventory_computed_fields(&self, inventory: InventoryId);
}

/// Delivers requests over a bounded channel; drops them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelScheduler {
    tx: mpsc::Sender<ScheduleRequest>,
}

impl ChannelScheduler {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ScheduleRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn send(&self, request: ScheduleRequest) {
        if let Err(e) = self.tx.try_send(request) {
            tracing::warn!(?request, error = %e, "dropping scheduler request");
        }
    }
}

impl SchedulerHooks for ChannelScheduler {
    fn schedule_task_manager(&self) {
        self.send(ScheduleRequest::TaskManager);
    }

    fn schedule_workflow_manager(&self) {
        self.send(ScheduleRequest::WorkflowManager);
    }

    fn update_inventory_computed_fields(&self, inventory: InventoryId) {
        self.send(ScheduleRequest::InventoryComputedFields(inventory));
    }
}

/// Scheduler hooks that only log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogScheduler;

impl SchedulerHooks for LogScheduler {
    fn schedule_task_manager(&self) {
        tracing::info!("task manager pass requested");
    }

    fn schedule_workflow_manager(&self) {
        tracing::info!("workflow manager pass requested");
    }

    fn update_inventory_computed_fields(&self, inventory: InventoryId) {
        tracing::info!(inventory_id = %inventory, "inventory computed fields update requested");
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ScheduleRequest, SchedulerHooks};
    use ax_core::InventoryId;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every request.
    #[derive(Clone, Default)]
    pub struct FakeScheduler {
        calls: Arc<Mutex<Vec<ScheduleRequest>>>,
    }

    impl FakeScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<ScheduleRequest> {
            self.calls.lock().clone()
        }
    }

    impl SchedulerHooks for FakeScheduler {
        fn schedule_task_manager(&self) {
            self.calls.lock().push(ScheduleRequest::TaskManager);
        }

        fn schedule_workflow_manager(&self) {
            self.calls.lock().push(ScheduleRequest::WorkflowManager);
        }

        fn update_inventory_computed_fields(&self, inventory: InventoryId) {
            self.calls.lock().push(ScheduleRequest::InventoryComputedFields(inventory));
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeScheduler;

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
