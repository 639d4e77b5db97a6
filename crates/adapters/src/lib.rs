// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ax-adapters: external collaborators of the task engine

pub mod credential;
pub mod events;
pub mod git;
pub mod notify;
pub mod runner;
pub mod scheduler;
pub mod subprocess;

pub use credential::{
    CredentialInjector, InjectionTarget, InjectorError, InjectorRegistry, PrivateDataWriter,
    HIDDEN_PASSWORD,
};
pub use events::{EventSink, LogEventSink};
pub use git::{GitError, HeadState};
pub use notify::{LogNotifyAdapter, NotificationTrigger, NotifyAdapter, NotifyError};
pub use runner::{
    CancelCheck, ContainerAuth, ContainerParams, ContainerRunner, Execution, NeverCancel,
    NoopRunnerEvents, ProcessRunner, RunnerAdapter, RunnerError, RunnerEvent, RunnerEvents,
    RunnerRequest, RunnerRequestBuilder, RunnerResult, RunnerSettings, RunnerStatus,
    CONTAINER_RUNNER_ROOT,
};
pub use scheduler::{ChannelScheduler, LogScheduler, ScheduleRequest, SchedulerHooks};

#[cfg(any(test, feature = "test-support"))]
pub use credential::MemoryPrivateData;
#[cfg(any(test, feature = "test-support"))]
pub use events::FakeEventSink;
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifyAdapter, NotifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use runner::{FakeRunner, RecordedRun};
#[cfg(any(test, feature = "test-support"))]
pub use scheduler::FakeScheduler;
