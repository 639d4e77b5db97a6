// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ax-core: domain model for the automation task engine

pub mod macros;

pub mod clock;
pub mod credential;
pub mod environment;
pub mod id;
pub mod inventory;
pub mod job;
pub mod project;
pub mod status;

pub use clock::{Clock, FakeClock, SystemClock};
pub use credential::{Credential, CredentialCategory, CredentialKind};
pub use environment::{ExecutionEnvironment, PullPolicy};
pub use id::{
    CredentialId, ExecutionEnvironmentId, HostId, InventoryId, InventorySourceId, JobId,
    OrganizationId, ProjectId,
};
pub use inventory::{Host, Inventory, InventoryKind};
pub use job::{
    AdHocCommandDetails, InventoryUpdateDetails, JobDetails, JobKind, JobType, LaunchType,
    PlaybookJob, ProjectUpdateDetails, SystemJobDetails, UnifiedJob,
};
pub use project::{Project, ScmType};
pub use status::{JobStatus, ParseEnumError, ACTIVE_STATES};
