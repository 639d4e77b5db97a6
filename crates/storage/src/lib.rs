// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ax-storage: persistence collaborator for the task engine

mod bulk;
mod memory;
mod retry;
mod snapshot;
mod store;

pub use bulk::{bulk_update_sorted_by_id, DEFAULT_BULK_BATCH};
pub use memory::{MemoryStore, StoreState};
pub use retry::{update_model, RetryPolicy};
pub use snapshot::{load_snapshot, save_snapshot, Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use store::{
    HostField, JobStore, JobUpdate, NewProjectUpdate, ProjectPatch, ScriptParams, StoreError,
};
