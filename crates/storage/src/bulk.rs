// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadlock-safe bulk host updates.
//!
//! Two workers updating different columns of overlapping host sets must
//! take row locks in the same order, so every bulk write is sorted by id
//! before it is chunked.

use ax_core::Host;

use crate::store::{HostField, JobStore, StoreError};

/// Default rows per write for [`bulk_update_sorted_by_id`].
pub const DEFAULT_BULK_BATCH: usize = 1000;

/// Sort `hosts` by id and write `fields` in batches of at most `batch_size`.
///
/// Returns the number of rows updated.
pub async fn bulk_update_sorted_by_id(
    store: &dyn JobStore,
    mut hosts: Vec<Host>,
    fields: &[HostField],
    batch_size: usize,
) -> Result<usize, StoreError> {
    if hosts.is_empty() || fields.is_empty() {
        return Ok(0);
    }
    hosts.sort_by_key(|h| h.id);
    let mut updated = 0;
    for batch in hosts.chunks(batch_size.max(1)) {
        updated += store.bulk_update_hosts(batch, fields).await?;
    }
    Ok(updated)
}

#[cfg(test)]
#[path = "bulk_tests.rs"]
mod tests;
