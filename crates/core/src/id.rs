// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Primary keys for persisted entities.
//!
//! Every job-like entity (playbook job, project update, inventory update,
//! ad hoc command, system job) shares the single [`JobId`] key space.

crate::define_pk! {
    /// Key of any job-like entity.
    JobId
}

crate::define_pk!(ProjectId);
crate::define_pk!(InventoryId);
crate::define_pk!(InventorySourceId);
crate::define_pk!(HostId);
crate::define_pk!(CredentialId);
crate::define_pk!(ExecutionEnvironmentId);
crate::define_pk!(OrganizationId);

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
