// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inventories and hosts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{HostId, InventoryId, OrganizationId};

crate::str_enum! {
    pub enum InventoryKind {
        Standard => "",
        Smart => "smart",
        Constructed => "constructed",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub id: InventoryId,
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: InventoryKind,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
}

fn default_kind() -> InventoryKind {
    InventoryKind::Standard
}

/// A managed host and its cached facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub inventory_id: InventoryId,
    /// Host variables as YAML/JSON text.
    #[serde(default)]
    pub variables: String,
    #[serde(default = "empty_facts")]
    pub ansible_facts: Value,
    #[serde(default)]
    pub ansible_facts_modified: Option<DateTime<Utc>>,
}

fn empty_facts() -> Value {
    Value::Object(Default::default())
}

crate::test_builder! {
    pub struct InventoryBuilder => Inventory {
        id: InventoryId = InventoryId::new(1),
        name: String = "demo-inventory",
        kind: InventoryKind = InventoryKind::Standard,
        organization_id: Option<OrganizationId> = None::<OrganizationId>,
    }
}

crate::test_builder! {
    pub struct HostBuilder => Host {
        id: HostId = HostId::new(1),
        name: String = "localhost",
        inventory_id: InventoryId = InventoryId::new(1),
        variables: String = "",
        ansible_facts: Value = empty_facts(),
        ansible_facts_modified: Option<DateTime<Utc>> = None::<DateTime<Utc>>,
    }
}
