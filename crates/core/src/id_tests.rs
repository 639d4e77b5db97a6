// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn pk_displays_as_integer() {
    assert_eq!(JobId::new(42).to_string(), "42");
    assert_eq!(HostId::from(7).get(), 7);
}

#[test]
fn pk_serializes_transparently() {
    let json = serde_json::to_string(&ProjectId::new(9)).unwrap();
    assert_eq!(json, "9");
    let back: ProjectId = serde_json::from_str("9").unwrap();
    assert_eq!(back, ProjectId::new(9));
}

#[test]
fn pk_orders_numerically() {
    let mut ids = vec![HostId::new(10), HostId::new(2), HostId::new(33)];
    ids.sort();
    assert_eq!(ids, vec![HostId::new(2), HostId::new(10), HostId::new(33)]);
}
