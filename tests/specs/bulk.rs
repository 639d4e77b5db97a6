//! Bulk host update specs
//!
//! Two writers updating different columns of the same hosts through the
//! sorted primitive finish without deadlocking and leave both columns set.

use std::sync::Arc;
use std::time::Duration;

use ax_storage::{bulk_update_sorted_by_id, HostField, JobStore};
use serde_json::json;

use crate::prelude::*;

const HOSTS: u64 = 1000;

fn hosts(store: &MemoryStore) {
    for id in 1..=HOSTS {
        store.insert_host(Host::builder().id(HostId::new(id)).name(format!("host{id}")).build());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_columns_on_shared_hosts_complete() {
    let store = Arc::new(MemoryStore::new());
    hosts(&store);

    // Opposite input orders; sorting makes both take row locks ascending.
    let variables: Vec<Host> = (1..=HOSTS)
        .map(|id| Host::builder().id(HostId::new(id)).variables("role: web").build())
        .collect();
    let facts: Vec<Host> = (1..=HOSTS)
        .rev()
        .map(|id| Host::builder().id(HostId::new(id)).ansible_facts(json!({"id": id})).build())
        .collect();

    let a = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { bulk_update_sorted_by_id(store.as_ref(), variables, &[HostField::Variables], 100).await })
    };
    let b = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            bulk_update_sorted_by_id(store.as_ref(), facts, &[HostField::AnsibleFacts], 100).await
        })
    };
    let (a, b) = tokio::time::timeout(Duration::from_secs(30), async { (a.await, b.await) }).await.unwrap();

    assert_eq!(a.unwrap().unwrap(), HOSTS as usize);
    assert_eq!(b.unwrap().unwrap(), HOSTS as usize);
    let host = store.host(HostId::new(500)).unwrap();
    assert_eq!(host.variables, "role: web");
    assert_eq!(host.ansible_facts, json!({"id": 500}));
    for write in store.host_writes() {
        assert!(write.windows(2).all(|w| w[0] < w[1]));
    }
}

#[tokio::test]
async fn empty_updates_write_nothing() {
    let store = MemoryStore::new();
    let written = bulk_update_sorted_by_id(&store as &dyn JobStore, Vec::new(), &[HostField::Variables], 10).await;
    assert_eq!(written.unwrap(), 0);
    assert!(store.host_writes().is_empty());
}
