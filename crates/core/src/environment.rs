// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution environments: container images that run a job.

use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::id::ExecutionEnvironmentId;

crate::str_enum! {
    /// Image pull policy passed through to the container runtime.
    pub enum PullPolicy {
        Always => "always",
        Missing => "missing",
        Never => "never",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    pub id: ExecutionEnvironmentId,
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub pull: Option<PullPolicy>,
    /// Registry credential (`host`, `username`, `password`, `verify_ssl`).
    #[serde(default)]
    pub credential: Option<Credential>,
}

crate::test_builder! {
    pub struct ExecutionEnvironmentBuilder => ExecutionEnvironment {
        id: ExecutionEnvironmentId = ExecutionEnvironmentId::new(1),
        name: String = "default-ee",
        image: String = "quay.io/ansible/awx-ee:latest",
        pull: Option<PullPolicy> = None::<PullPolicy>,
        credential: Option<Credential> = None::<Credential>,
    }
}
