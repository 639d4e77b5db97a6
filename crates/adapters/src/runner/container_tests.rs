// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ax_core::{JobId, JobKind};

use super::*;
use crate::runner::Execution;

fn params() -> ContainerParams {
    ContainerParams {
        image: "quay.io/ansible/awx-ee:latest".to_string(),
        executable: "podman".to_string(),
        options: vec!["--network".to_string(), "slirp4netns:enable_ipv6=true".to_string()],
        auth: None,
        volume_mounts: vec!["/etc/pki:/etc/pki:O".to_string()],
    }
}

#[test]
fn wraps_inner_command_in_podman_run() {
    let request = RunnerRequest::builder(JobId::new(12), JobKind::Job, "/tmp/awx_12_x")
        .execution(Execution::Playbook { playbook: "site.yml".to_string() })
        .container(Some(params()))
        .build();
    let mut env = BTreeMap::new();
    env.insert("JOB_ID".to_string(), "12".to_string());

    let argv = container_command(&request, &params(), &env, vec!["ansible-playbook".to_string()]);

    assert_eq!(&argv[..3], ["podman", "run", "--rm"]);
    assert!(argv.contains(&"/tmp/awx_12_x/:/runner/:Z".to_string()));
    assert!(argv.contains(&"/etc/pki:/etc/pki:O".to_string()));
    assert!(argv.windows(2).any(|w| w == ["--env", "JOB_ID"]));
    assert!(argv.contains(&"--name=ansible_runner_12".to_string()));
    let image_at = argv.iter().position(|a| a == "quay.io/ansible/awx-ee:latest").unwrap();
    assert_eq!(argv[image_at + 1], "ansible-playbook");
}

#[test]
fn env_values_never_appear_on_the_command_line() {
    let request = RunnerRequest::builder(JobId::new(1), JobKind::Job, "/tmp/pdd").build();
    let mut env = BTreeMap::new();
    env.insert("AWS_SECRET_ACCESS_KEY".to_string(), "s3cr3t".to_string());

    let argv = container_command(&request, &params(), &env, Vec::new());

    assert!(!argv.iter().any(|a| a.contains("s3cr3t")));
}

#[test]
fn auth_password_is_redacted_in_debug_output() {
    let auth = ContainerAuth {
        host: "registry.example.com".to_string(),
        username: "robot".to_string(),
        password: "tok3n".to_string(),
        verify_ssl: true,
    };

    assert!(!format!("{auth:?}").contains("tok3n"));
}
