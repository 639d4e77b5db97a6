// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn captures_output() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "printf hello"]);
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo").await.unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"hello");
}

#[tokio::test]
async fn times_out_slow_commands() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let err = run_with_timeout(cmd, Duration::from_millis(100), "sleep").await.unwrap_err();
    assert!(err.contains("sleep timed out"), "{err}");
}

#[tokio::test]
async fn reports_missing_binary() {
    let cmd = Command::new("definitely-not-a-real-binary-ax");
    let err = run_with_timeout(cmd, Duration::from_secs(1), "missing").await.unwrap_err();
    assert!(err.starts_with("missing failed to run"), "{err}");
}
