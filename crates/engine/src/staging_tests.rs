// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn settings(base: &Path) -> Settings {
    Settings { isolation_base_path: base.to_path_buf(), ..Settings::default() }
}

fn mode(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

#[test]
fn creates_private_dir_with_layout() {
    let base = TempDir::new().unwrap();
    let pdd = PrivateDataDir::create(&settings(base.path()), JobId::new(42)).unwrap();

    let name = pdd.path().file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("awx_42_"), "{name}");
    assert_eq!(mode(pdd.path()), 0o700);
    assert!(pdd.path().join("inventory").is_dir());
    assert!(pdd.path().join("env").is_dir());
    assert!(!pdd.project_dir().exists());
}

#[test]
fn missing_isolation_root_is_an_error() {
    let err = PrivateDataDir::create(&settings(Path::new("/nonexistent/isolation")), JobId::new(1))
        .unwrap_err();
    assert!(matches!(err, StagingError::MissingBase(_)));
}

#[test]
fn drop_removes_directory() {
    let base = TempDir::new().unwrap();
    let pdd = PrivateDataDir::create(&settings(base.path()), JobId::new(1)).unwrap();
    let path = pdd.path().to_path_buf();
    drop(pdd);
    assert!(!path.exists());
}

#[test]
fn keep_survives_drop() {
    let base = TempDir::new().unwrap();
    let mut pdd = PrivateDataDir::create(&settings(base.path()), JobId::new(1)).unwrap();
    pdd.keep();
    let path = pdd.path().to_path_buf();
    drop(pdd);
    assert!(path.is_dir());
}

#[test]
fn cleanup_disabled_by_settings() {
    let base = TempDir::new().unwrap();
    let config = Settings { cleanup_paths: false, ..settings(base.path()) };
    let pdd = PrivateDataDir::create(&config, JobId::new(1)).unwrap();
    let path = pdd.path().to_path_buf();
    pdd.cleanup().unwrap();
    assert!(path.is_dir());
}

#[test]
fn writes_named_and_random_files_with_mode() {
    let base = TempDir::new().unwrap();
    let pdd = PrivateDataDir::create(&settings(base.path()), JobId::new(7)).unwrap();

    let named = pdd.write_private_data_file(Some("extravars"), "a: 1\n", Some("env"), SECRET_MODE).unwrap();
    assert_eq!(named, pdd.path().join("env/extravars"));
    assert_eq!(fs::read_to_string(&named).unwrap(), "a: 1\n");
    assert_eq!(mode(&named), 0o600);

    let random = pdd.write_private_data_file(None, "key", Some("env"), SECRET_MODE).unwrap();
    assert_eq!(random.parent().unwrap(), pdd.path().join("env"));
    assert_ne!(random, named);

    let nested = pdd
        .write_private_data_file(Some("ssh_key_data-cert.pub"), "cert", Some("artifacts/7"), 0o644)
        .unwrap();
    assert_eq!(mode(pdd.path().join("artifacts").as_path()), 0o700);
    assert_eq!(mode(&nested), 0o644);
}

#[test]
fn runner_paths_follow_container_mount() {
    let base = TempDir::new().unwrap();
    let pdd = PrivateDataDir::create(&settings(base.path()), JobId::new(3)).unwrap();
    let file = pdd.path().join("env/cred");
    assert_eq!(pdd.runner_path(&file), file.display().to_string());

    let pdd = pdd.containerized(true);
    assert_eq!(pdd.runner_path(&file), "/runner/env/cred");
    assert_eq!(pdd.runner_path(Path::new("/elsewhere/file")), "/elsewhere/file");
}

#[test]
fn ensure_project_dir_is_idempotent() {
    let base = TempDir::new().unwrap();
    let pdd = PrivateDataDir::create(&settings(base.path()), JobId::new(3)).unwrap();
    let first = pdd.ensure_project_dir().unwrap();
    fs::write(first.join("site.yml"), "- hosts: all\n").unwrap();
    let second = pdd.ensure_project_dir().unwrap();
    assert_eq!(first, second);
    assert!(second.join("site.yml").exists());
}
