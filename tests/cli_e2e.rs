//! End-to-end CLI tests for the sitesync binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Command isolated from the user's configuration file.
fn sitesync(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sitesync").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let config_home = TempDir::new().unwrap();
    sitesync(&config_home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Keep a local directory tree in sync"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let config_home = TempDir::new().unwrap();
    sitesync(&config_home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sitesync"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let config_home = TempDir::new().unwrap();
    sitesync(&config_home)
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that an empty task stream completes without downloading anything.
#[test]
fn test_binary_empty_stdin_succeeds() {
    let config_home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    sitesync(&config_home)
        .arg("--root")
        .arg(root.path())
        .write_stdin("")
        .assert()
        .success();
    assert!(root.path().join(".sitesync-cache.db").exists());
}

/// Test that a malformed config file is reported.
#[test]
fn test_binary_rejects_unknown_config_key() {
    let config_home = TempDir::new().unwrap();
    let config_path = config_home.path().join("bad.toml");
    std::fs::write(&config_path, "root = \"/tmp\"\nretries = 3\n").unwrap();

    sitesync(&config_home)
        .arg("--config")
        .arg(&config_path)
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading configuration"));
}

/// Test that --root completes a config file that has no usable root.
#[test]
fn test_binary_root_flag_overrides_config_file() {
    let config_home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    for contents in ["workers = 2\n", "root = \"relative/dir\"\nworkers = 2\n"] {
        let config_path = config_home.path().join("partial.toml");
        std::fs::write(&config_path, contents).unwrap();

        sitesync(&config_home)
            .arg("--config")
            .arg(&config_path)
            .arg("--root")
            .arg(root.path())
            .write_stdin("")
            .assert()
            .success();
    }
    assert!(root.path().join(".sitesync-cache.db").exists());
}

/// Test that a config file without root still fails when --root is absent.
#[test]
fn test_binary_missing_root_is_reported() {
    let config_home = TempDir::new().unwrap();
    let config_path = config_home.path().join("partial.toml");
    std::fs::write(&config_path, "workers = 2\n").unwrap();

    sitesync(&config_home)
        .arg("--config")
        .arg(&config_path)
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

/// Test a full run: manifest in, file on disk.
#[tokio::test(flavor = "multi_thread")]
async fn test_binary_downloads_manifest_tasks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"lecture notes".to_vec())
                .insert_header("ETag", "\"n1\""),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config_home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let manifest = root.path().join("tasks.jsonl");
    std::fs::write(
        &manifest,
        format!(
            "{{\"key\": \"n\", \"path\": \"Week 1/notes.pdf\", \"url\": \"{}/notes.pdf\"}}\nnot json\n",
            server.uri()
        ),
    )
    .unwrap();

    let mut cmd = sitesync(&config_home);
    cmd.arg("--root").arg(root.path()).arg("-w").arg("2").arg(&manifest);
    let output = tokio::task::spawn_blocking(move || cmd.assert().success().get_output().clone())
        .await
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Skipped malformed task"), "stderr: {stderr}");
    assert_eq!(
        std::fs::read(root.path().join("Week 1/notes.pdf")).unwrap(),
        b"lecture notes"
    );
}
