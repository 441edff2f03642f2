//! Command-line surface tests.
//!
//! These avoid launching real nodes; end-to-end runs live in the devnode
//! integration tests.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn chainharness(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("chainharness").unwrap();
    cmd.current_dir(dir.path()).env("NO_COLOR", "1");
    cmd
}

// ============================================================================
// Help and listing
// ============================================================================

#[test]
fn help_lists_scenarios() {
    let dir = TempDir::new().unwrap();
    chainharness(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("smsg"))
        .stdout(predicate::str::contains("timestampindex"))
        .stdout(predicate::str::contains("all"));
}

#[test]
fn version_flag_shows_version() {
    let dir = TempDir::new().unwrap();
    chainharness(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("chainharness"));
}

#[test]
fn list_shows_every_scenario_with_node_count() {
    let dir = TempDir::new().unwrap();
    chainharness(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("smsg"))
        .stdout(predicate::str::contains("anon"))
        .stdout(predicate::str::contains("txindex"))
        .stdout(predicate::str::contains("timestampindex"))
        .stdout(predicate::str::contains("Nodes"));
}

#[test]
fn no_command_shows_usage() {
    let dir = TempDir::new().unwrap();
    chainharness(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn unknown_scenario_is_rejected() {
    let dir = TempDir::new().unwrap();
    chainharness(&dir)
        .arg("nosuchscenario")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn invalid_keep_data_value_is_rejected() {
    let dir = TempDir::new().unwrap();
    chainharness(&dir)
        .args(["smsg", "--keep-data", "sometimes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn config_shows_defaults_as_toml() {
    let dir = TempDir::new().unwrap();
    chainharness(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[timeouts]"))
        .stdout(predicate::str::contains("regtest"));
}

#[test]
fn config_reads_project_file_and_flags() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("chainharness.toml"),
        "[ports]\np2p_base = 15000\nrpc_base = 16000\n",
    )
    .unwrap();

    chainharness(&dir)
        .args(["config", "--format", "json", "--keep-data", "never"])
        .assert()
        .success()
        .stdout(predicate::str::contains("15000"))
        .stdout(predicate::str::contains("\"never\""));
}

#[test]
fn config_rejects_unknown_format() {
    let dir = TempDir::new().unwrap();
    chainharness(&dir)
        .args(["config", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}

#[test]
fn config_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("chainharness.toml"),
        "[timeouts]\npoll_interval_ms = 0\n",
    )
    .unwrap();

    chainharness(&dir)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("poll_interval_ms"));
}

// ============================================================================
// Failing runs
// ============================================================================

#[test]
fn missing_binary_fails_with_report() {
    let dir = TempDir::new().unwrap();
    let runs = dir.path().join("runs");

    chainharness(&dir)
        .args([
            "smsg",
            "--binary",
            "/nonexistent/chainharness-devnode",
            "--keep-data",
            "always",
            "--workdir",
            runs.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("smsg failed"));

    assert!(runs.join("smsg").exists());
}
