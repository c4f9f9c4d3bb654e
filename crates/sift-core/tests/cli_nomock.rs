//! CLI tests for the sift binary.
//!
//! Every test points the binary at a store inside a temp directory and
//! clears the credential environment so the host's settings never leak in.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::tempdir;

/// Get a Command for the sift binary bound to `store`.
fn sift(store: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("sift");
    cmd.env_remove("SIFT_ACCOUNT_ID")
        .env_remove("SIFT_BEACON_KEY")
        .env_remove("SIFT_SERVER_URL_FORMAT")
        .env_remove("SIFT_STORE")
        .env_remove("SIFT_LOG")
        .env_remove("SIFT_LOG_FORMAT")
        .env_remove("RUST_LOG")
        .arg("--store")
        .arg(store)
        .arg("--log-level")
        .arg("off");
    cmd
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout is JSON")
}

// ============================================================================
// Help
// ============================================================================

#[test]
fn help_lists_commands() {
    cargo_bin_cmd!("sift")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("send"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("config"));
}

// ============================================================================
// config
// ============================================================================

#[test]
fn config_set_then_show() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("store.json");

    sift(&store)
        .args([
            "config",
            "set",
            "--account-id",
            "acct",
            "--beacon-key",
            "key",
            "--destination",
            "other:other-key",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"saved\": true"));

    let output = sift(&store).args(["config", "show"]).output().unwrap();
    assert!(output.status.success());
    let shown = stdout_json(&output.stdout);
    assert_eq!(shown["source"], "persisted store");
    assert_eq!(shown["valid"], true);
    assert_eq!(shown["config"]["account_id"], "acct");
    assert_eq!(
        shown["config"]["additional_destinations"][0]["account_id"],
        "other"
    );
}

#[test]
fn config_show_on_empty_store_reports_default() {
    let dir = tempdir().unwrap();
    let output = sift(&dir.path().join("store.json"))
        .args(["config", "show"])
        .output()
        .unwrap();
    let shown = stdout_json(&output.stdout);
    assert_eq!(shown["source"], "builtin default");
    assert_eq!(shown["valid"], false);
}

#[test]
fn config_set_rejects_blank_credentials() {
    let dir = tempdir().unwrap();
    sift(&dir.path().join("store.json"))
        .args(["config", "set", "--account-id", " ", "--beacon-key", "key"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("account_id"));
}

#[test]
fn config_set_rejects_malformed_destination() {
    let dir = tempdir().unwrap();
    sift(&dir.path().join("store.json"))
        .args([
            "config",
            "set",
            "--account-id",
            "acct",
            "--beacon-key",
            "key",
            "--destination",
            "no-separator",
        ])
        .assert()
        .code(10);
}

// ============================================================================
// send + inspect
// ============================================================================

#[test]
fn send_without_config_buffers_nothing_and_reports() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("store.json");
    let events = dir.path().join("events.jsonl");
    std::fs::write(
        &events,
        "{\"time\": 1, \"custom\": {\"a\": 1}}\n\nnot json\n{\"custom\": {\"a\": 2}}\n",
    )
    .unwrap();

    let output = sift(&store)
        .args(["send", "--stream", "custom", "--user-id", "u1"])
        .arg(&events)
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary = stdout_json(&output.stdout);
    assert_eq!(summary["appended"], 2);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["destinations"], 0);

    let output = sift(&store).arg("inspect").output().unwrap();
    assert!(output.status.success());
    let snapshot = stdout_json(&output.stdout);
    assert_eq!(snapshot["user_id"], "u1");
    assert!(snapshot["installation_id"].is_string());
    // The forced upload drained the stream even though nothing was sent.
    assert_eq!(snapshot["queues"]["custom"]["pending"], 0);
    assert_eq!(snapshot["queues"]["app-state"]["pending"], 0);
    assert!(snapshot["queues"]["device-properties"].is_object());
}

#[test]
fn send_reads_stdin() {
    let dir = tempdir().unwrap();
    let output = sift(&dir.path().join("store.json"))
        .args(["send", "--stream", "custom"])
        .write_stdin("{\"time\": 5, \"custom\": {}}\n")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output.stdout)["appended"], 1);
}

#[test]
fn send_requires_both_credentials() {
    let dir = tempdir().unwrap();
    sift(&dir.path().join("store.json"))
        .args(["send", "--stream", "custom", "--account-id", "acct"])
        .write_stdin("")
        .assert()
        .code(10);
}

#[test]
fn send_credentials_do_not_replace_stored_config() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("store.json");

    sift(&store)
        .args([
            "config",
            "set",
            "--account-id",
            "persisted",
            "--beacon-key",
            "pk",
            "--destination",
            "fan:fk",
        ])
        .assert()
        .success();

    sift(&store)
        .args([
            "send",
            "--stream",
            "custom",
            "--account-id",
            "oneoff",
            "--beacon-key",
            "ok",
            "--server-url-format",
            "http://127.0.0.1:9/%s",
        ])
        .write_stdin("{\"time\": 1, \"custom\": {}}\n")
        .assert()
        .success();

    let output = sift(&store).args(["config", "show"]).output().unwrap();
    let shown = stdout_json(&output.stdout);
    assert_eq!(shown["source"], "persisted store");
    assert_eq!(shown["config"]["account_id"], "persisted");
    assert_eq!(
        shown["config"]["additional_destinations"][0]["account_id"],
        "fan"
    );
}

#[test]
fn send_credentials_leave_empty_store_unconfigured() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("store.json");

    sift(&store)
        .args([
            "send",
            "--stream",
            "custom",
            "--account-id",
            "oneoff",
            "--beacon-key",
            "ok",
            "--server-url-format",
            "http://127.0.0.1:9/%s",
        ])
        .write_stdin("")
        .assert()
        .success();

    let output = sift(&store).args(["config", "show"]).output().unwrap();
    assert_eq!(stdout_json(&output.stdout)["source"], "builtin default");
}

// ============================================================================
// Logging
// ============================================================================

#[test]
fn rust_log_does_not_override_log_level_flag() {
    let dir = tempdir().unwrap();
    sift(&dir.path().join("store.json"))
        .env("RUST_LOG", "debug")
        .args(["send", "--stream", "custom"])
        .write_stdin("{\"time\": 1, \"custom\": {}}\n")
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

#[test]
fn rust_log_applies_without_other_settings() {
    let dir = tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("sift");
    cmd.env_remove("SIFT_LOG")
        .env_remove("SIFT_LOG_FORMAT")
        .env_remove("SIFT_ACCOUNT_ID")
        .env_remove("SIFT_BEACON_KEY")
        .env_remove("SIFT_SERVER_URL_FORMAT")
        .env("RUST_LOG", "debug")
        .arg("--store")
        .arg(dir.path().join("store.json"))
        .args(["send", "--stream", "custom"])
        .write_stdin("")
        .assert()
        .success()
        .stderr(predicate::str::contains("queue created"));
}

#[test]
fn inspect_empty_store() {
    let dir = tempdir().unwrap();
    let output = sift(&dir.path().join("store.json"))
        .arg("inspect")
        .output()
        .unwrap();
    assert!(output.status.success());
    let snapshot = stdout_json(&output.stdout);
    assert!(snapshot["config"].is_null());
    assert!(snapshot["queues"].as_object().unwrap().is_empty());
}
