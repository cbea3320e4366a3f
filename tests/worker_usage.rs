//! Command-line contract of the worker binaries.

use assert_cmd::Command;

#[test]
fn fetch_worker_prints_usage() {
    let assert = Command::cargo_bin("aft-fetch")
        .expect("binary")
        .arg("--help")
        .assert()
        .success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.contains("Fetch worker"));
}

#[test]
fn send_worker_prints_usage() {
    let assert = Command::cargo_bin("aft-send")
        .expect("binary")
        .arg("--help")
        .assert()
        .success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.contains("Send worker"));
}

#[test]
fn send_worker_requires_a_recipient() {
    Command::cargo_bin("aft-send")
        .expect("binary")
        .args([
            "--work-dir",
            "/tmp/none",
            "--host-alias",
            "alpha",
            "--fsa-pos",
            "0",
            "--hostname",
            "mail.example.net",
            "--msg-name",
            "1_1_0",
            "--from",
            "aft@example.net",
        ])
        .assert()
        .failure();
}
