#![cfg(unix)]
//! Smoke tests for `extrun run`
//!
//! Scenarios covered:
//! - exit codes pass through, including signal terminations
//! - output redirection to files
//! - sequence numbers are recorded only after a successful command
//! - detached commands return immediately
//! - spawn failures exit 1, with stacks only under --verbose-errors

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn extrun(state_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("extrun").unwrap();
    cmd.env_remove("EXTRUN_SHELL")
        .env_remove("EXTRUN_SEQUENCE_FILE")
        .env_remove("EXTRUN_LOG")
        .env_remove("EXTRUN_LOG_FORMAT")
        .env_remove("RUST_LOG")
        .env_remove("RUST_BACKTRACE")
        .env_remove("RUST_LIB_BACKTRACE")
        .env("EXTRUN_STATE_DIR", state_dir);
    cmd
}

#[test]
fn smoke_exit_code_passes_through() {
    let temp = TempDir::new().unwrap();
    for code in [0, 1, 3, 42] {
        extrun(temp.path())
            .args(["run", "--", &format!("exit {}", code)])
            .assert()
            .code(code);
    }
}

#[test]
fn smoke_signal_termination_maps_to_128_plus_signal() {
    let temp = TempDir::new().unwrap();
    extrun(temp.path())
        .args(["run", "--", "kill -TERM $$"])
        .assert()
        .code(143);
}

#[test]
fn smoke_stdout_and_stderr_files() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out.log");
    let err = temp.path().join("err.log");

    extrun(temp.path())
        .arg("run")
        .arg("--workdir")
        .arg(temp.path())
        .arg("--stdout")
        .arg(&out)
        .arg("--stderr")
        .arg(&err)
        .args(["--", "echo to-out; echo to-err >&2; pwd"])
        .assert()
        .success();

    let stdout = fs::read_to_string(&out).unwrap();
    assert!(stdout.starts_with("to-out\n"));
    let workdir = fs::canonicalize(temp.path()).unwrap();
    assert!(stdout.contains(workdir.to_str().unwrap()));
    assert_eq!(fs::read_to_string(&err).unwrap(), "to-err\n");
}

#[test]
fn smoke_sequence_recorded_only_on_success() {
    let temp = TempDir::new().unwrap();
    let identity = [
        "--extension",
        "Contoso.Agent",
        "--extension-version",
        "1.0",
    ];

    extrun(temp.path())
        .arg("run")
        .args(identity)
        .args(["--sequence", "4", "--", "exit 9"])
        .assert()
        .code(9);
    assert!(!temp.path().join("mrseq").exists());

    extrun(temp.path())
        .arg("run")
        .args(identity)
        .args(["--sequence", "4", "--", "true"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(temp.path().join("mrseq")).unwrap(), "4");

    extrun(temp.path())
        .arg("run")
        .args(identity)
        .args(["--sequence", "5", "--", "exit 2"])
        .assert()
        .code(2);
    assert_eq!(fs::read_to_string(temp.path().join("mrseq")).unwrap(), "4");
}

#[test]
fn smoke_detached_returns_immediately() {
    let temp = TempDir::new().unwrap();

    // The background job drops the captured pipes so the assertion does not wait on it.
    let start = Instant::now();
    extrun(temp.path())
        .arg("run")
        .arg("--workdir")
        .arg(temp.path())
        .args([
            "--detach",
            "--",
            "exec >/dev/null 2>&1; sleep 3; touch detached-done",
        ])
        .assert()
        .success();
    assert!(start.elapsed() < Duration::from_millis(2500));

    let marker = temp.path().join("detached-done");
    let deadline = Instant::now() + Duration::from_secs(10);
    while !marker.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(marker.exists());
}

#[test]
fn smoke_missing_shell_exits_one_without_stack() {
    let temp = TempDir::new().unwrap();
    extrun(temp.path())
        .env("EXTRUN_SHELL", "/nonexistent/bin/sh")
        .args(["run", "--", "true"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to execute command"))
        .stderr(predicate::str::contains("stack backtrace:").not());
}

#[test]
fn smoke_verbose_errors_render_stack() {
    let temp = TempDir::new().unwrap();
    extrun(temp.path())
        .env("EXTRUN_SHELL", "/nonexistent/bin/sh")
        .args(["--verbose-errors", "run", "--", "true"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("lifecycle command failed"))
        .stderr(predicate::str::contains("stack backtrace:"));
}

#[test]
fn smoke_missing_workdir_exits_one() {
    let temp = TempDir::new().unwrap();
    extrun(temp.path())
        .arg("run")
        .arg("--workdir")
        .arg(temp.path().join("does-not-exist"))
        .args(["--", "true"])
        .assert()
        .code(1);
}
