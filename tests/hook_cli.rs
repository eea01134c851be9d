//! Runs the `rusty-guard` binary the way a host would: event on stdin,
//! decision on stdout.

#![allow(clippy::unwrap_used)]

use std::io::{self, Write};
use std::process::{Command, Stdio};

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;

fn run_hook(project: &TempDir, stdin: &[u8]) -> Value {
    let mut child = Command::new(env!("CARGO_BIN_EXE_rusty-guard"))
        .env("RUSTY_GUARD_PROJECT_DIR", project.path())
        .env("RUSTY_GUARD_LOG_DIR", project.path().join("logs"))
        .env_remove("RUSTY_GUARD_CONFIG")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // The gate may stop reading early on oversized input.
    if let Err(e) = child.stdin.take().unwrap().write_all(stdin) {
        assert_eq!(e.kind(), io::ErrorKind::BrokenPipe, "writing stdin: {e}");
    }
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "non-zero exit: {:?}", output.status);
    serde_json::from_slice(&output.stdout).unwrap()
}

fn run_event(project: &TempDir, event: Value) -> Value {
    run_hook(project, event.to_string().as_bytes())
}

#[test]
fn test_blocks_destructive_command() {
    let project = TempDir::new().unwrap();
    let out = run_event(
        &project,
        json!({"tool_name": "Bash", "tool_input": {"command": "rm -rf /"}}),
    );
    assert_eq!(out["verdict"], "block");
    assert!(out["reason"].as_str().unwrap().contains("Recursive force delete"));
    assert!(project.path().join(".rusty-guard").join("audit.log").exists());
}

#[test]
fn test_read_only_command_is_auto_approved() {
    let project = TempDir::new().unwrap();
    let out = run_event(
        &project,
        json!({"tool_name": "Bash", "tool_input": {"command": "git status"}}),
    );
    assert_eq!(out, json!({"verdict": "allow", "auto_approve": true}));
}

#[test]
fn test_warning_is_reported() {
    let project = TempDir::new().unwrap();
    let out = run_event(
        &project,
        json!({"tool_name": "Bash", "tool_input": {"command": "sudo apt install x"}}),
    );
    assert_eq!(out["verdict"], "allow");
    assert!(out.get("auto_approve").is_none());
    assert!(!out["warnings"].as_array().unwrap().is_empty());
}

#[test]
fn test_protected_file_write_is_blocked() {
    let project = TempDir::new().unwrap();
    let out = run_event(
        &project,
        json!({"tool_name": "Write", "tool_input": {"file_path": "/etc/passwd", "content": "x"}}),
    );
    assert_eq!(out["verdict"], "block");
    assert!(out["reason"].as_str().unwrap().contains("Protected path"));
}

#[test]
fn test_malformed_input_fails_open() {
    let project = TempDir::new().unwrap();
    assert_eq!(run_hook(&project, b"this is not json"), json!({"verdict": "allow"}));
    assert_eq!(run_hook(&project, b""), json!({"verdict": "allow"}));
}

#[test]
fn test_oversized_stdin_fails_closed() {
    let project = TempDir::new().unwrap();
    std::fs::write(
        project.path().join(".rusty-guard.json"),
        r#"{ "max_input_bytes": 1024 }"#,
    )
    .unwrap();

    let command = "echo ok ".repeat(512);
    let out = run_event(
        &project,
        json!({"tool_name": "Bash", "tool_input": {"command": command}}),
    );
    assert_eq!(out["verdict"], "block");
    assert!(out["reason"].as_str().unwrap().starts_with("Input too large"));

    let log = std::fs::read_to_string(project.path().join(".rusty-guard").join("audit.log")).unwrap();
    let entries: Vec<Value> = log.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    let security: Vec<&Value> = entries.iter().filter(|e| e["level"] == "security").collect();
    assert_eq!(security.len(), 1, "audit log: {log}");
    let message = security[0]["message"].as_str().unwrap();
    assert!(message.starts_with("stdin block: Input too large"), "{message}");
    assert!(!message.contains("echo ok"));
}

#[test]
fn test_gate_config_write_is_blocked() {
    let project = TempDir::new().unwrap();
    let out = run_event(
        &project,
        json!({"tool_name": "Write", "tool_input": {"file_path": ".rusty-guard.json", "content": "{}"}}),
    );
    assert_eq!(out["verdict"], "block");
    assert!(out["reason"].as_str().unwrap().contains("gate configuration or audit log"));
}
