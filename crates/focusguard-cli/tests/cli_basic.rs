//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs.

use std::io::Write;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "focusguard-cli", "--"])
        .args(args)
        .env("FOCUSGUARD_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

const SCENARIO: &str = r#"
name = "cli walk away"

[config]
auto_face_control = true

[[steps]]
present = true
repeat = 2

[[steps]]
command = "start"

[[steps]]
present = false
repeat = 2
"#;

#[test]
fn test_config_list_is_json() {
    let (stdout, stderr, code) = run_cli(&["config", "list"]);
    assert_eq!(code, 0, "config list failed: {stderr}");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert!(parsed.get("work_duration_minutes").is_some());
    assert!(parsed.get("presence_debounce_count").is_some());
}

#[test]
fn test_config_get_unknown_key_fails() {
    let (_, stderr, code) = run_cli(&["config", "get", "no_such_key"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_config_set_rejects_invalid_value() {
    let (_, stderr, code) = run_cli(&["config", "set", "presence_debounce_count", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("presence_debounce_count"));
}

#[test]
fn test_config_validate_file() {
    let good = write_temp("work_duration_minutes = 50\n");
    let (stdout, _, code) = run_cli(&["config", "validate", "--file", good.path().to_str().unwrap()]);
    assert_eq!(code, 0);
    assert!(stdout.contains("ok"));

    let bad = write_temp("sampling_interval_ms = 5\n");
    let (_, stderr, code) = run_cli(&["config", "validate", "--file", bad.path().to_str().unwrap()]);
    assert_eq!(code, 1);
    assert!(stderr.contains("sampling_interval_ms"));
}

#[test]
fn test_simulate_prints_report() {
    let scenario = write_temp(SCENARIO);
    let (stdout, stderr, code) = run_cli(&["simulate", scenario.path().to_str().unwrap()]);
    assert_eq!(code, 0, "simulate failed: {stderr}");
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(report["name"], "cli walk away");
    assert_eq!(report["final_state"]["paused_reason"], "auto_pause_absence");
    assert_eq!(report["presence"], "absent");
}

#[test]
fn test_simulate_events_only() {
    let scenario = write_temp(SCENARIO);
    let (stdout, _, code) = run_cli(&["simulate", "--events-only", scenario.path().to_str().unwrap()]);
    assert_eq!(code, 0);
    let events: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    let kinds: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"]["type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"AutoPaused"));
}

#[test]
fn test_simulate_missing_file_fails() {
    let (_, stderr, code) = run_cli(&["simulate", "/nonexistent/scenario.toml"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}
