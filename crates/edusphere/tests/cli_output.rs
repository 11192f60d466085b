//! Integration tests for CLI output behavior
//!
//! The default behavior is quiet (no logs). Use -v/--verbose to enable logs.
//! Every run gets its own HOME and working directory so no real config leaks in.

use std::path::Path;
use std::process::{Command, Output};

fn edusphere(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_edusphere"))
        .current_dir(dir)
        .env("HOME", dir)
        .env_remove("EDUSPHERE_BACKEND_URL")
        .env_remove("EDUSPHERE_BACKEND_KEY")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to execute edusphere")
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{} failed with exit code {:?}. stderr: {}",
        what,
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, l))
        })
        .collect()
}

#[test]
fn test_simulate_json_emits_snapshots_and_summary() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = edusphere(temp_dir.path(), &["simulate", "--seconds", "1", "--json"]);
    assert_success(&output, "edusphere simulate");

    let lines = json_lines(&output);
    assert!(lines.len() >= 2, "expected snapshots and a summary, got {:?}", lines);

    let first = &lines[0];
    assert_eq!(first["type"], "snapshot");
    assert_eq!(first["metrics"]["totalCourses"], 5);

    let summary = lines.last().unwrap();
    assert_eq!(summary["type"], "summary");
    assert_eq!(summary["metrics"]["totalCourses"], 5);
    assert!(summary["metrics"]["recentCompletions"].as_u64().unwrap() >= 2);

    // Teardown closes every channel that was opened
    assert_eq!(summary["channels"]["opened"], summary["channels"]["closed"]);
    assert_eq!(summary["channels"]["active"], 0);
    assert_eq!(summary["analytics_pending"], 0);
}

#[test]
fn test_simulate_stdout_is_clean() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = edusphere(temp_dir.path(), &["simulate", "--seconds", "1"]);
    assert_success(&output, "edusphere simulate");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        !stdout.contains(r#""event":"#),
        "stdout should not contain JSON logs, got: {}",
        stdout
    );
    assert!(stdout.contains("Simulation finished"));
    assert!(stdout.contains("Channels:"));

    assert!(
        !stderr.contains(r#""level":"INFO""#),
        "Default mode should not emit INFO logs, got: {}",
        stderr
    );
}

#[test]
fn test_verbose_logs_go_to_stderr() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = edusphere(temp_dir.path(), &["-v", "config"]);
    assert_success(&output, "edusphere -v config");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        stderr.contains("core.app.startup_completed"),
        "Verbose mode should log startup, got: {}",
        stderr
    );
    assert!(!stdout.contains("core.app.startup_completed"));
}

#[test]
fn test_config_json_redacts_api_key() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = Command::new(env!("CARGO_BIN_EXE_edusphere"))
        .current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env("EDUSPHERE_BACKEND_URL", "https://project.supabase.co")
        .env("EDUSPHERE_BACKEND_KEY", "very-secret-key")
        .args(["config", "--json"])
        .output()
        .expect("Failed to execute edusphere");
    assert_success(&output, "edusphere config --json");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("very-secret-key"));

    let config: serde_json::Value = serde_json::from_str(&stdout).expect("config should be JSON");
    assert_eq!(config["backend"]["url"], "https://project.supabase.co");
    assert_eq!(config["backend"]["api_key"], "***");
}

#[test]
fn test_metrics_without_backend_fails() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = edusphere(temp_dir.path(), &["metrics"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("EDUSPHERE_BACKEND_URL"),
        "Expected a configuration hint, got: {}",
        stderr
    );
}
