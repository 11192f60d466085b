//! Integration tests for config warning behavior.

use std::fs;
use std::process::Command;

/// Test that an invalid config file produces a warning in stderr.
#[test]
fn test_config_warning_on_invalid_toml() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_dir = temp_dir.path().join(".edusphere");
    fs::create_dir_all(&config_dir).expect("Failed to create .edusphere dir");

    fs::write(config_dir.join("config.toml"), "invalid toml [[[")
        .expect("Failed to write invalid config");

    let output = Command::new(env!("CARGO_BIN_EXE_edusphere"))
        .current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .arg("config")
        .output()
        .expect("Failed to execute edusphere");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        stderr.contains("Warning: Could not load config"),
        "Expected warning in stderr, got: {}",
        stderr
    );
    assert!(
        stderr.contains("Tip: Check"),
        "Expected tip about config files in stderr, got: {}",
        stderr
    );
    // Falls back to defaults and still succeeds
    assert!(output.status.success());
}

/// Test that an invalid value is reported the same way as a parse error.
#[test]
fn test_config_warning_on_invalid_value() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_dir = temp_dir.path().join(".edusphere");
    fs::create_dir_all(&config_dir).expect("Failed to create .edusphere dir");

    fs::write(
        config_dir.join("config.toml"),
        r#"
[metrics]
polling_interval_ms = 0
"#,
    )
    .expect("Failed to write config");

    let output = Command::new(env!("CARGO_BIN_EXE_edusphere"))
        .current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .arg("config")
        .output()
        .expect("Failed to execute edusphere");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Warning: Could not load config"),
        "Expected warning in stderr, got: {}",
        stderr
    );
}

/// Test that a valid config file does not produce warnings.
#[test]
fn test_no_warning_on_valid_config() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_dir = temp_dir.path().join(".edusphere");
    fs::create_dir_all(&config_dir).expect("Failed to create .edusphere dir");

    fs::write(
        config_dir.join("config.toml"),
        r#"
[metrics]
polling_interval_ms = 30000

[ui]
theme = "dark"
"#,
    )
    .expect("Failed to write valid config");

    let output = Command::new(env!("CARGO_BIN_EXE_edusphere"))
        .current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .args(["config", "--json"])
        .output()
        .expect("Failed to execute edusphere");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains("Warning: Could not load config"),
        "Unexpected warning in stderr: {}",
        stderr
    );

    let config: serde_json::Value =
        serde_json::from_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert_eq!(config["metrics"]["polling_interval_ms"], 30000);
    assert_eq!(config["ui"]["theme"], "dark");
}
