//! CLI integration tests

use std::process::{Command, Output};

fn devctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_devctl"))
        .args(args)
        .env_remove("DEVCTL_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = devctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Parking Device Telemetry"),
        "Should show app name"
    );
    assert!(stdout.contains("devices"), "Should show devices command");
    assert!(stdout.contains("readings"), "Should show readings command");
    assert!(stdout.contains("health"), "Should show health command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = devctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("devctl"), "Should show binary name");
}

/// Test devices subcommand help lists every operation
#[test]
fn test_devices_help() {
    let output = devctl(&["devices", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Devices help should succeed");
    for cmd in ["list", "get", "register", "remove"] {
        assert!(stdout.contains(cmd), "Should show {} command", cmd);
    }
}

/// Test devices list filter options
#[test]
fn test_devices_list_help() {
    let output = devctl(&["devices", "list", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "List help should succeed");
    assert!(stdout.contains("--type"), "Should show type option");
    assert!(stdout.contains("--status"), "Should show status option");
    assert!(stdout.contains("--lat"), "Should show lat option");
    assert!(stdout.contains("--lon"), "Should show lon option");
    assert!(stdout.contains("--radius-km"), "Should show radius option");
}

/// Test readings subcommand help
#[test]
fn test_readings_help() {
    let output = devctl(&["readings", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Readings help should succeed");
    assert!(stdout.contains("--limit"), "Should show limit option");
}

/// Test format option
#[test]
fn test_format_option() {
    let output = devctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
}

/// Test api-url option
#[test]
fn test_api_url_option() {
    let output = devctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("DEVCTL_API_URL"), "Should show env var");
}

/// A radius search needs all three coordinates
#[test]
fn test_partial_radius_rejected() {
    let output = devctl(&["devices", "list", "--lat", "40.4", "--lon", "-3.7"]);

    assert!(!output.status.success(), "Partial radius filter should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("radius-km") || stderr.contains("required"),
        "Should name the missing argument"
    );
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = devctl(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = devctl(&["devices", "get"]);

    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}
