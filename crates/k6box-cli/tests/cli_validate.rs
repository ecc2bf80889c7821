// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::uninlined_format_args)]
#![allow(missing_docs)]
#![cfg(unix)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use k6box::config::HarnessConfig;
use k6box::{ErrorCode, ValidationResult};
use k6box_fixtures::{
    stderr, FakeK6, SCRIPT_EXIT_CODE, SYNTAX_ERROR_STDERR, THRESHOLD_EXIT_CODE, THRESHOLD_STDERR,
    VALID_SCRIPT,
};

fn k6box_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_k6box"));
    cmd.env_remove("K6BOX_BINARY")
        .env_remove("K6BOX_VALIDATE_TIMEOUT_MS")
        .env_remove("K6BOX_RUN_TIMEOUT_MS")
        .env("NO_COLOR", "1");
    cmd
}

/// Write a YAML config pointing at `binary` and staging scripts in `dir/staging`.
fn write_config(dir: &Path, binary: &Path) -> PathBuf {
    let staging = dir.join("staging");
    fs::create_dir_all(&staging).unwrap();
    let config = HarnessConfig {
        binary: binary.display().to_string(),
        temp_dir: Some(staging),
        ..HarnessConfig::default()
    };
    let path = dir.join("k6box.yaml");
    fs::write(&path, serde_yml::to_string(&config).unwrap()).unwrap();
    path
}

fn validate(dir: &Path, k6: &FakeK6, script: &str) -> (Output, ValidationResult) {
    let script_path = dir.join("test.js");
    fs::write(&script_path, script).unwrap();
    let config = write_config(dir, &k6.binary);
    let output = k6box_bin()
        .arg("validate")
        .arg("--config")
        .arg(&config)
        .arg("--script")
        .arg(&script_path)
        .arg("--json")
        .output()
        .expect("failed to execute");
    let result: ValidationResult = serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not a validation result ({err}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (output, result)
}

#[test]
fn valid_script_exits_zero_with_json_result() {
    let dir = tempfile::tempdir().unwrap();
    let k6 = FakeK6::install(dir.path(), "exit 0");
    let (output, result) = validate(dir.path(), &k6, VALID_SCRIPT);

    assert_eq!(output.status.code(), Some(0));
    assert!(result.valid);
    assert!(result.summary.ready_to_run);
    assert_eq!(fs::read_dir(dir.path().join("staging")).unwrap().count(), 0);
}

#[test]
fn threshold_failure_still_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let body = format!("{}\nexit {}", stderr(THRESHOLD_STDERR), THRESHOLD_EXIT_CODE);
    let k6 = FakeK6::install(dir.path(), &body);
    let (output, result) = validate(dir.path(), &k6, VALID_SCRIPT);

    assert_eq!(output.status.code(), Some(0));
    assert!(result.valid);
    assert_eq!(result.exit_code, THRESHOLD_EXIT_CODE);
}

#[test]
fn syntax_error_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let body = format!("{}\nexit {}", stderr(SYNTAX_ERROR_STDERR), SCRIPT_EXIT_CODE);
    let k6 = FakeK6::install(dir.path(), &body);
    let (output, result) = validate(dir.path(), &k6, VALID_SCRIPT);

    assert_eq!(output.status.code(), Some(1));
    assert!(!result.valid);
}

#[test]
fn dangerous_script_exits_two_without_running_k6() {
    let dir = tempfile::tempdir().unwrap();
    let k6 = FakeK6::install(dir.path(), "exit 0");
    let script = format!("const cp = require(\"child_process\");\n{}", VALID_SCRIPT);
    let (output, result) = validate(dir.path(), &k6, &script);

    assert_eq!(output.status.code(), Some(2));
    assert_eq!(result.error.unwrap().code, ErrorCode::SecurityValidation);
    assert!(!k6.was_invoked());
}

#[test]
fn missing_binary_exits_three() {
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("test.js");
    fs::write(&script_path, VALID_SCRIPT).unwrap();
    let output = k6box_bin()
        .env("K6BOX_BINARY", dir.path().join("absent-k6"))
        .arg("validate")
        .arg("--script")
        .arg(&script_path)
        .arg("--json")
        .output()
        .expect("failed to execute");

    assert_eq!(output.status.code(), Some(3));
    let result: ValidationResult = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result.error.unwrap().code, ErrorCode::K6NotFound);
}

#[test]
fn script_can_be_read_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let k6 = FakeK6::install(dir.path(), "exit 0");
    let config = write_config(dir.path(), &k6.binary);
    let mut child = k6box_bin()
        .arg("validate")
        .arg("--config")
        .arg(&config)
        .arg("--script")
        .arg("-")
        .arg("--json")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(VALID_SCRIPT.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert!(k6.was_invoked());
}

#[test]
fn human_output_lists_next_steps() {
    let dir = tempfile::tempdir().unwrap();
    let k6 = FakeK6::install(dir.path(), "exit 0");
    let script_path = dir.path().join("test.js");
    fs::write(&script_path, VALID_SCRIPT).unwrap();
    let output = k6box_bin()
        .env("K6BOX_BINARY", &k6.binary)
        .arg("validate")
        .arg("--script")
        .arg(&script_path)
        .output()
        .expect("failed to execute");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Script validation passed with no issues"), "{}", stdout);
    assert!(stdout.contains("Next steps:"));
}

#[test]
fn malformed_config_exits_five() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("k6box.json");
    fs::write(&config, "{ not json").unwrap();
    let output = k6box_bin()
        .arg("validate")
        .arg("--config")
        .arg(&config)
        .arg("--script")
        .arg("-")
        .stdin(Stdio::null())
        .output()
        .expect("failed to execute");

    assert_eq!(output.status.code(), Some(5));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CONFIG"), "{}", stderr);
}
