// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::uninlined_format_args)]
#![allow(missing_docs)]
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use k6box::classify::Classification;
use k6box::{ErrorCode, RunResult};
use k6box_fixtures::{
    metric_stream, stderr, stdout, FakeK6, THRESHOLD_EXIT_CODE, THRESHOLD_STDERR, VALID_SCRIPT,
};

fn run(dir: &Path, k6: &FakeK6, extra: &[&str]) -> (Output, RunResult) {
    let script_path = dir.join("load.js");
    fs::write(&script_path, VALID_SCRIPT).unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_k6box"))
        .env("K6BOX_BINARY", &k6.binary)
        .env_remove("K6BOX_RUN_TIMEOUT_MS")
        .arg("run")
        .arg("--script")
        .arg(&script_path)
        .arg("--json")
        .args(extra)
        .output()
        .expect("failed to execute");
    let result: RunResult = serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not a run result ({err}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (output, result)
}

#[test]
fn successful_run_reports_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let body = format!("{}\nexit 0", stdout(&metric_stream(5, &[120.0, 80.0])));
    let k6 = FakeK6::install(dir.path(), &body);
    let (output, result) = run(dir.path(), &k6, &["--vus", "2", "--iterations", "5"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(result.success);
    assert_eq!(result.summary.total_requests, 5);
    assert!((result.summary.avg_response_time_ms - 100.0).abs() < f64::EPSILON);
    assert_eq!(result.classification, Some(Classification::Passed));

    let args = k6.recorded_args();
    assert_eq!(&args[..5], &["run", "--vus", "2", "--iterations", "5"]);
}

#[test]
fn stages_and_engine_options_reach_k6() {
    let dir = tempfile::tempdir().unwrap();
    let k6 = FakeK6::install(dir.path(), "exit 0");
    let (output, _result) = run(
        dir.path(),
        &k6,
        &[
            "--stage",
            "10s:5",
            "--stage",
            "20s:0",
            "--options",
            r#"{"noThresholds": true}"#,
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    let args = k6.recorded_args();
    let joined = args.join(" ");
    assert!(joined.contains("--stage 10s:5,20s:0"), "{}", joined);
    assert!(joined.contains("--no-thresholds --out json=/dev/stdout"), "{}", joined);
}

#[test]
fn threshold_failure_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let body = format!("{}\nexit {}", stderr(THRESHOLD_STDERR), THRESHOLD_EXIT_CODE);
    let k6 = FakeK6::install(dir.path(), &body);
    let (output, result) = run(dir.path(), &k6, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(result.classification, Some(Classification::ThresholdFailure));
}

#[test]
fn too_many_vus_exits_two_without_running_k6() {
    let dir = tempfile::tempdir().unwrap();
    let k6 = FakeK6::install(dir.path(), "exit 0");
    let (output, result) = run(dir.path(), &k6, &["--vus", "500"]);

    assert_eq!(output.status.code(), Some(2));
    assert_eq!(result.error.unwrap().code, ErrorCode::ParameterValidation);
    assert!(!k6.was_invoked());
}

#[test]
fn run_timeout_exits_four() {
    let dir = tempfile::tempdir().unwrap();
    let k6 = FakeK6::install(dir.path(), "exec sleep 30");
    let script_path = dir.path().join("load.js");
    fs::write(&script_path, VALID_SCRIPT).unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_k6box"))
        .env("K6BOX_BINARY", &k6.binary)
        .env("K6BOX_RUN_TIMEOUT_MS", "300")
        .arg("run")
        .arg("--script")
        .arg(&script_path)
        .arg("--json")
        .output()
        .expect("failed to execute");

    assert_eq!(output.status.code(), Some(4));
    let result: RunResult = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result.error.unwrap().code, ErrorCode::Timeout);
}

#[test]
fn malformed_stage_is_rejected_by_the_parser() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_k6box"))
        .arg("run")
        .arg("--script")
        .arg(dir.path().join("load.js"))
        .arg("--stage")
        .arg("ten-seconds")
        .output()
        .expect("failed to execute");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("DURATION:TARGET"), "{}", stderr);
}
