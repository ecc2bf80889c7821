// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

use std::fs;

use k6box::config::HarnessConfig;
use k6box::ErrorCode;
use k6box_fixtures::temp_dir;

#[test]
fn load_config_from_json_and_yaml() {
    let dir = temp_dir("config");
    let json_path = dir.join("k6box.json");
    let yaml_path = dir.join("k6box.yaml");

    fs::write(
        &json_path,
        r#"{"binary": "/usr/local/bin/k6", "run_timeout_ms": 60000, "limits": {"max_vus": 10}}"#,
    )
    .unwrap();
    fs::write(
        &yaml_path,
        "binary: /usr/local/bin/k6\nrun_timeout_ms: 60000\nlimits:\n  max_vus: 10\n",
    )
    .unwrap();

    let from_json = HarnessConfig::load(&json_path).unwrap();
    let from_yaml = HarnessConfig::load(&yaml_path).unwrap();

    assert_eq!(from_json, from_yaml);
    assert_eq!(from_json.binary, "/usr/local/bin/k6");
    assert_eq!(from_json.run_timeout_ms, 60_000);
    assert_eq!(from_json.validate_timeout_ms, 30_000);
    assert_eq!(from_json.limits.max_vus, 10);
    assert_eq!(from_json.limits.max_script_bytes, 1024 * 1024);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn load_config_file_not_found() {
    let err = HarnessConfig::load(std::path::Path::new("/nonexistent/k6box.json")).unwrap_err();
    assert_eq!(err.kind(), ErrorCode::Config);
    assert!(err.to_string().contains("failed to read"));
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = temp_dir("config-unknown");
    let path = dir.join("k6box.json");
    fs::write(&path, r#"{"binray": "k6"}"#).unwrap();

    let err = HarnessConfig::load(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorCode::Config);
    assert!(err.to_string().contains("parse"));

    let _ = fs::remove_dir_all(dir);
}
