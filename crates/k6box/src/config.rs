//! Harness configuration: file, then environment, then validation.
//!
//! A [`HarnessConfig`] is built once at startup and is read-only afterwards.

use crate::error::{GateError, GateResult};
use crate::model::{Limits, MAX_DURATION_MS, MAX_SCRIPT_BYTES, MAX_VUS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BINARY: &str = "k6";
pub const DEFAULT_VALIDATE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 300_000;

pub const ENV_BINARY: &str = "K6BOX_BINARY";
pub const ENV_VALIDATE_TIMEOUT_MS: &str = "K6BOX_VALIDATE_TIMEOUT_MS";
pub const ENV_RUN_TIMEOUT_MS: &str = "K6BOX_RUN_TIMEOUT_MS";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Name looked up on `PATH`, or an explicit path to the k6 executable.
    pub binary: String,
    pub validate_timeout_ms: u64,
    pub run_timeout_ms: u64,
    /// Directory for staged scripts. The system temp dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    pub limits: Limits,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            validate_timeout_ms: DEFAULT_VALIDATE_TIMEOUT_MS,
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            temp_dir: None,
            limits: Limits::default(),
        }
    }
}

impl HarnessConfig {
    /// Read a JSON or YAML (`.yaml` / `.yml`) configuration file.
    pub fn load(path: &Path) -> GateResult<Self> {
        let data = fs::read_to_string(path)
            .map_err(|err| GateError::config("failed to read configuration file", err))?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            serde_yml::from_str(&data)
                .map_err(|err| GateError::config("failed to parse YAML configuration", err))
        } else {
            serde_json::from_str(&data)
                .map_err(|err| GateError::config("failed to parse JSON configuration", err))
        }
    }

    /// Apply `K6BOX_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> GateResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> GateResult<Self> {
        if let Some(binary) = lookup(ENV_BINARY).filter(|value| !value.is_empty()) {
            self.binary = binary;
        }
        if let Some(value) = lookup(ENV_VALIDATE_TIMEOUT_MS) {
            self.validate_timeout_ms = parse_millis(ENV_VALIDATE_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_RUN_TIMEOUT_MS) {
            self.run_timeout_ms = parse_millis(ENV_RUN_TIMEOUT_MS, &value)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.binary.trim().is_empty() {
            return Err(GateError::Config {
                message: "binary cannot be empty".to_string(),
                detail: None,
            });
        }
        if self.validate_timeout_ms == 0 || self.run_timeout_ms == 0 {
            return Err(GateError::Config {
                message: "timeouts must be greater than zero".to_string(),
                detail: None,
            });
        }
        let limits = &self.limits;
        if limits.max_script_bytes == 0 || limits.max_vus == 0 || limits.max_duration_ms == 0 {
            return Err(GateError::Config {
                message: "limits must be greater than zero".to_string(),
                detail: None,
            });
        }
        // Limits can only be tightened.
        if limits.max_script_bytes > MAX_SCRIPT_BYTES
            || limits.max_vus > MAX_VUS
            || limits.max_duration_ms > MAX_DURATION_MS
        {
            return Err(GateError::Config {
                message: format!(
                    "limits cannot exceed {MAX_SCRIPT_BYTES} script bytes, {MAX_VUS} VUs, or {MAX_DURATION_MS}ms duration"
                ),
                detail: None,
            });
        }
        Ok(())
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_millis(self.validate_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_millis(name: &str, value: &str) -> GateResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| GateError::config(format!("{name} must be a whole number of milliseconds"), err))
}
