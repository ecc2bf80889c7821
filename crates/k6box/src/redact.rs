//! Scrubbing of host details from text handed back to callers.
//!
//! k6 echoes file paths and environment-derived values in its banner and error
//! messages. Everything that leaves a request passes through a [`Redactor`].

use crate::model::ErrorInfo;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

pub const REDACTED: &str = "[REDACTED]";
/// Replacement for the temporary script path.
pub const SCRIPT_PLACEHOLDER: &str = "script.js";

/// Environment variables whose values identify the host user.
const SENSITIVE_VARS: &[&str] = &["HOME", "USER", "USERNAME", "LOGNAME"];

/// Values this short would shred unrelated text.
const MIN_SECRET_LEN: usize = 3;

fn home_prefix() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(/home|/Users)/[^/\s:'\x22]+").ok())
        .as_ref()
}

#[derive(Clone, Debug, Default)]
pub struct Redactor {
    paths: Vec<String>,
    secrets: Vec<String>,
}

impl Redactor {
    /// Redactor for the user variables of the current process.
    pub fn from_env() -> Self {
        Self::with_secrets(
            SENSITIVE_VARS
                .iter()
                .filter_map(|name| std::env::var(name).ok()),
        )
    }

    pub fn with_secrets(values: impl IntoIterator<Item = String>) -> Self {
        let mut secrets: Vec<String> = values
            .into_iter()
            .filter(|value| value.len() >= MIN_SECRET_LEN && value != "/")
            .collect();
        secrets.sort();
        secrets.dedup();
        // Longest first so a home directory is replaced before the user name inside it.
        secrets.sort_by_key(|value| std::cmp::Reverse(value.len()));
        Self {
            paths: Vec::new(),
            secrets,
        }
    }

    /// Also replace `path` with [`SCRIPT_PLACEHOLDER`].
    #[must_use]
    pub fn with_script_path(mut self, path: &Path) -> Self {
        let text = path.display().to_string();
        if !text.is_empty() {
            self.paths.push(text);
        }
        self
    }

    pub fn redact(&self, text: &str) -> String {
        let mut output = text.to_string();
        for path in &self.paths {
            output = output.replace(path.as_str(), SCRIPT_PLACEHOLDER);
        }
        for secret in &self.secrets {
            output = output.replace(secret.as_str(), REDACTED);
        }
        if let Some(regex) = home_prefix() {
            output = regex
                .replace_all(&output, format!("${{1}}/{REDACTED}").as_str())
                .into_owned();
        }
        output
    }

    /// Redact the message and every string inside the context.
    pub fn redact_error(&self, mut info: ErrorInfo) -> ErrorInfo {
        info.message = self.redact(&info.message);
        info.context = info.context.map(|context| self.redact_value(context));
        info
    }

    fn redact_value(&self, value: Value) -> Value {
        match value {
            Value::String(text) => Value::String(self.redact(&text)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.redact_value(item)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, item)| (key, self.redact_value(item)))
                    .collect(),
            ),
            other => other,
        }
    }
}
