use crate::model::{ErrorInfo, IssueType, Severity, ValidationIssue};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::io;
use thiserror::Error;

pub type GateResult<T> = Result<T, GateError>;

/// Stable machine-readable tag for every failure the harness can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "INPUT_VALIDATION")]
    InputValidation,
    #[serde(rename = "SECURITY_VALIDATION")]
    SecurityValidation,
    #[serde(rename = "FILE_CREATION")]
    FileCreation,
    #[serde(rename = "FILE_PERMISSION")]
    FilePermission,
    #[serde(rename = "FILE_WRITE")]
    FileWrite,
    #[serde(rename = "FILE_CLOSE")]
    FileClose,
    #[serde(rename = "K6_NOT_FOUND")]
    K6NotFound,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "EXECUTION_ERROR")]
    ExecutionError,
    #[serde(rename = "PARAMETER_VALIDATION")]
    ParameterValidation,
    #[serde(rename = "CONFIG")]
    Config,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::InputValidation,
        ErrorCode::SecurityValidation,
        ErrorCode::FileCreation,
        ErrorCode::FilePermission,
        ErrorCode::FileWrite,
        ErrorCode::FileClose,
        ErrorCode::K6NotFound,
        ErrorCode::Timeout,
        ErrorCode::ExecutionError,
        ErrorCode::ParameterValidation,
        ErrorCode::Config,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InputValidation => "INPUT_VALIDATION",
            ErrorCode::SecurityValidation => "SECURITY_VALIDATION",
            ErrorCode::FileCreation => "FILE_CREATION",
            ErrorCode::FilePermission => "FILE_PERMISSION",
            ErrorCode::FileWrite => "FILE_WRITE",
            ErrorCode::FileClose => "FILE_CLOSE",
            ErrorCode::K6NotFound => "K6_NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::ParameterValidation => "PARAMETER_VALIDATION",
            ErrorCode::Config => "CONFIG",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }

    /// Process exit code used by the CLI. `1` is reserved for a failed verdict.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCode::InputValidation
            | ErrorCode::SecurityValidation
            | ErrorCode::ParameterValidation => 2,
            ErrorCode::K6NotFound | ErrorCode::ExecutionError => 3,
            ErrorCode::Timeout => 4,
            ErrorCode::FileCreation
            | ErrorCode::FilePermission
            | ErrorCode::FileWrite
            | ErrorCode::FileClose
            | ErrorCode::Config => 5,
        }
    }

    pub fn issue_type(self) -> IssueType {
        match self {
            ErrorCode::InputValidation => IssueType::Syntax,
            ErrorCode::SecurityValidation => IssueType::Security,
            ErrorCode::FileCreation
            | ErrorCode::FilePermission
            | ErrorCode::FileWrite
            | ErrorCode::FileClose
            | ErrorCode::Config => IssueType::System,
            ErrorCode::K6NotFound | ErrorCode::ExecutionError => IssueType::Environment,
            ErrorCode::Timeout => IssueType::Performance,
            ErrorCode::ParameterValidation => IssueType::Parameter,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            ErrorCode::SecurityValidation | ErrorCode::K6NotFound | ErrorCode::ExecutionError => {
                Severity::Critical
            }
            ErrorCode::Timeout => Severity::Medium,
            ErrorCode::InputValidation
            | ErrorCode::FileCreation
            | ErrorCode::FilePermission
            | ErrorCode::FileWrite
            | ErrorCode::FileClose
            | ErrorCode::ParameterValidation
            | ErrorCode::Config => Severity::High,
        }
    }

    /// One-line description, used by `k6box codes`.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::InputValidation => "script is empty or exceeds the size limit",
            ErrorCode::SecurityValidation => "script contains a screened host-access construct",
            ErrorCode::FileCreation => "temporary script file could not be created",
            ErrorCode::FilePermission => "temporary script file could not be restricted to 0600",
            ErrorCode::FileWrite => "script could not be written to the temporary file",
            ErrorCode::FileClose => "temporary script file could not be flushed and closed",
            ErrorCode::K6NotFound => "k6 binary is not resolvable",
            ErrorCode::Timeout => "k6 exceeded its deadline or the request was cancelled",
            ErrorCode::ExecutionError => "k6 could not be started",
            ErrorCode::ParameterValidation => "a run option is out of range or malformed",
            ErrorCode::Config => "harness configuration is invalid",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure a request can end in. Each variant carries only what it needs.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("script content cannot be empty")]
    EmptyScript,

    #[error("script size ({size} bytes) exceeds maximum allowed size ({limit} bytes)")]
    ScriptTooLarge {
        size: usize,
        limit: usize,
        hints: Vec<String>,
    },

    #[error("script contains potentially dangerous pattern related to {category}: {construct}")]
    DangerousPattern {
        construct: String,
        category: String,
        alternative: String,
    },

    #[error("failed to create temporary script file")]
    FileCreation(#[source] io::Error),

    #[error("failed to set owner-only permissions on temporary script file")]
    FilePermission(#[source] io::Error),

    #[error("failed to write script to temporary file")]
    FileWrite(#[source] io::Error),

    #[error("failed to close temporary script file")]
    FileClose(#[source] io::Error),

    #[error("k6 executable `{binary}` not found in PATH")]
    K6NotFound { binary: String },

    #[error("k6 execution timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("k6 execution was cancelled")]
    Cancelled,

    #[error("failed to execute k6 command")]
    Execution(#[source] io::Error),

    #[error("invalid run option `{field}`: {reason}")]
    Parameter { field: String, reason: String },

    #[error("invalid configuration: {message}")]
    Config {
        message: String,
        detail: Option<String>,
    },
}

impl GateError {
    pub fn parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::Config {
            message: message.into(),
            detail: Some(detail.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorCode {
        match self {
            GateError::EmptyScript | GateError::ScriptTooLarge { .. } => ErrorCode::InputValidation,
            GateError::DangerousPattern { .. } => ErrorCode::SecurityValidation,
            GateError::FileCreation(_) => ErrorCode::FileCreation,
            GateError::FilePermission(_) => ErrorCode::FilePermission,
            GateError::FileWrite(_) => ErrorCode::FileWrite,
            GateError::FileClose(_) => ErrorCode::FileClose,
            GateError::K6NotFound { .. } => ErrorCode::K6NotFound,
            GateError::Timeout { .. } | GateError::Cancelled => ErrorCode::Timeout,
            GateError::Execution(_) => ErrorCode::ExecutionError,
            GateError::Parameter { .. } => ErrorCode::ParameterValidation,
            GateError::Config { .. } => ErrorCode::Config,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Actionable next move for whoever submitted the request.
    pub fn suggestion(&self) -> String {
        match self {
            GateError::EmptyScript => "Provide a k6 script with at least an import and a default function. \
                 Example: import http from 'k6/http'; export default function () { http.get('https://test.k6.io'); }"
                .to_string(),
            GateError::ScriptTooLarge { .. } => {
                "Reduce your script size. Consider splitting large scripts into modules or removing unnecessary code."
                    .to_string()
            }
            GateError::DangerousPattern {
                construct,
                alternative,
                ..
            } => format!("Remove `{construct}`. {alternative}"),
            GateError::FileCreation(_)
            | GateError::FilePermission(_)
            | GateError::FileWrite(_)
            | GateError::FileClose(_) => {
                "Check that the temporary directory is writable and has free space, then retry."
                    .to_string()
            }
            GateError::K6NotFound { .. } => {
                "Install k6 (https://grafana.com/docs/k6/latest/set-up/install-k6/) and make sure it is on PATH."
                    .to_string()
            }
            GateError::Timeout { .. } => {
                "Your script may have infinite loops or very slow operations. Check for blocking code and optimize performance."
                    .to_string()
            }
            GateError::Cancelled => "Resubmit the request to run the script again.".to_string(),
            GateError::Execution(_) => {
                "Check that the configured k6 binary is executable on this host.".to_string()
            }
            GateError::Parameter { .. } => {
                "Correct the run option and resubmit. Durations use units such as 500ms, 30s or 1m30s."
                    .to_string()
            }
            GateError::Config { .. } => {
                "Fix the configuration file or the K6BOX_* environment variables.".to_string()
            }
        }
    }

    fn context(&self) -> Option<Value> {
        match self {
            GateError::EmptyScript => None,
            GateError::ScriptTooLarge { size, limit, hints } => Some(json!({
                "size": size,
                "limit": limit,
                "hints": hints,
            })),
            GateError::DangerousPattern {
                construct,
                category,
                alternative,
            } => Some(json!({
                "construct": construct,
                "category": category,
                "fix": alternative,
                "note": "pattern screening is advisory, not an isolation boundary",
            })),
            GateError::FileCreation(err)
            | GateError::FilePermission(err)
            | GateError::FileWrite(err)
            | GateError::FileClose(err)
            | GateError::Execution(err) => Some(json!({ "source": err.to_string() })),
            GateError::K6NotFound { binary } => Some(json!({
                "binary": binary,
                "fix": "Install k6 or point K6BOX_BINARY at it",
            })),
            GateError::Timeout { limit_ms } => Some(json!({ "limit_ms": limit_ms })),
            GateError::Cancelled => Some(json!({ "cancelled": true })),
            GateError::Parameter { field, .. } => Some(json!({ "field": field })),
            GateError::Config { detail, .. } => detail
                .as_ref()
                .map(|detail| json!({ "source": detail })),
        }
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.kind(),
            message: self.to_string(),
            context: self.context(),
        }
    }

    pub fn to_issue(&self) -> ValidationIssue {
        let kind = self.kind();
        ValidationIssue::new(
            kind.issue_type(),
            kind.severity(),
            self.to_string(),
            self.suggestion(),
        )
    }
}

impl Diagnostic for GateError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!(
            "k6box::{}",
            self.kind().as_str().to_ascii_lowercase()
        )))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.suggestion()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn codes_round_trip_through_parse() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("E_NOPE"), None);
    }

    #[test]
    fn codes_serialize_as_screaming_tags() {
        let value = serde_json::to_value(ErrorCode::K6NotFound).unwrap();
        assert_eq!(value, serde_json::json!("K6_NOT_FOUND"));
    }

    #[test]
    fn input_and_security_map_to_distinct_issue_kinds() {
        assert_eq!(ErrorCode::InputValidation.issue_type(), IssueType::Syntax);
        assert_eq!(ErrorCode::InputValidation.severity(), Severity::High);
        assert_eq!(ErrorCode::SecurityValidation.issue_type(), IssueType::Security);
        assert_eq!(ErrorCode::SecurityValidation.severity(), Severity::Critical);
        assert_eq!(ErrorCode::Timeout.severity(), Severity::Medium);
    }

    #[test]
    fn cancellation_is_reported_as_timeout() {
        assert_eq!(GateError::Cancelled.kind(), ErrorCode::Timeout);
        assert_eq!(GateError::Cancelled.exit_code(), 4);
    }

    #[test]
    fn io_failures_keep_source_text_in_context() {
        let err = GateError::FileWrite(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "read-only file system",
        ));
        let info = err.to_error_info();
        assert_eq!(info.code, ErrorCode::FileWrite);
        assert_eq!(info.context.unwrap()["source"], "read-only file system");
    }

    #[test]
    fn diagnostic_code_is_namespaced() {
        let err = GateError::parameter("vus", "vus cannot exceed 50");
        let code = Diagnostic::code(&err).unwrap().to_string();
        assert_eq!(code, "k6box::parameter_validation");
    }
}
