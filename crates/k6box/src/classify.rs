//! Tell a broken script apart from a script that merely missed a threshold.
//!
//! k6 exits non-zero in both cases. For a non-zero exit, syntax and runtime
//! markers are checked first and always win, since threshold summaries can be
//! printed alongside an unrelated script error.

use serde::{Deserialize, Serialize};

/// Markers of a script defect, matched against lowercased output.
pub const SCRIPT_ERROR_MARKERS: &[&str] = &[
    "syntaxerror",
    "referenceerror",
    "typeerror",
    "cannot resolve module",
    "module not found",
    "unexpected token",
    "unexpected end of input",
    "invalid or unexpected token",
    "parsing error",
    "compilation error",
];

/// Markers of an unmet performance threshold, matched against lowercased output.
pub const THRESHOLD_MARKERS: &[&str] = &[
    "some thresholds have failed",
    "thresholds have failed",
    "threshold failed",
    "threshold violation",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Exit code 0.
    Passed,
    /// Ran correctly but a threshold failed. The script itself is valid.
    ThresholdFailure,
    /// Syntax, reference, type or module error in the script.
    ScriptError,
    /// Any other non-zero exit.
    Failed,
}

impl Classification {
    pub fn is_script_valid(self) -> bool {
        matches!(
            self,
            Classification::Passed | Classification::ThresholdFailure
        )
    }
}

/// Verdict for one k6 exit. Output is only consulted for non-zero exits.
pub fn classify(exit_code: i32, stdout: &str, stderr: &str) -> Classification {
    if exit_code == 0 {
        return Classification::Passed;
    }

    let output = format!("{stderr} {stdout}").to_lowercase();
    if has_script_error(&output) {
        return Classification::ScriptError;
    }
    if THRESHOLD_MARKERS
        .iter()
        .any(|marker| output.contains(marker))
    {
        return Classification::ThresholdFailure;
    }
    Classification::Failed
}

/// Whether lowercased `output` carries any script-defect marker.
pub fn has_script_error(output: &str) -> bool {
    SCRIPT_ERROR_MARKERS
        .iter()
        .any(|marker| output.contains(marker))
}
