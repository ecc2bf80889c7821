//! Pre-flight screening of script text.
//!
//! Runs before anything touches the filesystem or the process table: size
//! bounds first, then a [`Screener`] looking for constructs that reach for the
//! host (process spawning, dynamic evaluation, filesystem and OS modules,
//! environment inspection, global timers, global-object mutation).
//!
//! # Advisory control
//!
//! The default [`PatternScreener`] matches substrings. It stops the obvious
//! cases and produces a helpful message, but it can be evaded with string
//! concatenation or aliasing and it does not parse JavaScript. It is not a
//! security boundary; k6 itself does not expose Node.js APIs, and the child
//! runs with a minimized environment regardless. Swap in a tokenizer- or
//! AST-based [`Screener`] if stronger guarantees are needed.

use crate::error::{GateError, GateResult};
use crate::model::Limits;

/// One screened construct found in a script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finding {
    pub construct: String,
    pub category: String,
    pub alternative: String,
    /// 1-based line of the first occurrence.
    pub line: Option<usize>,
}

/// Pluggable scanner over script text.
pub trait Screener: Send + Sync {
    /// Every finding, in a deterministic order. Empty means clean.
    fn scan(&self, text: &str) -> Vec<Finding>;
}

struct PatternRule {
    pattern: &'static str,
    category: &'static str,
    alternative: &'static str,
    /// `Function(` must not match the `function(` keyword.
    case_sensitive: bool,
}

const fn rule(
    pattern: &'static str,
    category: &'static str,
    alternative: &'static str,
) -> PatternRule {
    PatternRule {
        pattern,
        category,
        alternative,
        case_sensitive: false,
    }
}

const NO_HOST_COMMANDS: &str =
    "k6 scripts cannot run host commands; exercise the system under test over HTTP with k6/http.";
const NO_CODEGEN: &str = "Write the logic as plain functions; k6 does not need runtime code generation.";
const STATIC_IMPORTS: &str = "Use static import statements at the top of the script.";
const USE_SLEEP: &str = "Pace iterations with sleep() from 'k6'.";
const MODULE_STATE: &str = "Keep shared state in module-level variables.";

/// Scanned in order; the first hit is the construct reported to the caller.
const DANGEROUS_PATTERNS: &[PatternRule] = &[
    // Process spawning
    rule("require('child_process')", "child process execution", NO_HOST_COMMANDS),
    rule("require(\"child_process\")", "child process execution", NO_HOST_COMMANDS),
    rule("execSync(", "synchronous command execution", NO_HOST_COMMANDS),
    rule("execFile(", "file execution", NO_HOST_COMMANDS),
    rule("exec(", "command execution", NO_HOST_COMMANDS),
    rule("spawn(", "process spawning", NO_HOST_COMMANDS),
    rule("fork(", "process forking", NO_HOST_COMMANDS),
    // Filesystem and OS modules
    rule(
        "require('fs')",
        "file system access",
        "Load test data at init time with open() or SharedArray from 'k6/data'.",
    ),
    rule(
        "require(\"fs\")",
        "file system access",
        "Load test data at init time with open() or SharedArray from 'k6/data'.",
    ),
    rule(
        "require('os')",
        "operating system access",
        "Pass host-specific values in with k6 -e and read them from __ENV.",
    ),
    rule(
        "require(\"os\")",
        "operating system access",
        "Pass host-specific values in with k6 -e and read them from __ENV.",
    ),
    rule(
        "require('process')",
        "process manipulation",
        "Use the k6/execution module for test and VU context.",
    ),
    rule(
        "require(\"process\")",
        "process manipulation",
        "Use the k6/execution module for test and VU context.",
    ),
    // Dynamic evaluation
    rule("eval(", "code evaluation", NO_CODEGEN),
    PatternRule {
        pattern: "new Function(",
        category: "dynamic function creation",
        alternative: NO_CODEGEN,
        case_sensitive: true,
    },
    PatternRule {
        pattern: "Function(",
        category: "dynamic function creation",
        alternative: NO_CODEGEN,
        case_sensitive: true,
    },
    rule("import(", "dynamic import", STATIC_IMPORTS),
    rule("require.resolve(", "module resolution", STATIC_IMPORTS),
    // Environment and arguments
    rule(
        "process.env",
        "environment variable access",
        "Read configuration from __ENV, set with k6 -e KEY=value.",
    ),
    rule(
        "process.argv",
        "command line argument access",
        "Read configuration from __ENV, set with k6 -e KEY=value.",
    ),
    rule(
        "process.exit",
        "process termination",
        "Stop the test with test.abort() from 'k6/execution'.",
    ),
    rule(
        "process.kill",
        "process killing",
        "Stop the test with test.abort() from 'k6/execution'.",
    ),
    rule(
        "__dirname",
        "directory path access",
        "Open files relative to the script, e.g. open('./data.json').",
    ),
    rule(
        "__filename",
        "file path access",
        "Open files relative to the script, e.g. open('./data.json').",
    ),
    // Global object mutation
    rule("globalThis.", "global object manipulation", MODULE_STATE),
    rule("global.", "global object manipulation", MODULE_STATE),
    rule(
        "Buffer.",
        "buffer manipulation",
        "Use 'k6/encoding' for base64 and ArrayBuffer for binary payloads.",
    ),
    // Global timers
    rule("setImmediate(", "immediate execution", USE_SLEEP),
    rule("setInterval(", "interval execution", USE_SLEEP),
    rule("setTimeout(", "timeout execution", USE_SLEEP),
    rule("clearImmediate(", "immediate clearing", USE_SLEEP),
    rule("clearInterval(", "interval clearing", USE_SLEEP),
    rule("clearTimeout(", "timeout clearing", USE_SLEEP),
];

/// Case-insensitive substring table over known host-reaching constructs.
#[derive(Clone, Copy, Debug, Default)]
pub struct PatternScreener;

impl Screener for PatternScreener {
    fn scan(&self, text: &str) -> Vec<Finding> {
        // ASCII folding keeps byte offsets aligned with `text`.
        let folded = text.to_ascii_lowercase();
        DANGEROUS_PATTERNS
            .iter()
            .filter_map(|rule| {
                let offset = if rule.case_sensitive {
                    text.find(rule.pattern)
                } else {
                    folded.find(&rule.pattern.to_ascii_lowercase())
                }?;
                Some(Finding {
                    construct: rule.pattern.to_string(),
                    category: rule.category.to_string(),
                    alternative: rule.alternative.to_string(),
                    line: Some(line_of(text, offset)),
                })
            })
            .collect()
    }
}

fn line_of(text: &str, offset: usize) -> usize {
    text.get(..offset)
        .map_or(0, |prefix| prefix.matches('\n').count())
        + 1
}

/// Gate a script before it is staged: non-blank, within `limits`, and clean
/// according to `screener`.
pub fn check_script(script: &str, limits: &Limits, screener: &dyn Screener) -> GateResult<()> {
    if script.trim().is_empty() {
        return Err(GateError::EmptyScript);
    }

    if script.len() > limits.max_script_bytes {
        return Err(GateError::ScriptTooLarge {
            size: script.len(),
            limit: limits.max_script_bytes,
            hints: size_hints(script),
        });
    }

    if let Some(finding) = screener.scan(script).into_iter().next() {
        tracing::warn!(
            construct = %finding.construct,
            category = %finding.category,
            line = finding.line,
            "dangerous pattern detected"
        );
        return Err(GateError::DangerousPattern {
            construct: finding.construct,
            category: finding.category,
            alternative: finding.alternative,
        });
    }

    Ok(())
}

/// Size-reduction suggestions derived from what the script actually contains.
fn size_hints(script: &str) -> Vec<String> {
    let mut hints = Vec::new();

    let console_calls = script.matches("console.log").count();
    if console_calls > 0 {
        hints.push(format!(
            "Remove the {console_calls} console.log call(s); use k6 metrics and checks instead"
        ));
    }

    let mut total_lines = 0usize;
    let mut comment_lines = 0usize;
    for line in script.lines() {
        total_lines += 1;
        let trimmed = line.trim_start();
        if trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*') {
            comment_lines += 1;
        }
    }
    if total_lines > 0 {
        let percent = comment_lines * 100 / total_lines;
        if percent >= 20 {
            hints.push(format!(
                "Comments make up {percent}% of lines; strip them from the submitted script"
            ));
        }
    }

    hints.push(
        "Split the script into modules and keep only the scenario logic in the entry file"
            .to_string(),
    );
    hints
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::error::ErrorCode;

    const CLEAN: &str = "import http from 'k6/http';\nexport default function () {\n  http.get('https://test.k6.io');\n}\n";

    fn check(script: &str) -> GateResult<()> {
        check_script(script, &Limits::default(), &PatternScreener)
    }

    #[test]
    fn clean_script_passes() {
        check(CLEAN).unwrap();
    }

    #[test]
    fn blank_script_is_input_error() {
        for script in ["", "   \n\t"] {
            let err = check(script).unwrap_err();
            assert_eq!(err.kind(), ErrorCode::InputValidation);
        }
    }

    #[test]
    fn oversize_script_is_rejected_with_hints() {
        let mut script = String::from("// header comment\n");
        while script.len() <= 1024 * 1024 {
            script.push_str("console.log('x');\n");
        }
        let err = check(&script).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::InputValidation);
        match err {
            GateError::ScriptTooLarge { hints, .. } => {
                assert!(hints.iter().any(|h| h.contains("console.log")));
                assert!(hints.iter().any(|h| h.contains("modules")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn exactly_one_mebibyte_is_accepted() {
        let body = "a".repeat(1024 * 1024 - CLEAN.len());
        let script = format!("{CLEAN}{body}");
        assert_eq!(script.len(), 1024 * 1024);
        check(&script).unwrap();
    }

    #[test]
    fn every_pattern_is_rejected_with_its_construct() {
        for rule in DANGEROUS_PATTERNS {
            let script = format!("{CLEAN}{}\n", rule.pattern);
            let err = check(&script).unwrap_err();
            assert_eq!(err.kind(), ErrorCode::SecurityValidation, "{}", rule.pattern);
        }
    }

    #[test]
    fn matching_ignores_case() {
        let err = check("const cp = REQUIRE(\"CHILD_PROCESS\");").unwrap_err();
        assert!(err.to_string().contains("require(\"child_process\")"));
    }

    #[test]
    fn function_keyword_is_not_dynamic_function() {
        let findings = PatternScreener.scan("export default function() {}\nconst f = function(a) {};");
        assert!(findings.is_empty(), "{findings:?}");
    }

    #[test]
    fn finding_reports_line() {
        let findings = PatternScreener.scan("line one\nline two\nconst x = eval('1');\n");
        assert_eq!(findings.first().unwrap().line, Some(3));
    }

    #[test]
    fn custom_screener_is_consulted() {
        struct Deny;
        impl Screener for Deny {
            fn scan(&self, _text: &str) -> Vec<Finding> {
                vec![Finding {
                    construct: "anything".into(),
                    category: "policy".into(),
                    alternative: "nothing".into(),
                    line: None,
                }]
            }
        }
        let err = check_script(CLEAN, &Limits::default(), &Deny).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::SecurityValidation);
    }
}
