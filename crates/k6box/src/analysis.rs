//! Findings derived from the script text and from k6's own output.
//!
//! Static findings are advisory quality notes; output findings explain why a
//! validation run failed. Both feed the issue list of a validation report,
//! static findings first.

use crate::model::{IssueType, Severity, ValidationIssue};
use regex::Regex;
use std::sync::OnceLock;

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn k6_import() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, r#"^import\b.*\bfrom\s*['"]k6(/[^'"]*)?['"]"#)
}

fn sleep_import() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, r#"import\s*\{[^}]*\bsleep\b[^}]*\}\s*from\s*['"]k6['"]"#)
}

fn default_export() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, r"export\s+default\s+(async\s+)?(function\b|\()")
}

fn http_call() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(
        &CELL,
        r"\bhttp\.(get|post|put|patch|del|delete|head|options|request|batch|asyncRequest)\s*\(",
    )
}

/// `file.js:12:5` or `(12:5)` in a k6 error line.
fn error_location() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&CELL, r"(?:\.js:(\d+):\d+|\((\d+):\d+\))")
}

fn matches(regex: Option<&Regex>, text: &str) -> bool {
    regex.is_some_and(|regex| regex.is_match(text))
}

/// Quality findings from reading the script, in discovery order.
pub fn analyze_script(script: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let sleep_imported = matches(sleep_import(), script);
    let mut has_import = false;
    let mut has_default = false;
    let mut has_http = false;

    for (index, raw) in script.lines().enumerate() {
        let line = raw.trim();
        let number = index + 1;

        if matches(k6_import(), line) {
            has_import = true;
        }
        if matches(default_export(), line) {
            has_default = true;
        }
        if matches(http_call(), line) {
            has_http = true;
        }

        if line.contains("console.log") {
            issues.push(
                ValidationIssue::new(
                    IssueType::Syntax,
                    Severity::Low,
                    "Using console.log in k6 script",
                    "Use console.log sparingly in k6. Prefer checks and custom metrics for anything you need to measure.",
                )
                .at_line(number),
            );
        }

        if line.contains("sleep(") && !line.starts_with("import") && !sleep_imported {
            issues.push(
                ValidationIssue::new(
                    IssueType::Syntax,
                    Severity::Medium,
                    "Using sleep without proper import",
                    "Import sleep from k6: import { sleep } from 'k6';",
                )
                .at_line(number),
            );
        }
    }

    if !has_import {
        issues.push(ValidationIssue::new(
            IssueType::Syntax,
            Severity::High,
            "Missing k6 module imports",
            "Add import statements for k6 modules. Example: import http from 'k6/http';",
        ));
    }

    if !has_default {
        issues.push(ValidationIssue::new(
            IssueType::Syntax,
            Severity::Critical,
            "Missing default export function",
            "Add a default export function: export default function () { /* your test code */ }",
        ));
    }

    if has_default && !has_http && !script.contains("check(") {
        issues.push(ValidationIssue::new(
            IssueType::Syntax,
            Severity::Low,
            "Script doesn't appear to make any HTTP requests or checks",
            "Add HTTP requests or checks to make your test meaningful. Example: http.get('https://test.k6.io');",
        ));
    }

    issues
}

/// Findings explaining a failed or noisy validation run.
pub fn analyze_output(stdout: &str, stderr: &str) -> Vec<ValidationIssue> {
    let output = format!("{stderr}\n{stdout}");
    let lowered = output.to_lowercase();
    let mut issues = Vec::new();

    if lowered.contains("syntaxerror") {
        issues.push(with_location(
            ValidationIssue::new(
                IssueType::Syntax,
                Severity::Critical,
                "JavaScript syntax error in script",
                "Check your JavaScript syntax. Look for missing brackets, semicolons, or quotes.",
            ),
            &output,
            "syntaxerror",
        ));
    }

    if lowered.contains("referenceerror") {
        issues.push(with_location(
            ValidationIssue::new(
                IssueType::Syntax,
                Severity::High,
                "Reference error - undefined variable or function",
                "Check that all variables and functions are properly defined and imported.",
            ),
            &output,
            "referenceerror",
        ));
    }

    if lowered.contains("cannot resolve module") || lowered.contains("module not found") {
        issues.push(ValidationIssue::new(
            IssueType::Import,
            Severity::High,
            "Module import error",
            "Check your import statements. Built-in modules live under 'k6/', e.g. 'k6/http' or 'k6/metrics'.",
        ));
    }

    if lowered.contains("network") || lowered.contains("connection") {
        issues.push(ValidationIssue::new(
            IssueType::Network,
            Severity::Medium,
            "Network connectivity issue",
            "Check that the target URL is accessible and network connection is available.",
        ));
    }

    issues
}

/// Attach the script line from the first output line mentioning `marker`.
fn with_location(issue: ValidationIssue, output: &str, marker: &str) -> ValidationIssue {
    let line = output
        .lines()
        .find(|line| line.to_lowercase().contains(marker))
        .and_then(|line| error_location()?.captures(line))
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|number| number.as_str().parse::<usize>().ok());
    match line {
        Some(number) => issue.at_line(number),
        None => issue,
    }
}
