//! Assembly of the caller-visible [`ValidationResult`] and [`RunResult`].

use crate::analysis::{analyze_output, analyze_script};
use crate::classify::{classify, Classification};
use crate::error::{ErrorCode, GateError};
use crate::metrics::{parse_metrics, request_rate};
use crate::model::{
    ErrorInfo, ExecutionOutcome, IssueType, RequestId, RunResult, Severity, SummaryStatus, TestSummary,
    ValidationIssue, ValidationResult, ValidationSummary,
};
use crate::redact::Redactor;

const DOCS_SYNTAX: &str =
    "See https://grafana.com/docs/k6/latest/get-started/write-your-first-test/ for basic k6 syntax";
const DOCS_API: &str =
    "See https://grafana.com/docs/k6/latest/javascript-api/ for the available k6 modules and APIs";
const DOCS_INSTALL: &str =
    "See https://grafana.com/docs/k6/latest/set-up/install-k6/ for setup help";
const DOCS_GENERAL: &str = "Consult the k6 documentation at https://grafana.com/docs/k6/latest/";
const DOCS_EXAMPLES: &str =
    "See https://grafana.com/docs/k6/latest/examples/ for advanced testing scenarios";

/// Exit code reported when k6 never produced one.
const NO_EXIT_CODE: i32 = -1;

/// Report for a validation run that reached k6 and exited.
pub fn validation_report(
    request_id: RequestId,
    script: &str,
    outcome: &ExecutionOutcome,
    redactor: &Redactor,
) -> ValidationResult {
    let verdict = classify(outcome.exit_code, &outcome.stdout, &outcome.stderr);
    let valid = verdict.is_script_valid();

    let mut issues = analyze_script(script);
    if !outcome.stderr.is_empty() || outcome.exit_code != 0 {
        issues.extend(analyze_output(&outcome.stdout, &outcome.stderr));
    }

    let error = (!valid).then(|| ErrorInfo {
        code: ErrorCode::ExecutionError,
        message: format!("k6 validation failed with exit code {}", outcome.exit_code),
        context: Some(serde_json::json!({ "classification": verdict })),
    });

    let mut result = ValidationResult {
        request_id,
        valid,
        exit_code: outcome.exit_code,
        stdout: redactor.redact(&outcome.stdout),
        stderr: redactor.redact(&outcome.stderr),
        error,
        duration_ms: outcome.duration_ms,
        summary: summarize(valid, outcome.exit_code, &issues),
        recommendations: recommendations_for(&issues),
        next_steps: Vec::new(),
        issues,
    };
    result.next_steps = next_steps_for(&result);
    add_workflow_guidance(&mut result);
    result
}

/// Report for a validation request that stopped with `err` before k6 exited.
pub fn validation_failure(
    request_id: RequestId,
    err: &GateError,
    duration_ms: u64,
    redactor: &Redactor,
) -> ValidationResult {
    let kind = err.kind();
    let mut issue = err.to_issue();
    issue.message = redactor.redact(&issue.message);
    issue.suggestion = redactor.redact(&issue.suggestion);
    let info = redactor.redact_error(err.to_error_info());

    let (description, next_steps) = match kind {
        ErrorCode::InputValidation | ErrorCode::SecurityValidation => (
            "Script validation failed during input validation".to_string(),
            vec![
                "Fix the validation issue and try again".to_string(),
                DOCS_GENERAL.to_string(),
            ],
        ),
        ErrorCode::FileCreation
        | ErrorCode::FilePermission
        | ErrorCode::FileWrite
        | ErrorCode::FileClose => (
            "Internal error: failed to create temporary file for validation".to_string(),
            vec![
                "Try running the validation again".to_string(),
                "Check system permissions and disk space".to_string(),
            ],
        ),
        _ => (
            format!("Script validation could not complete ({kind})"),
            vec![
                err.suggestion(),
                "Try running the validation again".to_string(),
            ],
        ),
    };

    let issues = vec![issue];
    ValidationResult {
        request_id,
        valid: false,
        exit_code: NO_EXIT_CODE,
        stdout: String::new(),
        stderr: String::new(),
        error: Some(info),
        duration_ms,
        summary: ValidationSummary {
            status: SummaryStatus::Failed,
            description,
            issue_count: issues.len(),
            severity: Severity::max_of(&issues),
            ready_to_run: false,
        },
        recommendations: recommendations_for(&issues),
        next_steps,
        issues,
    }
}

/// Report for a load run that reached k6 and exited.
pub fn run_report(
    request_id: RequestId,
    outcome: &ExecutionOutcome,
    redactor: &Redactor,
) -> RunResult {
    let metrics = parse_metrics(&outcome.stdout);
    let mut summary = metrics.summary;
    summary.request_rate_per_second = request_rate(summary.total_requests, outcome.duration_ms);

    let classification = classify(outcome.exit_code, &outcome.stdout, &outcome.stderr);
    let error = match classification {
        Classification::Passed => None,
        Classification::ThresholdFailure => Some(ErrorInfo {
            code: ErrorCode::ExecutionError,
            message: "k6 run finished but some thresholds have failed".to_string(),
            context: Some(serde_json::json!({ "classification": classification })),
        }),
        Classification::ScriptError | Classification::Failed => Some(ErrorInfo {
            code: ErrorCode::ExecutionError,
            message: format!("k6 run failed with exit code {}", outcome.exit_code),
            context: Some(serde_json::json!({ "classification": classification })),
        }),
    };

    RunResult {
        request_id,
        success: outcome.success,
        exit_code: outcome.exit_code,
        stdout: redactor.redact(&outcome.stdout),
        stderr: redactor.redact(&outcome.stderr),
        error,
        duration_ms: outcome.duration_ms,
        metric_count: metrics.metric_count,
        summary,
        classification: Some(classification),
    }
}

/// Report for a load run that stopped with `err` before k6 exited.
pub fn run_failure(
    request_id: RequestId,
    err: &GateError,
    duration_ms: u64,
    redactor: &Redactor,
) -> RunResult {
    let info = redactor.redact_error(err.to_error_info());
    RunResult {
        request_id,
        success: false,
        exit_code: NO_EXIT_CODE,
        stdout: String::new(),
        stderr: String::new(),
        error: Some(info),
        duration_ms,
        metric_count: 0,
        summary: TestSummary::default(),
        classification: None,
    }
}

fn summarize(valid: bool, exit_code: i32, issues: &[ValidationIssue]) -> ValidationSummary {
    let issue_count = issues.len();
    let (status, description, severity) = if valid && exit_code == 0 {
        if issues.is_empty() {
            (
                SummaryStatus::Success,
                "Script validation passed with no issues".to_string(),
                Severity::None,
            )
        } else {
            let severity = Severity::max_of(issues);
            let description = if severity <= Severity::Low {
                format!("Script validation passed but found {issue_count} minor issues")
            } else {
                format!("Script validation passed but found {issue_count} issues, worst is {severity}")
            };
            (SummaryStatus::Warning, description, severity)
        }
    } else if valid {
        (
            SummaryStatus::Warning,
            "Script is valid but k6 reported failed thresholds".to_string(),
            Severity::max_of(issues).max(Severity::Low),
        )
    } else {
        (
            SummaryStatus::Failed,
            "Script validation failed".to_string(),
            Severity::max_of(issues),
        )
    };

    ValidationSummary {
        status,
        description,
        issue_count,
        severity,
        ready_to_run: valid && exit_code == 0,
    }
}

fn recommendations_for(issues: &[ValidationIssue]) -> Vec<String> {
    let mut recommendations = Vec::new();
    for issue in issues {
        let lines: &[&str] = match issue.issue_type {
            IssueType::Syntax => &[
                DOCS_SYNTAX,
                "Ensure your script has proper import statements and a default function",
                "Check for missing semicolons, brackets, or quotes",
            ],
            IssueType::Security => &[
                "Use only k6 built-in modules and APIs",
                "Remove any Node.js system calls or file system access",
                DOCS_API,
            ],
            IssueType::Environment => &[
                "Ensure k6 is installed and available in your PATH",
                DOCS_INSTALL,
            ],
            _ => &[
                DOCS_GENERAL,
                "Start with a simple script and gradually add complexity",
            ],
        };
        recommendations.extend(lines.iter().map(|line| (*line).to_string()));
    }
    dedup(recommendations)
}

fn next_steps_for(result: &ValidationResult) -> Vec<String> {
    if result.summary.ready_to_run {
        let mut steps = vec!["Your script is ready to run!".to_string()];
        if !result.issues.is_empty() {
            steps.push(
                "Consider addressing the minor issues found for better script quality".to_string(),
            );
        }
        steps.push("Use `k6box run` to execute your script with desired parameters".to_string());
        steps.push(DOCS_EXAMPLES.to_string());
        return steps;
    }

    if result.valid {
        return vec![
            "Your script is valid but its thresholds failed during the validation run".to_string(),
            "Review the thresholds in your options before running at scale".to_string(),
            "Use `k6box run` to execute your script with desired parameters".to_string(),
        ];
    }

    let has = |kind: IssueType| result.issues.iter().any(|issue| issue.issue_type == kind);
    let mut steps = vec!["Fix the validation errors before running the script".to_string()];
    if has(IssueType::Security) {
        steps.push("Remove dangerous patterns and use only k6 APIs".to_string());
    }
    if has(IssueType::Syntax) {
        steps.push("Fix JavaScript syntax errors".to_string());
    }
    if has(IssueType::Import) {
        steps.push("Correct import statements for k6 modules".to_string());
    }
    steps.push(DOCS_GENERAL.to_string());
    steps.push("Start with a simple script template if needed".to_string());
    steps
}

fn add_workflow_guidance(result: &mut ValidationResult) {
    let prefix: Vec<String> = if result.valid && result.summary.ready_to_run {
        result.recommendations.extend(
            [
                "Start with a small load (1-5 VUs) to verify functionality",
                "Gradually increase load to find performance limits",
                "Monitor response times and error rates during execution",
            ]
            .map(String::from),
        );
        [
            "✓ Validation passed! Your script is ready for load testing",
            "Use `k6box run` to execute your script with different configurations:",
            "  • Basic test: {\"vus\": 1, \"duration\": \"30s\"}",
            "  • Load test: {\"vus\": 10, \"duration\": \"5m\"}",
            "  • Stress test: {\"vus\": 50, \"duration\": \"5m\"}",
        ]
        .map(String::from)
        .to_vec()
    } else if result.valid && !result.issues.is_empty() {
        [
            "Consider addressing the validation issues before running at scale",
            "You can still run the script, but monitor for the highlighted issues",
        ]
        .map(String::from)
        .to_vec()
    } else if result.valid {
        Vec::new()
    } else {
        [
            "⚠ Fix validation errors before attempting to run the script",
            "Critical issues must be resolved for successful execution",
        ]
        .map(String::from)
        .to_vec()
    };

    result.recommendations.push(
        "Recommended testing workflow: validate → run (small load) → analyze → scale up".to_string(),
    );
    result.recommendations.push(DOCS_EXAMPLES.to_string());

    let steps = std::mem::take(&mut result.next_steps);
    result.next_steps = dedup(prefix.into_iter().chain(steps).collect());
    result.recommendations = dedup(std::mem::take(&mut result.recommendations));
}

/// Keep the first occurrence of each line, preserving order.
fn dedup(lines: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    lines
        .into_iter()
        .filter(|line| seen.insert(line.clone()))
        .collect()
}
