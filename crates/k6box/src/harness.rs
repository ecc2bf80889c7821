//! Caller-facing validate and run operations.
//!
//! Each request walks the same pipeline: screen the text, resolve the k6
//! binary, stage the script, execute under a deadline, then classify and
//! report. Every outcome, including failures before k6 starts, comes back as a
//! result record with `error` filled in; nothing here returns `Err`.

use crate::command::{build_args, Mode};
use crate::config::HarnessConfig;
use crate::error::{GateError, GateResult};
use crate::executor::{
    elapsed_ms, execute, find_binary, secure_environment, CancelToken, ExecContext,
};
use crate::model::{
    validate_run_options, ExecutionOutcome, RequestId, RunOptions, RunResult, ValidationResult,
};
use crate::redact::Redactor;
use crate::report;
use crate::screen::{check_script, PatternScreener, Screener};
use crate::script_file::ScriptFile;
use std::path::PathBuf;
use std::time::Instant;

/// Validates and runs k6 scripts under one read-only [`HarnessConfig`].
///
/// `Harness` is `Send + Sync`; share it across threads to serve concurrent
/// requests. Each request owns its own temp file and subprocess.
pub struct Harness {
    config: HarnessConfig,
    screener: Box<dyn Screener>,
}

impl Harness {
    /// Harness with the default [`PatternScreener`]. Fails on invalid config.
    pub fn new(config: HarnessConfig) -> GateResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            screener: Box::new(PatternScreener),
        })
    }

    /// Replace the dangerous-pattern screen.
    #[must_use]
    pub fn with_screener(mut self, screener: impl Screener + 'static) -> Self {
        self.screener = Box::new(screener);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Context for a validation request, starting its deadline now.
    pub fn validation_context(&self, cancel: CancelToken) -> ExecContext {
        ExecContext::with_cancel(self.config.validate_timeout(), cancel)
    }

    /// Context for a load run, starting its deadline now.
    pub fn run_context(&self, cancel: CancelToken) -> ExecContext {
        ExecContext::with_cancel(self.config.run_timeout(), cancel)
    }

    /// Check that `script` parses and executes one iteration cleanly.
    pub fn validate(&self, script: &str) -> ValidationResult {
        let ctx = self.validation_context(CancelToken::new());
        self.validate_with_context(script, &ctx)
    }

    pub fn validate_with_context(&self, script: &str, ctx: &ExecContext) -> ValidationResult {
        let request_id = RequestId::new();
        let span = tracing::info_span!("request", request_id = %request_id, operation = "validate");
        let _entered = span.enter();
        let started = Instant::now();

        let staged = check_script(script, &self.config.limits, self.screener.as_ref())
            .and_then(|()| self.execute(script, Mode::Validate, &RunOptions::default(), ctx));

        match staged {
            Ok((outcome, script_path)) => {
                let redactor = Redactor::from_env().with_script_path(&script_path);
                let result = report::validation_report(request_id, script, &outcome, &redactor);
                tracing::info!(
                    valid = result.valid,
                    exit_code = result.exit_code,
                    issues = result.issues.len(),
                    duration_ms = result.duration_ms,
                    "validation finished"
                );
                result
            }
            Err(err) => {
                log_failure(&err);
                report::validation_failure(
                    request_id,
                    &err,
                    elapsed_ms(&started),
                    &Redactor::from_env(),
                )
            }
        }
    }

    /// Run `script` with the load shape in `options` and summarize its metrics.
    pub fn run(&self, script: &str, options: &RunOptions) -> RunResult {
        let ctx = self.run_context(CancelToken::new());
        self.run_with_context(script, options, &ctx)
    }

    pub fn run_with_context(
        &self,
        script: &str,
        options: &RunOptions,
        ctx: &ExecContext,
    ) -> RunResult {
        let request_id = RequestId::new();
        let span = tracing::info_span!("request", request_id = %request_id, operation = "run");
        let _entered = span.enter();
        let started = Instant::now();

        if !options.options.passthrough.is_empty() {
            let keys: Vec<&str> = options.options.passthrough.keys().map(String::as_str).collect();
            tracing::warn!(?keys, "ignoring unsupported engine options");
        }

        let staged = check_script(script, &self.config.limits, self.screener.as_ref())
            .and_then(|()| validate_run_options(options, &self.config.limits))
            .and_then(|()| self.execute(script, Mode::Run, options, ctx));

        match staged {
            Ok((outcome, script_path)) => {
                let redactor = Redactor::from_env().with_script_path(&script_path);
                let result = report::run_report(request_id, &outcome, &redactor);
                tracing::info!(
                    success = result.success,
                    exit_code = result.exit_code,
                    requests = result.summary.total_requests,
                    duration_ms = result.duration_ms,
                    "run finished"
                );
                result
            }
            Err(err) => {
                log_failure(&err);
                report::run_failure(request_id, &err, elapsed_ms(&started), &Redactor::from_env())
            }
        }
    }

    /// Resolve k6, stage the script, and execute it. The staged file is gone
    /// by the time this returns; its former path is handed back for redaction.
    fn execute(
        &self,
        script: &str,
        mode: Mode,
        options: &RunOptions,
        ctx: &ExecContext,
    ) -> GateResult<(ExecutionOutcome, PathBuf)> {
        let search_path = std::env::var_os("PATH");
        let binary = find_binary(&self.config.binary, search_path.as_deref())?;

        let staged = ScriptFile::create(&self.config.temp_dir(), script)?;
        let script_path = staged.path().to_path_buf();
        let args = build_args(mode, &script_path, options);
        tracing::debug!(?mode, args = args.len(), "executing k6");

        let outcome = execute(ctx, &binary, &args, &secure_environment());
        staged.release();
        Ok((outcome?, script_path))
    }
}

fn log_failure(err: &GateError) {
    match err {
        GateError::K6NotFound { .. } => tracing::error!(code = %err.kind(), "k6 executable not found"),
        GateError::EmptyScript
        | GateError::ScriptTooLarge { .. }
        | GateError::DangerousPattern { .. }
        | GateError::Parameter { .. } => {
            tracing::info!(code = %err.kind(), error = %err, "request rejected");
        }
        _ => tracing::warn!(code = %err.kind(), error = %err, "request failed"),
    }
}
