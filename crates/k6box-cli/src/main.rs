//! k6box CLI: validate and run k6 scripts behind a guarded harness.
//!
//! Results go to stdout (JSON with `--json`), diagnostics and logs to stderr.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use k6box::config::HarnessConfig;
use k6box::executor::CancelToken;
use k6box::model::{EngineOptions, RunOptions, Stage};
use k6box::{ErrorCode, ErrorInfo, GateError, GateResult, Harness, RunResult, ValidationResult};
use miette::{IntoDiagnostic, Result};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod progress;

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "K6BOX_LOG";

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Log line format on stderr
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "k6box", version, about = "Guarded validation and execution of k6 scripts")]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    /// Log format for stderr (filter with K6BOX_LOG, default `warn`)
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Harness configuration file (JSON, or YAML with a .yaml/.yml extension)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check a script with a one-VU, one-iteration smoke run
    Validate {
        #[arg(long, help = "Script file, or - for stdin")]
        script: String,
        #[arg(long)]
        json: bool,
    },
    /// Run a script and summarize its metrics
    Run {
        #[arg(long, help = "Script file, or - for stdin")]
        script: String,
        #[arg(long, help = "Virtual users (default 1, max 50)")]
        vus: Option<i64>,
        #[arg(long, help = "Test duration such as 30s or 1m30s (max 5m)")]
        duration: Option<String>,
        #[arg(long, help = "Total iterations; wins over --duration")]
        iterations: Option<i64>,
        #[arg(long = "stage", value_parser = parse_stage, help = "Ramp stage as DURATION:TARGET, repeatable")]
        stages: Vec<Stage>,
        #[arg(long, help = "Engine options as a JSON object, e.g. '{\"tags\":{\"env\":\"ci\"}}'")]
        options: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List error codes and the exit codes they map to
    Codes {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for")]
        shell: Shell,
    },
}

/// Configure color output based on CLI flag and environment
fn configure_colors(mode: ColorMode) -> bool {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            // Respect NO_COLOR environment variable
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                // Check if stderr supports color (where we output diagnostics)
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set

    use_color
}

/// Install the process-wide subscriber. Logs always go to stderr.
fn init_logging(format: LogFormat, ansi: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    let installed = match format {
        LogFormat::Text => builder.with_ansi(ansi).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        eprintln!("warning: a tracing subscriber was already installed");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let use_color = configure_colors(cli.color);
    init_logging(cli.log_format, use_color);

    match cli.command {
        Commands::Validate { script, json } => cmd_validate(cli.config.as_deref(), &script, json),
        Commands::Run {
            script,
            vus,
            duration,
            iterations,
            stages,
            options,
            json,
        } => {
            let run_options = match build_run_options(vus, duration, iterations, stages, options) {
                Ok(run_options) => run_options,
                Err(err) => return emit_gate_error(json, &err),
            };
            cmd_run(cli.config.as_deref(), &script, &run_options, json)
        }
        Commands::Codes { json } => cmd_codes(json),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

/// Handle the validate command.
fn cmd_validate(config: Option<&Path>, source: &str, json: bool) -> Result<()> {
    let harness = match build_harness(config) {
        Ok(harness) => harness,
        Err(err) => return emit_gate_error(json, &err),
    };
    let script = match read_script(source) {
        Ok(script) => script,
        Err(err) => return emit_gate_error(json, &err),
    };

    let ctx = harness.validation_context(cancel_on_interrupt());
    let result = harness.validate_with_context(&script, &ctx);
    emit_validation(json, &result)
}

/// Handle the run command.
fn cmd_run(config: Option<&Path>, source: &str, options: &RunOptions, json: bool) -> Result<()> {
    let harness = match build_harness(config) {
        Ok(harness) => harness,
        Err(err) => return emit_gate_error(json, &err),
    };
    let script = match read_script(source) {
        Ok(script) => script,
        Err(err) => return emit_gate_error(json, &err),
    };

    let ctx = harness.run_context(cancel_on_interrupt());
    let result = {
        let _spinner = progress::RunSpinner::start(
            format!(
                "running k6 with {} VU(s) for {}",
                options.effective_vus(),
                options
                    .effective_iterations()
                    .map_or_else(|| options.effective_duration().to_string(), |n| format!("{n} iterations"))
            ),
            json,
        );
        harness.run_with_context(&script, options, &ctx)
    };
    emit_run(json, &result)
}

fn cmd_codes(json: bool) -> Result<()> {
    if json {
        let codes: Vec<serde_json::Value> = ErrorCode::ALL
            .iter()
            .map(|code| {
                serde_json::json!({
                    "code": code,
                    "exit_code": code.exit_code(),
                    "description": code.description(),
                })
            })
            .collect();
        let payload = serde_json::to_string_pretty(&codes).into_diagnostic()?;
        println!("{payload}");
    } else {
        for code in ErrorCode::ALL {
            println!("{:<22} exit {}  {}", code.as_str(), code.exit_code(), code.description());
        }
    }
    Ok(())
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

// =============================================================================
// Input
// =============================================================================

fn build_harness(path: Option<&Path>) -> GateResult<Harness> {
    let config = match path {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    Harness::new(config.with_env_overrides()?)
}

fn read_script(source: &str) -> GateResult<String> {
    let mut script = String::new();
    let read = if source == "-" {
        io::stdin().read_to_string(&mut script).map(|_| ())
    } else {
        std::fs::read_to_string(source).map(|text| script = text)
    };
    read.map_err(|err| GateError::config("failed to read script", err))?;
    Ok(script)
}

fn build_run_options(
    vus: Option<i64>,
    duration: Option<String>,
    iterations: Option<i64>,
    stages: Vec<Stage>,
    options: Option<String>,
) -> GateResult<RunOptions> {
    let engine = match options {
        Some(text) => serde_json::from_str::<EngineOptions>(&text)
            .map_err(|err| GateError::parameter("options", format!("invalid engine options JSON: {err}")))?,
        None => EngineOptions::default(),
    };
    Ok(RunOptions {
        vus: vus.unwrap_or(0),
        duration,
        iterations: iterations.unwrap_or(0),
        stages,
        options: engine,
    })
}

fn parse_stage(text: &str) -> std::result::Result<Stage, String> {
    let (duration, target) = text
        .rsplit_once(':')
        .ok_or_else(|| format!("expected DURATION:TARGET, got `{text}`"))?;
    let target = target
        .trim()
        .parse::<i64>()
        .map_err(|err| format!("invalid stage target `{target}`: {err}"))?;
    Ok(Stage::new(duration.trim(), target))
}

/// Ctrl-C cancels the in-flight request, which kills the k6 process group.
fn cancel_on_interrupt() -> CancelToken {
    let token = CancelToken::new();
    let handler_token = token.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %err, "could not install Ctrl-C handler");
    }
    token
}

// =============================================================================
// Output
// =============================================================================

/// 0 when the request succeeded, 1 when k6 ran and the verdict failed, and
/// the error code's exit code when the request stopped before k6 exited.
fn exit_code_for(ok: bool, k6_exit_code: i32, error: Option<&ErrorInfo>) -> i32 {
    if ok {
        return 0;
    }
    if k6_exit_code >= 0 {
        return 1;
    }
    error.map_or(1, |info| info.code.exit_code())
}

fn emit_validation(json: bool, result: &ValidationResult) -> Result<()> {
    if json {
        let payload = serde_json::to_string(result).into_diagnostic()?;
        println!("{payload}");
    } else {
        print_validation(result);
    }
    finish(exit_code_for(result.valid, result.exit_code, result.error.as_ref()))
}

fn emit_run(json: bool, result: &RunResult) -> Result<()> {
    if json {
        let payload = serde_json::to_string(result).into_diagnostic()?;
        println!("{payload}");
    } else {
        print_run(result);
    }
    finish(exit_code_for(result.success, result.exit_code, result.error.as_ref()))
}

fn emit_gate_error(json: bool, err: &GateError) -> Result<()> {
    if json {
        let payload = serde_json::to_string(&err.to_error_info()).into_diagnostic()?;
        println!("{payload}");
    } else {
        eprintln!("error[{}]: {err}", err.kind());
        eprintln!("  help: {}", err.suggestion());
    }
    finish(exit_code_for_error(err))
}

fn exit_code_for_error(err: &GateError) -> i32 {
    err.exit_code()
}

fn finish(code: i32) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code)
    }
}

fn print_validation(result: &ValidationResult) {
    let mark = if result.valid { "✓" } else { "✗" };
    println!("{mark} {} (exit {}, {}ms)", result.summary.description, result.exit_code, result.duration_ms);
    if let Some(error) = &result.error {
        println!("  error[{}]: {}", error.code, error.message);
    }
    if !result.issues.is_empty() {
        println!();
        println!("Issues ({}, max severity {}):", result.summary.issue_count, result.summary.severity);
        for issue in &result.issues {
            let line = issue.line.map(|line| format!(" line {line}")).unwrap_or_default();
            println!("  [{}]{line} {}", issue.severity, issue.message);
            println!("      {}", issue.suggestion);
        }
    }
    if !result.next_steps.is_empty() {
        println!();
        println!("Next steps:");
        for step in &result.next_steps {
            println!("  {step}");
        }
    }
    if !result.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for recommendation in &result.recommendations {
            println!("  - {recommendation}");
        }
    }
}

fn print_run(result: &RunResult) {
    let mark = if result.success { "✓" } else { "✗" };
    let verdict = result
        .classification
        .map(|classification| format!("{classification:?}"))
        .unwrap_or_else(|| "not run".to_string());
    println!("{mark} k6 run: {verdict} (exit {}, {}ms)", result.exit_code, result.duration_ms);
    if let Some(error) = &result.error {
        println!("  error[{}]: {}", error.code, error.message);
    }
    let summary = &result.summary;
    println!();
    println!("  requests        {}", summary.total_requests);
    println!("  failed          {}", summary.failed_requests);
    println!("  avg duration    {:.2} ms", summary.avg_response_time_ms);
    println!("  p95 duration    {:.2} ms", summary.p95_response_time_ms);
    println!("  request rate    {:.2} req/s", summary.request_rate_per_second);
    println!("  data sent       {} B", summary.data_sent_bytes);
    println!("  data received   {} B", summary.data_received_bytes);
    println!("  metric events   {}", result.metric_count);
}
