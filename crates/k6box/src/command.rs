//! Argument vectors for `k6 run`.
//!
//! Pure functions of their inputs. Options are assumed to have passed
//! [`validate_run_options`](crate::model::validate_run_options).

use crate::model::{EngineOptions, RunOptions};
use std::path::Path;

/// Which shape of `k6 run` to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Fixed minimal smoke run. Caller options are ignored.
    Validate,
    /// Full run shaped by [`RunOptions`], emitting NDJSON metrics on stdout.
    Run,
}

/// Flags of a validation run, before the script path.
const VALIDATE_FLAGS: &[&str] = &[
    "run",
    "--vus",
    "1",
    "--iterations",
    "1",
    "--quiet",
    "--insecure-skip-tls-verify",
    "--log-format=json",
    "--no-usage-report",
];

const METRICS_OUTPUT: &str = "json=/dev/stdout";

pub fn build_args(mode: Mode, script_path: &Path, options: &RunOptions) -> Vec<String> {
    let script = script_path.display().to_string();
    match mode {
        Mode::Validate => {
            let mut args: Vec<String> = VALIDATE_FLAGS.iter().map(|s| (*s).to_string()).collect();
            args.push(script);
            args
        }
        Mode::Run => {
            let mut args = vec![
                "run".to_string(),
                "--vus".to_string(),
                options.effective_vus().to_string(),
            ];

            match options.effective_iterations() {
                Some(iterations) => {
                    args.push("--iterations".to_string());
                    args.push(iterations.to_string());
                }
                None => {
                    args.push("--duration".to_string());
                    args.push(options.effective_duration().to_string());
                }
            }

            if !options.stages.is_empty() {
                let stages: Vec<String> = options
                    .stages
                    .iter()
                    .map(|stage| format!("{}:{}", stage.duration, stage.target))
                    .collect();
                args.push("--stage".to_string());
                args.push(stages.join(","));
            }

            push_engine_flags(&mut args, &options.options);

            args.push("--out".to_string());
            args.push(METRICS_OUTPUT.to_string());
            args.push(script);
            args
        }
    }
}

fn push_engine_flags(args: &mut Vec<String>, engine: &EngineOptions) {
    for (name, value) in &engine.tags {
        args.push("--tag".to_string());
        args.push(format!("{name}={value}"));
    }
    if let Some(agent) = engine.user_agent.as_deref() {
        args.push("--user-agent".to_string());
        args.push(agent.to_string());
    }
    if engine.insecure_skip_tls_verify {
        args.push("--insecure-skip-tls-verify".to_string());
    }
    if engine.no_connection_reuse {
        args.push("--no-connection-reuse".to_string());
    }
    if !engine.summary_trend_stats.is_empty() {
        args.push("--summary-trend-stats".to_string());
        args.push(engine.summary_trend_stats.join(","));
    }
    if engine.no_thresholds {
        args.push("--no-thresholds".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stage;

    fn argv(mode: Mode, options: &RunOptions) -> Vec<String> {
        build_args(mode, Path::new("/tmp/x.js"), options)
    }

    #[test]
    fn validate_shape_is_fixed() {
        assert_eq!(
            argv(Mode::Validate, &RunOptions::default()),
            vec![
                "run",
                "--vus",
                "1",
                "--iterations",
                "1",
                "--quiet",
                "--insecure-skip-tls-verify",
                "--log-format=json",
                "--no-usage-report",
                "/tmp/x.js",
            ]
        );
    }

    #[test]
    fn validate_ignores_caller_options() {
        let mut options = RunOptions {
            vus: 40,
            duration: Some("2m".to_string()),
            iterations: 7,
            stages: vec![Stage::new("10s", 20)],
            ..RunOptions::default()
        };
        options.options.no_thresholds = true;
        options.options.user_agent = Some("agent".to_string());
        assert_eq!(
            argv(Mode::Validate, &options),
            argv(Mode::Validate, &RunOptions::default())
        );
    }

    #[test]
    fn run_defaults_to_one_vu_for_thirty_seconds() {
        assert_eq!(
            argv(Mode::Run, &RunOptions::default()),
            vec![
                "run",
                "--vus",
                "1",
                "--duration",
                "30s",
                "--out",
                "json=/dev/stdout",
                "/tmp/x.js",
            ]
        );
    }

    #[test]
    fn iterations_win_over_duration() {
        let options = RunOptions {
            vus: 5,
            duration: Some("1m".to_string()),
            iterations: 10,
            ..RunOptions::default()
        };
        assert_eq!(
            argv(Mode::Run, &options),
            vec![
                "run",
                "--vus",
                "5",
                "--iterations",
                "10",
                "--out",
                "json=/dev/stdout",
                "/tmp/x.js",
            ]
        );
    }

    #[test]
    fn stages_are_joined_after_duration() {
        let options = RunOptions {
            stages: vec![Stage::new("30s", 10), Stage::new("1m", 0)],
            ..RunOptions::default()
        };
        assert_eq!(
            argv(Mode::Run, &options),
            vec![
                "run",
                "--vus",
                "1",
                "--duration",
                "30s",
                "--stage",
                "30s:10,1m:0",
                "--out",
                "json=/dev/stdout",
                "/tmp/x.js",
            ]
        );
    }

    #[test]
    fn engine_options_map_to_flags_before_output() {
        let mut options = RunOptions {
            iterations: 1,
            ..RunOptions::default()
        };
        options.options.tags.insert("team".to_string(), "perf".to_string());
        options.options.user_agent = Some("k6box".to_string());
        options.options.summary_trend_stats = vec!["avg".to_string(), "p(99)".to_string()];
        options.options.no_thresholds = true;
        options
            .options
            .passthrough
            .insert("discardResponseBodies".to_string(), serde_json::json!(true));

        let args = argv(Mode::Run, &options);
        let tail: Vec<&str> = args.iter().skip(5).map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "--tag",
                "team=perf",
                "--user-agent",
                "k6box",
                "--summary-trend-stats",
                "avg,p(99)",
                "--no-thresholds",
                "--out",
                "json=/dev/stdout",
                "/tmp/x.js",
            ]
        );
    }
}
