use crate::error::{GateError, GateResult};
use crate::model::{MAX_DURATION_MS, MAX_SCRIPT_BYTES, MAX_VUS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_VUS: i64 = 1;
pub const DEFAULT_DURATION: &str = "30s";

/// Summary statistics k6 accepts for `--summary-trend-stats`, besides `p(N)`.
const TREND_STATS: &[&str] = &["avg", "min", "med", "max", "count"];

/// Request-independent bounds applied to scripts and run options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_script_bytes: usize,
    pub max_vus: u32,
    pub max_duration_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_script_bytes: MAX_SCRIPT_BYTES,
            max_vus: MAX_VUS,
            max_duration_ms: MAX_DURATION_MS,
        }
    }
}

/// Load shape for a full run.
///
/// `vus == 0` means the default of one VU. A positive `iterations` wins over
/// `duration`; stages, when present, are passed alongside and k6 lets them
/// supersede both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub vus: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub iterations: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,
    pub options: EngineOptions,
}

/// One ramp segment: reach `target` VUs over `duration`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub duration: String,
    pub target: i64,
}

impl Stage {
    pub fn new(duration: impl Into<String>, target: i64) -> Self {
        Self {
            duration: duration.into(),
            target,
        }
    }
}

/// Known k6 option families, each validated and mapped to a CLI flag.
///
/// Keys this record does not know land in `passthrough`. They are kept for
/// the caller's benefit and logged, but never forwarded to k6.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(alias = "userAgent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(alias = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,
    #[serde(alias = "noConnectionReuse")]
    pub no_connection_reuse: bool,
    #[serde(alias = "summaryTrendStats", skip_serializing_if = "Vec::is_empty")]
    pub summary_trend_stats: Vec<String>,
    #[serde(alias = "noThresholds")]
    pub no_thresholds: bool,
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, Value>,
}

impl RunOptions {
    pub fn effective_vus(&self) -> i64 {
        if self.vus > 0 {
            self.vus
        } else {
            DEFAULT_VUS
        }
    }

    /// `Some(n)` when iterations drive the run instead of a duration.
    pub fn effective_iterations(&self) -> Option<i64> {
        (self.iterations > 0).then_some(self.iterations)
    }

    pub fn effective_duration(&self) -> &str {
        match self.duration.as_deref() {
            Some(duration) if !duration.is_empty() => duration,
            _ => DEFAULT_DURATION,
        }
    }
}

/// Reject out-of-range or malformed options before anything is spawned.
pub fn validate_run_options(options: &RunOptions, limits: &Limits) -> GateResult<()> {
    let max_vus = i64::from(limits.max_vus);

    if options.vus < 0 {
        return Err(GateError::parameter("vus", "vus cannot be negative"));
    }
    if options.vus > max_vus {
        return Err(GateError::parameter(
            "vus",
            format!("vus cannot exceed {max_vus}"),
        ));
    }
    if options.iterations < 0 {
        return Err(GateError::parameter(
            "iterations",
            "iterations cannot be negative",
        ));
    }

    if let Some(duration) = options.duration.as_deref().filter(|d| !d.is_empty()) {
        let parsed = parse_duration(duration).ok_or_else(|| {
            GateError::parameter("duration", format!("invalid duration format: {duration}"))
        })?;
        if parsed > Duration::from_millis(limits.max_duration_ms) {
            return Err(GateError::parameter(
                "duration",
                format!(
                    "duration cannot exceed {}",
                    format_limit(limits.max_duration_ms)
                ),
            ));
        }
    }

    for (index, stage) in options.stages.iter().enumerate() {
        if !(0..=max_vus).contains(&stage.target) {
            return Err(GateError::parameter(
                format!("stages[{index}].target"),
                format!(
                    "stage {index} target VUs ({}) must be between 0 and {max_vus}",
                    stage.target
                ),
            ));
        }
        if parse_duration(&stage.duration).is_none() {
            return Err(GateError::parameter(
                format!("stages[{index}].duration"),
                format!(
                    "stage {index} has invalid duration format: {}",
                    stage.duration
                ),
            ));
        }
    }

    validate_engine_options(&options.options)
}

fn validate_engine_options(options: &EngineOptions) -> GateResult<()> {
    for key in options.tags.keys() {
        if key.is_empty() || key.contains(['=', ',']) || key.chars().any(char::is_whitespace) {
            return Err(GateError::parameter(
                "options.tags",
                format!("tag name `{key}` must be non-empty without '=', ',' or whitespace"),
            ));
        }
    }

    if let Some(agent) = options.user_agent.as_deref() {
        if agent.chars().any(char::is_control) {
            return Err(GateError::parameter(
                "options.user_agent",
                "user agent cannot contain control characters",
            ));
        }
    }

    for stat in &options.summary_trend_stats {
        if !is_trend_stat(stat) {
            return Err(GateError::parameter(
                "options.summary_trend_stats",
                format!(
                    "unknown trend stat `{stat}`; use avg, min, med, max, count or p(N)"
                ),
            ));
        }
    }

    Ok(())
}

fn is_trend_stat(stat: &str) -> bool {
    if TREND_STATS.contains(&stat) {
        return true;
    }
    stat.strip_prefix("p(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|value| value.parse::<f64>().ok())
        .is_some_and(|value| value > 0.0 && value <= 100.0)
}

fn format_limit(ms: u64) -> String {
    if ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

/// Parse a k6 time span such as `30s`, `1m30s`, `1.5h` or `250ms`.
///
/// A bare `0` is accepted. Signs are not: a negative span is never a valid
/// load shape.
pub fn parse_duration(text: &str) -> Option<Duration> {
    if text == "0" {
        return Some(Duration::ZERO);
    }
    if text.is_empty() {
        return None;
    }

    let mut rest = text;
    let mut total_ns: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return None,
        };
        total_ns = total_ns.checked_add(scaled(number, scale)?)?;
        rest = tail;
    }

    u64::try_from(total_ns).ok().map(Duration::from_nanos)
}

fn scaled(number: &str, scale: u128) -> Option<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
        return None;
    }
    let whole_value: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };
    // Sub-nanosecond digits cannot change the result.
    let frac = frac.get(..frac.len().min(9)).unwrap_or(frac);
    let frac_value: u128 = if frac.is_empty() {
        0
    } else {
        frac.parse().ok()?
    };
    let divisor = 10u128.checked_pow(u32::try_from(frac.len()).ok()?)?;
    whole_value
        .checked_mul(scale)?
        .checked_add(frac_value.checked_mul(scale)? / divisor)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::ErrorCode;

    fn reject(options: &RunOptions) -> GateError {
        validate_run_options(options, &Limits::default()).unwrap_err()
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn rejects_malformed_durations() {
        for text in ["", "30", "s", "10x", "-5s", "1..5s", "5 s"] {
            assert_eq!(parse_duration(text), None, "{text}");
        }
    }

    #[test]
    fn defaults_apply_when_unset() {
        let options = RunOptions::default();
        assert_eq!(options.effective_vus(), 1);
        assert_eq!(options.effective_iterations(), None);
        assert_eq!(options.effective_duration(), "30s");
    }

    #[test]
    fn vus_above_limit_is_rejected() {
        let err = reject(&RunOptions {
            vus: 51,
            ..RunOptions::default()
        });
        assert_eq!(err.kind(), ErrorCode::ParameterValidation);
        assert!(err.to_string().contains("cannot exceed 50"));
    }

    #[test]
    fn vus_at_limit_is_accepted() {
        let options = RunOptions {
            vus: 50,
            duration: Some("5m".to_string()),
            ..RunOptions::default()
        };
        validate_run_options(&options, &Limits::default()).unwrap();
    }

    #[test]
    fn duration_above_five_minutes_is_rejected() {
        let err = reject(&RunOptions {
            duration: Some("5m1s".to_string()),
            ..RunOptions::default()
        });
        assert_eq!(err.kind(), ErrorCode::ParameterValidation);
        assert!(err.to_string().contains("cannot exceed 5m"));
    }

    #[test]
    fn negative_iterations_are_rejected() {
        let err = reject(&RunOptions {
            iterations: -1,
            ..RunOptions::default()
        });
        assert!(err.to_string().contains("iterations cannot be negative"));
    }

    #[test]
    fn stage_target_above_limit_is_rejected() {
        let err = reject(&RunOptions {
            stages: vec![Stage::new("10s", 10), Stage::new("10s", 51)],
            ..RunOptions::default()
        });
        assert_eq!(err.kind(), ErrorCode::ParameterValidation);
        assert!(err.to_string().contains("stage 1"));
    }

    #[test]
    fn malformed_stage_duration_is_rejected() {
        let err = reject(&RunOptions {
            stages: vec![Stage::new("ten seconds", 5)],
            ..RunOptions::default()
        });
        assert!(err.to_string().contains("invalid duration format"));
    }

    #[test]
    fn unknown_engine_options_land_in_passthrough() {
        let options: EngineOptions = serde_json::from_value(serde_json::json!({
            "userAgent": "k6box/1.0",
            "noConnectionReuse": true,
            "discardResponseBodies": true
        }))
        .unwrap();
        assert_eq!(options.user_agent.as_deref(), Some("k6box/1.0"));
        assert!(options.no_connection_reuse);
        assert!(options.passthrough.contains_key("discardResponseBodies"));
    }

    #[test]
    fn trend_stats_must_be_known() {
        let mut options = RunOptions::default();
        options.options.summary_trend_stats = vec!["avg".to_string(), "p(99.9)".to_string()];
        validate_run_options(&options, &Limits::default()).unwrap();

        options.options.summary_trend_stats = vec!["p(200)".to_string()];
        assert_eq!(reject(&options).kind(), ErrorCode::ParameterValidation);
    }
}
