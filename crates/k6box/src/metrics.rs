//! Aggregation of the NDJSON stream k6 writes with `--out json=/dev/stdout`.
//!
//! k6 interleaves banner text with metric events, so any line that is not a
//! self-contained JSON object is skipped. Parsing never fails; a stream with
//! no usable samples yields a zeroed [`TestSummary`].

use crate::model::TestSummary;
use serde::Deserialize;
use serde_json::Value;

/// Summary plus how many JSON objects the stream contained.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsReport {
    pub summary: TestSummary,
    pub metric_count: usize,
}

#[derive(Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: Option<String>,
    metric: Option<String>,
    data: Option<EventData>,
}

#[derive(Deserialize)]
struct EventData {
    value: Option<Value>,
}

pub fn parse_metrics(stdout: &str) -> MetricsReport {
    let mut report = MetricsReport::default();
    let mut durations: Vec<f64> = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        let Ok(object @ Value::Object(_)) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        report.metric_count += 1;

        // Counted above even when its fields are not the shape of an event.
        let Ok(event) = serde_json::from_value::<Event>(object) else {
            continue;
        };
        if event.kind.as_deref() != Some("Point") {
            continue;
        }
        let value = event.data.and_then(|data| data.value);
        let summary = &mut report.summary;
        match event.metric.as_deref() {
            Some("http_reqs") => summary.total_requests += 1,
            Some("http_req_failed") if value.as_ref().is_some_and(is_truthy) => {
                summary.failed_requests += 1;
            }
            Some("http_req_duration") => {
                if let Some(ms) = value.as_ref().and_then(Value::as_f64) {
                    durations.push(ms);
                }
            }
            Some("data_sent") => {
                summary.data_sent_bytes = summary
                    .data_sent_bytes
                    .saturating_add(byte_count(value.as_ref()));
            }
            Some("data_received") => {
                summary.data_received_bytes = summary
                    .data_received_bytes
                    .saturating_add(byte_count(value.as_ref()));
            }
            _ => {}
        }
    }

    report.summary.avg_response_time_ms = mean(&durations);
    report.summary.p95_response_time_ms = percentile_95(&mut durations);
    report
}

/// Request rate for `requests` spread over `elapsed_ms` of wall clock.
#[allow(clippy::cast_precision_loss)] // request counts and run times stay far below 2^52
pub fn request_rate(requests: u64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    requests as f64 * 1000.0 / elapsed_ms as f64
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

/// Byte totals arrive as integers or as floats such as `512.0`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // finite and non-negative
fn byte_count(value: Option<&Value>) -> u64 {
    value
        .and_then(|value| {
            value.as_u64().or_else(|| {
                value
                    .as_f64()
                    .filter(|bytes| bytes.is_finite() && *bytes >= 0.0)
                    .map(|bytes| bytes as u64)
            })
        })
        .unwrap_or(0)
}

#[allow(clippy::cast_precision_loss)] // sample counts stay far below 2^52
fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Nearest-rank 95th percentile over the sorted samples: element
/// `floor(0.95 * n)`, clamped to the last one.
fn percentile_95(samples: &mut [f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.sort_by(f64::total_cmp);
    let index = (samples.len() * 95 / 100).min(samples.len() - 1);
    samples.get(index).copied().unwrap_or(0.0)
}
