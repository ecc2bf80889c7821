//! Test fixtures for k6box.
//!
//! Integration tests never need a real k6. They point the harness at a small
//! shell script standing in for it, built here, and feed it canned output in
//! the shapes k6 actually produces.

#![allow(clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

/// A script k6 would accept: imports, a default function, one request.
pub const VALID_SCRIPT: &str = "import http from 'k6/http';
import { check, sleep } from 'k6';

export default function () {
  const res = http.get('https://test.k6.io');
  check(res, { 'status is 200': (r) => r.status === 200 });
  sleep(1);
}
";

/// stderr of a run whose script is fine but whose thresholds were not met.
pub const THRESHOLD_STDERR: &str =
    r#"time="2024-05-01T10:00:00Z" level=error msg="thresholds on metrics 'http_req_duration' have been crossed: some thresholds have failed""#;

/// stderr of a script that does not parse.
pub const SYNTAX_ERROR_STDERR: &str =
    r#"time="2024-05-01T10:00:00Z" level=error msg="SyntaxError: file:///tmp/script.js: Unexpected token (4:2)""#;

/// Exit code k6 uses when thresholds fail.
pub const THRESHOLD_EXIT_CODE: i32 = 99;
/// Exit code k6 uses when the script cannot be loaded.
pub const SCRIPT_EXIT_CODE: i32 = 107;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Create a unique temporary directory for a test.
///
/// The name carries the process id, a timestamp and a per-process counter, so
/// parallel tests never share a directory.
///
/// # Panics
///
/// Panics if the directory cannot be created.
///
/// # Example
///
/// ```ignore
/// let dir = temp_dir("threshold");
/// // dir is something like /tmp/k6box-threshold-4242-1703520000000-0
/// ```
#[must_use]
pub fn temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let sequence = SEQUENCE.fetch_add(1, Ordering::SeqCst);
    dir.push(format!(
        "k6box-{prefix}-{}-{stamp}-{sequence}",
        std::process::id()
    ));

    fs::create_dir_all(&dir).expect("failed to create temp directory");

    dir
}

/// A shell script installed as `k6` that records how it was called.
#[derive(Clone, Debug)]
pub struct FakeK6 {
    /// Path of the executable.
    pub binary: PathBuf,
    args_file: PathBuf,
}

impl FakeK6 {
    /// Install a fake `k6` in `dir` that records its arguments, then runs `body`.
    ///
    /// `body` is POSIX shell. Use [`stdout`] and [`stderr`] to emit canned
    /// output and end with `exit N` to pick the exit code.
    ///
    /// # Panics
    ///
    /// Panics if the script cannot be written or made executable.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let k6 = FakeK6::install(&dir, &format!("{}\nexit 99", stderr(THRESHOLD_STDERR)));
    /// ```
    #[must_use]
    pub fn install(dir: &Path, body: &str) -> Self {
        let binary = dir.join("k6");
        let args_file = dir.join("k6-args.txt");
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\n{body}\n",
            args_file.display()
        );
        fs::write(&binary, script).expect("failed to write fake k6");
        make_executable(&binary);
        Self { binary, args_file }
    }

    /// Whether the harness ever started this binary.
    #[must_use]
    pub fn was_invoked(&self) -> bool {
        self.args_file.exists()
    }

    /// Arguments of the most recent invocation; empty if never invoked.
    #[must_use]
    pub fn recorded_args(&self) -> Vec<String> {
        fs::read_to_string(&self.args_file)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The staged script path k6 was handed, which is always the last argument.
    #[must_use]
    pub fn script_arg(&self) -> Option<PathBuf> {
        self.recorded_args().last().map(PathBuf::from)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .expect("failed to mark fake k6 executable");
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

/// Shell fragment writing `text` verbatim to stdout.
#[must_use]
pub fn stdout(text: &str) -> String {
    format!("cat <<'K6BOX_EOF'\n{text}\nK6BOX_EOF")
}

/// Shell fragment writing `text` verbatim to stderr.
#[must_use]
pub fn stderr(text: &str) -> String {
    format!("cat >&2 <<'K6BOX_EOF'\n{text}\nK6BOX_EOF")
}

/// One k6 `Point` event line as written by `--out json`.
#[must_use]
pub fn point_line(metric: &str, value: f64) -> String {
    json!({
        "type": "Point",
        "metric": metric,
        "data": {
            "time": "2024-05-01T10:00:00.000000Z",
            "value": value,
            "tags": { "method": "GET", "status": "200" }
        }
    })
    .to_string()
}

/// A metric stream with a banner line, `requests` request points and one
/// duration point per entry of `durations_ms`.
#[must_use]
pub fn metric_stream(requests: usize, durations_ms: &[f64]) -> String {
    let mut lines = vec![
        "          /\\      Grafana   /‾‾/".to_string(),
        json!({"type": "Metric", "metric": "http_reqs", "data": {"type": "counter"}}).to_string(),
    ];
    lines.extend((0..requests).map(|_| point_line("http_reqs", 1.0)));
    lines.extend(
        durations_ms
            .iter()
            .map(|ms| point_line("http_req_duration", *ms)),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn temp_dir_creates_unique_directories() {
        let dir1 = temp_dir("same");
        let dir2 = temp_dir("same");

        assert!(dir1.exists());
        assert!(dir2.exists());
        assert_ne!(dir1, dir2);

        let _ = fs::remove_dir_all(&dir1);
        let _ = fs::remove_dir_all(&dir2);
    }

    #[test]
    fn metric_stream_has_one_line_per_event() {
        let stream = metric_stream(3, &[10.0, 20.0]);
        assert_eq!(stream.lines().count(), 7);
        assert!(stream.lines().nth(2).unwrap().contains("\"http_reqs\""));
    }

    #[cfg(unix)]
    #[test]
    fn fake_k6_is_executable_and_not_yet_invoked() {
        use std::os::unix::fs::PermissionsExt;

        let dir = temp_dir("fake");
        let k6 = FakeK6::install(&dir, "exit 0");
        let mode = fs::metadata(&k6.binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(!k6.was_invoked());
        assert!(k6.recorded_args().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }
}
