//! Bounded execution of the k6 binary.
//!
//! The child runs in its own process group with a two-variable environment.
//! Its stdout and stderr are drained in full on reader threads while the
//! calling thread polls for exit. When the deadline passes or the request is
//! cancelled, the whole group is terminated and reaped before the error is
//! returned, so no k6 process outlives its request.

use crate::error::{GateError, GateResult};
use crate::model::ExecutionOutcome;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Time allowed between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_millis(200);

/// Shared flag that aborts an in-flight execution.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation for one execution.
#[derive(Clone, Debug)]
pub struct ExecContext {
    timeout: Duration,
    deadline: Instant,
    cancel: CancelToken,
}

impl ExecContext {
    /// Context whose deadline starts counting now.
    pub fn new(timeout: Duration) -> Self {
        Self::with_cancel(timeout, CancelToken::new())
    }

    pub fn with_cancel(timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn check(&self) -> GateResult<()> {
        if self.cancel.is_cancelled() {
            return Err(GateError::Cancelled);
        }
        if self.is_expired() {
            return Err(GateError::Timeout {
                limit_ms: millis(self.timeout),
            });
        }
        Ok(())
    }
}

/// Resolve `name` to an executable file.
///
/// A name containing a path separator is used as-is; anything else is looked
/// up in `search_path` (normally the value of `PATH`).
pub fn find_binary(name: &str, search_path: Option<&OsStr>) -> GateResult<PathBuf> {
    let not_found = || GateError::K6NotFound {
        binary: name.to_string(),
    };

    if name.is_empty() {
        return Err(not_found());
    }

    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        let candidate = PathBuf::from(name);
        return if is_executable(&candidate) {
            Ok(candidate)
        } else {
            Err(not_found())
        };
    }

    search_path
        .into_iter()
        .flat_map(std::env::split_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_found)
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// The only variables a k6 child ever sees: `PATH` and, when set, `HOME`.
pub fn secure_environment() -> Vec<(String, String)> {
    let mut env = vec![(
        "PATH".to_string(),
        std::env::var_os("PATH")
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default(),
    )];
    if let Some(home) = std::env::var_os("HOME").filter(|value| !value.is_empty()) {
        env.push(("HOME".to_string(), home.to_string_lossy().into_owned()));
    }
    env
}

/// Run `binary args...` under `ctx`.
///
/// A non-zero exit is returned as data in the outcome. Errors are reserved for
/// failing to start (`EXECUTION_ERROR`) and for the deadline or cancellation
/// firing first (`TIMEOUT`).
pub fn execute(
    ctx: &ExecContext,
    binary: &Path,
    args: &[String],
    env: &[(String, String)],
) -> GateResult<ExecutionOutcome> {
    ctx.check()?;
    let started = Instant::now();

    let mut command = Command::new(binary);
    command
        .args(args)
        .env_clear()
        .envs(env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(GateError::Execution)?;
    tracing::debug!(pid = child.id(), args = args.len(), "k6 started");

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_within(&mut child, ctx) {
        Ok(status) => status,
        Err(err) => {
            tracing::warn!(pid = child.id(), error = %err, "terminating k6 process group");
            terminate_process_group(&mut child);
            // Pipes close once the group is gone; the partial output is discarded.
            collect(stdout);
            collect(stderr);
            return Err(err);
        }
    };

    let outcome = ExecutionOutcome {
        exit_code: status.code().unwrap_or(-1),
        stdout: collect(stdout),
        stderr: collect(stderr),
        duration_ms: elapsed_ms(&started),
        success: status.success(),
    };
    tracing::debug!(
        exit_code = outcome.exit_code,
        duration_ms = outcome.duration_ms,
        "k6 exited"
    );
    Ok(outcome)
}

/// An exit reaped after the deadline still counts as a timeout.
fn wait_within(child: &mut Child, ctx: &ExecContext) -> GateResult<ExitStatus> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                ctx.check()?;
                return Ok(status);
            }
            Ok(None) => {
                ctx.check()?;
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => return Err(GateError::Execution(err)),
        }
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) | Err(_) => return None,
        }
    }
}

/// SIGTERM the child's process group, then SIGKILL after a short grace, then reap.
fn terminate_process_group(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(raw) = i32::try_from(child.id()) {
        let pgid = Pid::from_raw(raw);
        signal_process_group(pgid, Signal::SIGTERM);
        if wait_for_exit(child, TERMINATE_GRACE).is_some() {
            // The leader is gone but stragglers may remain in the group.
            signal_process_group(pgid, Signal::SIGKILL);
            return;
        }
        signal_process_group(pgid, Signal::SIGKILL);
    }

    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "kill after group signal");
    }
    if let Err(err) = child.wait() {
        tracing::warn!(error = %err, "failed to reap k6 process");
    }
}

#[cfg(unix)]
fn signal_process_group(pgid: Pid, signal: Signal) {
    match killpg(pgid, signal) {
        // ESRCH means the group is already gone
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(err) => tracing::warn!(error = %err, ?signal, "failed to signal process group"),
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    source.map(|mut stream| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(err) = stream.read_to_end(&mut buffer) {
                tracing::debug!(error = %err, "output stream ended with error");
            }
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

pub(crate) fn elapsed_ms(started: &Instant) -> u64 {
    millis(started.elapsed())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
