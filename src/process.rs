// src/process.rs

//! Process runner.
//!
//! Spawns exactly one external command per call and turns whatever happens
//! to it into either captured output or a classified `RunFailure`:
//!
//! - `ToolNotFound`  the binary is not on this host
//! - `Timeout`       the wall-clock budget ran out; the process group is killed
//! - `NonZeroExit`   the tool ran and reported failure
//! - `Internal`      the runner itself could not spawn or wait on the child
//!
//! stdout and stderr share one byte budget. Once it is spent the capture is
//! truncated, flagged, and the process group is killed, so runaway output
//! costs neither unbounded memory nor unbounded CPU.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::metrics::{InvocationMetrics, MemoryTracker, SAMPLE_EVERY};

/// Exit code reported when no real exit code exists (launch failure,
/// timeout, runner fault).
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// How long readers may keep draining pipes after the child has ended.
/// Anything still holding a pipe open after this is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8 * 1024;

/* ---------------- request / result types ---------------- */

/// One command invocation.
#[derive(Debug, Clone)]
pub struct RunSpec {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl RunSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Override the runner's default timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cap this call's timeout at `limit`, keeping any shorter override.
    pub fn timeout_at_most(mut self, limit: Duration) -> Self {
        self.timeout = Some(self.timeout.map_or(limit, |t| t.min(limit)));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Output captured from a child that ran to completion (or was cut short).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// The combined output cap was hit and the capture is incomplete.
    pub truncated: bool,
    pub metrics: InvocationMetrics,
}

#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("`{program}` is not installed on this host")]
    ToolNotFound { program: String },

    #[error("`{program}` did not finish within {} ms", .timeout.as_millis())]
    Timeout {
        program: String,
        timeout: Duration,
        partial: Captured,
    },

    #[error("`{program}` exited with status {}", .output.exit_code)]
    NonZeroExit { program: String, output: Captured },

    #[error("failed to run `{program}`: {source}")]
    Internal {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/* ---------------- runner ---------------- */

/// Spawns commands under a timeout and an output cap.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    default_timeout: Duration,
    max_output_bytes: usize,
}

impl ProcessRunner {
    pub fn new(config: &Config) -> Self {
        Self::with_limits(config.execution_timeout(), config.max_output_bytes)
    }

    pub fn with_limits(default_timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            default_timeout,
            max_output_bytes,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    pub async fn run(&self, spec: RunSpec) -> Result<Captured, RunFailure> {
        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        let program = spec.program.clone();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        // Own process group, so a timeout can take out grandchildren too.
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(program = %program, "toolchain binary not found");
                return Err(RunFailure::ToolNotFound { program });
            }
            Err(source) => return Err(RunFailure::Internal { program, source }),
        };

        let pid = child.id();
        tracing::debug!(program = %program, pid = ?pid, timeout_ms = timeout.as_millis() as u64, "process spawned");

        let tracker = pid.map(|p| MemoryTracker::start(p, SAMPLE_EVERY));

        let budget = Arc::new(OutputBudget::new(self.max_output_bytes));
        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));

        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(tokio::spawn(drain(out, Arc::clone(&budget), Arc::clone(&stdout_buf))));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(tokio::spawn(drain(err, Arc::clone(&budget), Arc::clone(&stderr_buf))));
        }

        let ending = tokio::time::timeout(timeout, async {
            tokio::select! {
                status = child.wait() => Ending::Exited(status),
                _ = budget.exceeded() => Ending::Overflow,
            }
        })
        .await;

        let mut timed_out = false;
        let status = match ending {
            Ok(Ending::Exited(Ok(status))) => Some(status),
            Ok(Ending::Exited(Err(source))) => {
                terminate(&mut child, pid).await;
                abort_all(&readers);
                stop_tracker(tracker).await;
                return Err(RunFailure::Internal { program, source });
            }
            Ok(Ending::Overflow) => {
                tracing::warn!(program = %program, cap = self.max_output_bytes, "output cap exceeded; killing process group");
                terminate(&mut child, pid).await
            }
            Err(_) => {
                tracing::warn!(program = %program, timeout_ms = timeout.as_millis() as u64, "timeout; killing process group");
                timed_out = true;
                terminate(&mut child, pid).await
            }
        };

        if tokio::time::timeout(DRAIN_GRACE, join_all(&mut readers))
            .await
            .is_err()
        {
            // Something outside our wait still holds the pipes.
            tracing::debug!(program = %program, "pipes still open after exit; killing leftovers");
            kill_group(pid);
            abort_all(&readers);
        }

        let metrics = InvocationMetrics {
            duration_ms: start.elapsed().as_millis() as u64,
            peak_memory_kb: stop_tracker(tracker).await,
        };

        let captured = Captured {
            stdout: take_lossy(&stdout_buf),
            stderr: take_lossy(&stderr_buf),
            exit_code: status.map(exit_code).unwrap_or(SENTINEL_EXIT_CODE),
            truncated: budget.is_exceeded(),
            metrics,
        };

        tracing::debug!(
            program = %program,
            exit_code = captured.exit_code,
            duration_ms = metrics.duration_ms,
            truncated = captured.truncated,
            "process finished"
        );

        if timed_out {
            return Err(RunFailure::Timeout {
                program,
                timeout,
                partial: Captured {
                    exit_code: SENTINEL_EXIT_CODE,
                    ..captured
                },
            });
        }

        if captured.exit_code != 0 {
            return Err(RunFailure::NonZeroExit {
                program,
                output: captured,
            });
        }

        Ok(captured)
    }
}

enum Ending {
    Exited(std::io::Result<ExitStatus>),
    Overflow,
}

/* ---------------- output budget ---------------- */

/// Byte budget shared by the stdout and stderr readers.
struct OutputBudget {
    remaining: AtomicUsize,
    exceeded: AtomicBool,
    notify: Notify,
}

impl OutputBudget {
    fn new(limit: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(limit),
            exceeded: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Reserve up to `want` bytes; returns how many were granted.
    fn take(&self, want: usize) -> usize {
        let mut granted = 0;
        let _ = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                granted = want.min(left);
                Some(left - granted)
            });

        if granted < want {
            self.exceeded.store(true, Ordering::SeqCst);
            self.notify.notify_one();
        }
        granted
    }

    fn is_exceeded(&self) -> bool {
        self.exceeded.load(Ordering::SeqCst)
    }

    async fn exceeded(&self) {
        if self.is_exceeded() {
            return;
        }
        self.notify.notified().await;
    }
}

async fn drain<R>(mut reader: R, budget: Arc<OutputBudget>, sink: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        let granted = budget.take(n);
        if granted > 0 {
            let mut buf = sink.lock().unwrap_or_else(|e| e.into_inner());
            buf.extend_from_slice(&chunk[..granted]);
        }
        if granted < n {
            break;
        }
    }
}

fn take_lossy(buf: &Mutex<Vec<u8>>) -> String {
    let bytes = std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner()));
    String::from_utf8_lossy(&bytes).into_owned()
}

/* ---------------- lifecycle helpers ---------------- */

/// Kill the child's whole process group and reap the child.
async fn terminate(child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
    kill_group(pid);
    let _ = child.start_kill();
    child.wait().await.ok()
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: killpg only sends a signal; the group id is the pid of a
        // child we spawned as its own group leader.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

async fn join_all(readers: &mut [JoinHandle<()>]) {
    for handle in readers.iter_mut() {
        let _ = handle.await;
    }
}

fn abort_all(readers: &[JoinHandle<()>]) {
    for handle in readers {
        handle.abort();
    }
}

/// Joining the sampler thread blocks, so it happens off the async workers.
async fn stop_tracker(tracker: Option<MemoryTracker>) -> Option<u64> {
    let tracker = tracker?;
    tokio::task::spawn_blocking(move || tracker.stop_and_take())
        .await
        .ok()
        .flatten()
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    SENTINEL_EXIT_CODE
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner(timeout_ms: u64, cap: usize) -> ProcessRunner {
        ProcessRunner::with_limits(Duration::from_millis(timeout_ms), cap)
    }

    fn sh(script: &str) -> RunSpec {
        RunSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn captures_stdout_stderr_and_exit_code() {
        let out = runner(5_000, 10_000)
            .run(sh("echo hello; echo oops >&2"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.exit_code, 0);
        assert!(!out.truncated);
    }

    #[tokio::test]
    async fn nonzero_exit_is_classified_with_output() {
        let err = runner(5_000, 10_000)
            .run(sh("echo partial; echo bad >&2; exit 3"))
            .await
            .unwrap_err();
        match err {
            RunFailure::NonZeroExit { output, .. } => {
                assert_eq!(output.exit_code, 3);
                assert_eq!(output.stdout, "partial\n");
                assert_eq!(output.stderr, "bad\n");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_tool_not_found() {
        let err = runner(5_000, 10_000)
            .run(RunSpec::new("definitely-not-a-real-binary-4f1c"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunFailure::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn infinite_loop_is_killed_at_the_deadline() {
        let started = Instant::now();
        let err = runner(300, 10_000)
            .run(sh("echo before; while :; do :; done"))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            RunFailure::Timeout { partial, timeout, .. } => {
                assert_eq!(timeout, Duration::from_millis(300));
                assert_eq!(partial.stdout, "before\n");
                assert_eq!(partial.exit_code, SENTINEL_EXIT_CODE);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn per_call_timeout_overrides_default() {
        let err = runner(60_000, 10_000)
            .run(sh("sleep 30").timeout(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, RunFailure::Timeout { .. }));
    }

    #[tokio::test]
    async fn timeout_kills_background_children_too() {
        let started = Instant::now();
        let err = runner(300, 10_000)
            .run(sh("sleep 30 & sleep 30"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunFailure::Timeout { .. }));
        // would otherwise wait on the backgrounded sleep holding the pipe
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn runaway_output_is_capped() {
        let result = runner(10_000, 1_000).run(sh("yes")).await;
        let output = match result {
            Ok(out) => out,
            Err(RunFailure::NonZeroExit { output, .. }) => output,
            Err(other) => panic!("unexpected: {other:?}"),
        };
        assert!(output.truncated);
        assert!(output.stdout.len() + output.stderr.len() <= 1_000);
    }

    #[tokio::test]
    async fn cap_is_shared_between_streams() {
        let result = runner(10_000, 10)
            .run(sh("printf 'aaaaaaaa'; printf 'bbbbbbbb' >&2"))
            .await;
        let output = match result {
            Ok(out) => out,
            Err(RunFailure::NonZeroExit { output, .. }) => output,
            Err(other) => panic!("unexpected: {other:?}"),
        };
        assert!(output.truncated);
        assert_eq!(output.stdout.len() + output.stderr.len(), 10);
    }

    #[tokio::test]
    async fn writing_past_the_cap_kills_a_process_that_would_exit_cleanly() {
        let err = runner(10_000, 1_000)
            .run(sh("head -c 100000 /dev/zero; exit 0"))
            .await
            .unwrap_err();
        match err {
            RunFailure::NonZeroExit { output, .. } => {
                assert_eq!(output.exit_code, 128 + libc::SIGKILL);
                assert!(output.truncated);
                assert_eq!(output.stdout.len(), 1_000);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn timeout_at_most_keeps_the_shorter_value() {
        let cap = Duration::from_secs(5);
        assert_eq!(sh("true").timeout_at_most(cap).timeout, Some(cap));
        assert_eq!(
            sh("true").timeout(Duration::from_secs(60)).timeout_at_most(cap).timeout,
            Some(cap)
        );
        assert_eq!(
            sh("true").timeout(Duration::from_millis(200)).timeout_at_most(cap).timeout,
            Some(Duration::from_millis(200))
        );
    }

    #[tokio::test]
    async fn memory_tracker_is_stopped_off_the_runtime() {
        let tracker = MemoryTracker::start(std::process::id(), SAMPLE_EVERY);
        tokio::time::sleep(SAMPLE_EVERY * 2).await;
        assert!(stop_tracker(Some(tracker)).await.is_some());
        assert_eq!(stop_tracker(None).await, None);
    }

    #[tokio::test]
    async fn env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner(5_000, 10_000)
            .run(sh("echo $GREETING; pwd").env("GREETING", "hi").current_dir(dir.path()))
            .await
            .unwrap();
        let mut lines = out.stdout.lines();
        assert_eq!(lines.next(), Some("hi"));
        let cwd = std::path::Path::new(lines.next().unwrap()).canonicalize().unwrap();
        assert_eq!(cwd, dir.path().canonicalize().unwrap());
    }
}
