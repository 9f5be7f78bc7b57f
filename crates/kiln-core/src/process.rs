//! Toolchain process execution with a hard wall-clock limit.
//!
//! Every compile and run step goes through a [`ProcessRunner`]. The system
//! implementation spawns the program in its own process group with the
//! workspace as working directory, drains stdout/stderr while waiting, and
//! on timeout kills the whole group and reaps it before returning.

use crate::error::SandboxError;
use crate::language::StepKind;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Appended to a stream that hit the capture limit.
pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";

/// A fully rendered toolchain invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Whether this is a compile or a run step.
    pub kind: StepKind,
    /// Program to execute.
    pub program: String,
    /// Arguments, passed as argv without a shell.
    pub args: Vec<String>,
    /// Working directory (the request's workspace).
    pub workdir: PathBuf,
}

/// Bounds applied to one process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    /// Wall-clock limit from spawn to exit.
    pub timeout: Duration,
    /// How long to wait for a killed process to be reaped.
    pub teardown_grace: Duration,
    /// Per-stream capture limit in bytes.
    pub max_output_bytes: usize,
}

/// Captured outcome of one process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    /// Signal that terminated the process, if any (unix only).
    pub signal: Option<i32>,
    /// Standard output (empty if timed out).
    pub stdout: String,
    /// Standard error (empty if timed out).
    pub stderr: String,
    /// True if the process was killed for exceeding the limit.
    pub timed_out: bool,
    /// Wall-clock time from spawn to exit.
    pub duration: Duration,
}

impl ProcessOutput {
    /// Check if the process exited normally with code 0.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Spawns toolchain processes.
///
/// Implementations must never leave a process running past the call, and
/// return `Err` only when the process could not be started or waited on.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run one invocation to completion or until `limits.timeout` elapses.
    async fn run(
        &self,
        invocation: &Invocation,
        limits: &ProcessLimits,
    ) -> Result<ProcessOutput, SandboxError>;
}

/// Runner backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        limits: &ProcessLimits,
    ) -> Result<ProcessOutput, SandboxError> {
        debug!(
            kind = %invocation.kind,
            program = %invocation.program,
            args = ?invocation.args,
            "Spawning process"
        );

        let start = Instant::now();
        let deadline = start + limits.timeout;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| {
            warn!(program = %invocation.program, error = %source, "Process spawn failed");
            SandboxError::Spawn {
                program: invocation.program.clone(),
                source,
            }
        })?;
        let pid = child.id();

        let stdout_buf = SharedCapture::default();
        let stderr_buf = SharedCapture::default();
        let stdout_task = tokio::spawn(read_capped(
            child.stdout.take(),
            limits.max_output_bytes,
            Arc::clone(&stdout_buf),
        ));
        let stderr_task = tokio::spawn(read_capped(
            child.stderr.take(),
            limits.max_output_bytes,
            Arc::clone(&stderr_buf),
        ));

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(program = %invocation.program, error = %e, "Waiting on process failed");
                terminate(&mut child, pid, limits.teardown_grace).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(SandboxError::Io(e));
            }
            Err(_) => {
                warn!(
                    program = %invocation.program,
                    timeout_ms = limits.timeout.as_millis() as u64,
                    "Process timed out, killing process group"
                );
                terminate(&mut child, pid, limits.teardown_grace).await;
                stdout_task.abort();
                stderr_task.abort();
                return Ok(ProcessOutput {
                    timed_out: true,
                    duration: start.elapsed(),
                    ..Default::default()
                });
            }
        };
        let duration = start.elapsed();

        // Descendants left behind would keep the pipes open and keep writing
        // into the workspace. The leader is already reaped here, so the group
        // id is only reserved while some member is alive; if none is left
        // the kill is a no-op (ESRCH) unless the id was recycled in between.
        kill_group(pid);

        let stdout_abort = stdout_task.abort_handle();
        let stderr_abort = stderr_task.abort_handle();
        let streams = tokio::time::timeout(limits.teardown_grace, async {
            (stdout_task.await, stderr_task.await)
        })
        .await;
        match streams {
            Ok((Ok(Ok(())), Ok(Ok(())))) => {}
            Ok(_) => {
                warn!(program = %invocation.program, "Failed to read process output");
            }
            Err(_) => {
                // A process outside the group (e.g. after setsid) still holds
                // the pipes. Keep what was read before the exit.
                warn!(
                    program = %invocation.program,
                    "Output pipes still open after exit, detaching readers"
                );
                stdout_abort.abort();
                stderr_abort.abort();
            }
        }
        let stdout = take_capture(&stdout_buf).into_text(limits.max_output_bytes);
        let stderr = take_capture(&stderr_buf).into_text(limits.max_output_bytes);

        let output = ProcessOutput {
            exit_code: status.code(),
            signal: exit_signal(&status),
            stdout,
            stderr,
            timed_out: false,
            duration,
        };
        debug!(
            program = %invocation.program,
            exit_code = ?output.exit_code,
            signal = ?output.signal,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            elapsed_ms = duration.as_millis() as u64,
            "Process completed"
        );
        trace!(stdout = %output.stdout, stderr = %output.stderr, "Process output");
        Ok(output)
    }
}

/// Kill the process group and wait (bounded) for the child to be reaped.
async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) {
    kill_group(pid);
    if let Err(e) = child.start_kill() {
        trace!(error = %e, "start_kill after group kill");
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(?status, "Killed process reaped"),
        Ok(Err(e)) => warn!(error = %e, "Failed to reap killed process"),
        Err(_) => warn!(
            grace_ms = grace.as_millis() as u64,
            "Killed process not reaped within grace period"
        ),
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "Failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Bytes captured from one stream.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_text(self, max_bytes: usize) -> String {
        let text = String::from_utf8_lossy(&self.bytes).into_owned();
        truncate_output(text, max_bytes, self.truncated)
    }
}

/// Capture buffer shared between a reader task and the runner, so bytes
/// read so far survive the reader being aborted.
type SharedCapture = Arc<Mutex<Captured>>;

fn take_capture(buf: &SharedCapture) -> Captured {
    let mut guard = buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    std::mem::take(&mut *guard)
}

/// Read a stream to EOF into `sink`, keeping at most `limit` bytes.
///
/// The rest is drained and discarded so the child never blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, limit: usize, sink: SharedCapture) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let mut captured = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let room = limit.saturating_sub(captured.bytes.len());
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
        if n > room {
            captured.truncated = true;
        }
    }
}

/// Truncate a string to max bytes, preserving UTF-8 boundaries.
fn truncate_output(mut s: String, max_bytes: usize, truncated: bool) -> String {
    if s.len() <= max_bytes && !truncated {
        return s;
    }
    let mut end = max_bytes.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s.push_str(TRUNCATION_MARKER);
    s
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, workdir: &std::path::Path) -> Invocation {
        Invocation {
            kind: StepKind::Run,
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            workdir: workdir.to_path_buf(),
        }
    }

    fn limits(timeout: Duration) -> ProcessLimits {
        ProcessLimits {
            timeout,
            teardown_grace: Duration::from_secs(2),
            max_output_bytes: 1024 * 1024,
        }
    }

    #[test]
    fn test_truncate_output_utf8_boundary() {
        let s = "héllo".to_string();
        let out = truncate_output(s, 2, false);
        assert!(out.starts_with('h'));
        assert!(out.ends_with("[output truncated]"));
    }

    #[test]
    fn test_truncate_output_untouched_when_small() {
        assert_eq!(truncate_output("abc".into(), 10, false), "abc");
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = SystemRunner
            .run(
                &sh("echo out; echo err >&2", dir.path()),
                &limits(Duration::from_secs(5)),
            )
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let out = SystemRunner
            .run(&sh("exit 42", dir.path()), &limits(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(42));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let out = SystemRunner
            .run(&sh("cat marker.txt", dir.path()), &limits(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(out.stdout, "here");
    }

    #[tokio::test]
    async fn test_timeout_kills_and_discards_output() {
        let dir = tempfile::tempdir().unwrap();
        let started = std::time::Instant::now();
        let out = SystemRunner
            .run(
                &sh("echo partial; sleep 30", dir.path()),
                &limits(Duration::from_millis(300)),
            )
            .await
            .unwrap();
        assert!(out.timed_out);
        assert!(out.stdout.is_empty());
        assert!(out.exit_code.is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_background_child_does_not_hold_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let started = std::time::Instant::now();
        let out = SystemRunner
            .run(
                &sh("sleep 30 & echo done", dir.path()),
                &limits(Duration::from_secs(20)),
            )
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "done");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_output_kept_when_detached_child_holds_pipes() {
        if which::which("setsid").is_err() {
            eprintln!("Skipping test: setsid not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut l = limits(Duration::from_secs(20));
        l.teardown_grace = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let out = SystemRunner
            .run(&sh("setsid sleep 5 & echo done", dir.path()), &l)
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "done\n");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_take_capture_empties_buffer() {
        let buf = SharedCapture::default();
        buf.lock().unwrap().bytes.extend_from_slice(b"abc");
        assert_eq!(take_capture(&buf).into_text(10), "abc");
        assert!(take_capture(&buf).bytes.is_empty());
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut l = limits(Duration::from_secs(5));
        l.max_output_bytes = 100;
        let out = SystemRunner
            .run(
                &sh("i=0; while [ $i -lt 500 ]; do printf aaaaaaaaaa; i=$((i+1)); done", dir.path()),
                &l,
            )
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.starts_with(&"a".repeat(100)));
        assert!(out.stdout.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let inv = Invocation {
            kind: StepKind::Run,
            program: "kiln-no-such-toolchain".into(),
            args: vec![],
            workdir: dir.path().to_path_buf(),
        };
        let err = SystemRunner
            .run(&inv, &limits(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { ref program, .. } if program == "kiln-no-such-toolchain"));
    }

    #[tokio::test]
    async fn test_killed_by_signal() {
        let dir = tempfile::tempdir().unwrap();
        let out = SystemRunner
            .run(&sh("kill -9 $$", dir.path()), &limits(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(out.exit_code.is_none());
        assert_eq!(out.signal, Some(9));
        assert!(!out.timed_out);
    }
}
