//! Caller-facing execution results.

use crate::error::SandboxError;
use crate::process::ProcessOutput;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Classification of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Run step exited with code 0.
    Success,
    /// A compile step exited non-zero; the run step was not attempted.
    CompileFailed,
    /// Run step exited non-zero or was killed by a signal.
    RuntimeFailed,
    /// A step exceeded its wall-clock limit and was killed.
    TimedOut,
    /// The pipeline itself failed (unknown language, spawn or filesystem error).
    InternalError,
}

impl Outcome {
    /// All outcomes, in declaration order.
    pub const ALL: [Outcome; 5] = [
        Self::Success,
        Self::CompileFailed,
        Self::RuntimeFailed,
        Self::TimedOut,
        Self::InternalError,
    ];

    /// Snake-case name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::CompileFailed => "compile_failed",
            Self::RuntimeFailed => "runtime_failed",
            Self::TimedOut => "timed_out",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured answer for one execution request.
///
/// `output` is only ever non-empty for `Success` and `RuntimeFailed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured standard output of the run step.
    pub output: String,
    /// Captured standard error, compiler diagnostics, or failure message.
    pub error: String,
    /// Outcome tag.
    pub outcome: Outcome,
    /// Exit code of the last step that exited normally.
    pub exit_code: Option<i32>,
    /// Wall-clock time spent in toolchain processes.
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Run step exited with code 0.
    pub fn success(run: ProcessOutput, elapsed: Duration) -> Self {
        Self {
            output: run.stdout,
            error: run.stderr,
            outcome: Outcome::Success,
            exit_code: run.exit_code,
            duration_ms: millis(elapsed),
        }
    }

    /// Compile step failed. Diagnostics go to `error`; if the compiler only
    /// wrote to stdout, that text is used instead.
    pub fn compile_failed(compile: ProcessOutput, elapsed: Duration) -> Self {
        let error = if compile.stderr.trim().is_empty() {
            compile.stdout
        } else {
            compile.stderr
        };
        Self {
            output: String::new(),
            error,
            outcome: Outcome::CompileFailed,
            exit_code: compile.exit_code,
            duration_ms: millis(elapsed),
        }
    }

    /// Run step exited non-zero or died from a signal; partial output is kept.
    pub fn runtime_failed(run: ProcessOutput, elapsed: Duration) -> Self {
        let mut error = run.stderr;
        if let Some(signal) = run.signal {
            if !error.is_empty() && !error.ends_with('\n') {
                error.push('\n');
            }
            error.push_str(&format!("Process terminated by signal {signal}"));
        }
        Self {
            output: run.stdout,
            error,
            outcome: Outcome::RuntimeFailed,
            exit_code: run.exit_code,
            duration_ms: millis(elapsed),
        }
    }

    /// A step was killed at the limit; any partial output is discarded.
    pub fn timed_out(limit: Duration, elapsed: Duration) -> Self {
        Self {
            output: String::new(),
            error: format!("Execution timed out after {}s", limit.as_secs_f64()),
            outcome: Outcome::TimedOut,
            exit_code: None,
            duration_ms: millis(elapsed),
        }
    }

    /// The pipeline failed before or around the toolchain.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: message.into(),
            outcome: Outcome::InternalError,
            exit_code: None,
            duration_ms: 0,
        }
    }

    /// Check if the outcome is `Success`.
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

impl From<SandboxError> for ExecutionResult {
    fn from(err: SandboxError) -> Self {
        let message = match &err {
            SandboxError::UnknownLanguage(_) | SandboxError::NotImplemented(_) => err.to_string(),
            _ => format!("Error executing code: {err}"),
        };
        Self::internal_error(message)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: Option<i32>, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&Outcome::CompileFailed).unwrap();
        assert_eq!(json, "\"compile_failed\"");
        for outcome in Outcome::ALL {
            let json = serde_json::to_string(&outcome).unwrap();
            assert_eq!(json, format!("\"{}\"", outcome.as_str()));
        }
    }

    #[test]
    fn test_compile_failed_has_no_output() {
        let r = ExecutionResult::compile_failed(
            output(Some(1), "", "main.cpp:1: error"),
            Duration::from_millis(5),
        );
        assert_eq!(r.outcome, Outcome::CompileFailed);
        assert!(r.output.is_empty());
        assert_eq!(r.error, "main.cpp:1: error");
    }

    #[test]
    fn test_compile_failed_falls_back_to_stdout_diagnostics() {
        let r = ExecutionResult::compile_failed(
            output(Some(1), "error CS1002: ; expected", ""),
            Duration::ZERO,
        );
        assert!(r.output.is_empty());
        assert_eq!(r.error, "error CS1002: ; expected");
    }

    #[test]
    fn test_runtime_failed_keeps_partial_output() {
        let r = ExecutionResult::runtime_failed(
            output(Some(3), "partial\n", "boom\n"),
            Duration::ZERO,
        );
        assert_eq!(r.output, "partial\n");
        assert_eq!(r.error, "boom\n");
        assert_eq!(r.exit_code, Some(3));
    }

    #[test]
    fn test_runtime_failed_reports_signal() {
        let mut run = output(None, "", "");
        run.signal = Some(11);
        let r = ExecutionResult::runtime_failed(run, Duration::ZERO);
        assert_eq!(r.error, "Process terminated by signal 11");
    }

    #[test]
    fn test_timed_out_message() {
        let r = ExecutionResult::timed_out(Duration::from_secs(10), Duration::from_secs(10));
        assert_eq!(r.outcome, Outcome::TimedOut);
        assert!(r.output.is_empty());
        assert!(r.error.starts_with("Execution timed out"));
    }

    #[test]
    fn test_from_sandbox_error() {
        let r: ExecutionResult = SandboxError::UnknownLanguage("cobol".into()).into();
        assert_eq!(r.outcome, Outcome::InternalError);
        assert_eq!(r.error, "unsupported language: cobol");

        let r: ExecutionResult = SandboxError::Spawn {
            program: "g++".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into();
        assert_eq!(r.outcome, Outcome::InternalError);
        assert!(r.error.starts_with("Error executing code: failed to execute g++"));
    }
}
