//! Request and response bodies for the HTTP API.

use kiln_core::{ExecutionRequest, ExecutionResult, LanguageProfile, Outcome, StatsSnapshot};
use serde::{Deserialize, Serialize};

// ============================================================================
// Code Execution
// ============================================================================

/// Body of `POST /execute`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecuteRequest {
    /// Code to execute.
    pub code: String,

    /// Language identifier (see `GET /languages`).
    pub language: String,
}

impl From<ExecuteRequest> for ExecutionRequest {
    fn from(req: ExecuteRequest) -> Self {
        ExecutionRequest::new(req.language, req.code)
    }
}

/// Result of executing code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    /// Standard output of the program.
    pub output: String,
    /// Standard error, compiler diagnostics, or failure message.
    pub error: String,
    /// Outcome tag (`success`, `compile_failed`, `runtime_failed`,
    /// `timed_out`, `internal_error`).
    pub outcome: Outcome,
    /// Exit code, if the last step exited normally.
    pub exit_code: Option<i32>,
    /// Time spent in toolchain processes.
    pub duration_ms: u64,
}

impl From<ExecutionResult> for ExecutionResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            output: result.output,
            error: result.error,
            outcome: result.outcome,
            exit_code: result.exit_code,
            duration_ms: result.duration_ms,
        }
    }
}

// ============================================================================
// Server Info
// ============================================================================

/// One entry of `GET /languages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// Canonical identifier.
    pub id: String,
    /// Alternative identifiers.
    pub aliases: Vec<String>,
    /// Source file extension.
    pub extension: String,
    /// Whether the language has a separate compile step.
    pub compiled: bool,
    /// Starter program.
    pub template: Option<String>,
    /// Whether the toolchain is installed on this host.
    pub available: bool,
}

impl LanguageInfo {
    /// Describe `profile`.
    pub fn new(profile: &LanguageProfile, available: bool) -> Self {
        Self {
            id: profile.id.clone(),
            aliases: profile.aliases.clone(),
            extension: profile.extension.clone(),
            compiled: profile.is_compiled(),
            template: profile.template.clone(),
            available,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub stats: StatsSnapshot,
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}
