//! Execution log - the record-keeping collaborator behind `POST /execute`.
//!
//! Records are dispatched on a detached task so a slow or failing log never
//! delays a response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiln_core::{ExecutionResult, Outcome};
use serde::Serialize;
use std::sync::Arc;

/// Summary of one finished execution. The submitted code is not retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    /// When the execution finished.
    pub timestamp: DateTime<Utc>,
    /// Requested language identifier, as submitted.
    pub language: String,
    /// Source size in bytes.
    pub code_len: usize,
    /// Outcome tag.
    pub outcome: Outcome,
    /// Exit code, if any.
    pub exit_code: Option<i32>,
    /// Time spent in toolchain processes.
    pub duration_ms: u64,
}

impl ExecutionRecord {
    /// Build a record for a finished request.
    pub fn new(language: impl Into<String>, code_len: usize, result: &ExecutionResult) -> Self {
        Self {
            timestamp: Utc::now(),
            language: language.into(),
            code_len,
            outcome: result.outcome,
            exit_code: result.exit_code,
            duration_ms: result.duration_ms,
        }
    }
}

/// Sink for execution records.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    /// Store one record. Failures are the implementation's to report.
    async fn record(&self, record: ExecutionRecord);
}

/// Log that emits each record as a structured tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

#[async_trait]
impl ExecutionLog for TracingLog {
    async fn record(&self, record: ExecutionRecord) {
        tracing::info!(
            target: "kiln_server::executions",
            timestamp = %record.timestamp.to_rfc3339(),
            language = %record.language,
            code_len = record.code_len,
            outcome = %record.outcome,
            exit_code = ?record.exit_code,
            duration_ms = record.duration_ms,
            "Execution recorded"
        );
    }
}

/// Hand `record` to `log` without waiting for it.
pub fn dispatch(log: &Arc<dyn ExecutionLog>, record: ExecutionRecord) {
    let log = Arc::clone(log);
    tokio::spawn(async move {
        log.record(record).await;
    });
}
