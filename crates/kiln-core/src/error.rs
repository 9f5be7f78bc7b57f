//! Error types for kiln-core.

use crate::WorkspaceId;
use thiserror::Error;

/// Result type alias for kiln-core operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors that can occur while preparing or running an execution.
///
/// None of these escape [`Sandbox::execute`](crate::Sandbox::execute); they are
/// folded into an [`ExecutionResult`](crate::ExecutionResult) tagged
/// `InternalError`.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Language identifier does not resolve in the registry
    #[error("unsupported language: {0}")]
    UnknownLanguage(String),

    /// Language is known but has no toolchain steps yet
    #[error("Language {0} execution not yet implemented")]
    NotImplemented(String),

    /// Toolchain process could not be started
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Workspace directory could not be created, written or removed
    #[error("workspace {id}: {source}")]
    Workspace {
        /// Workspace the failure belongs to
        id: WorkspaceId,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// No execution slot became free in time
    #[error("execution capacity exhausted after {0:?}")]
    CapacityExhausted(std::time::Duration),

    /// Submitted source exceeds the configured limit
    #[error("source exceeds maximum size ({size} bytes > {max} bytes)")]
    SourceTooLarge {
        /// Submitted size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Language profile violates a registry invariant
    #[error("invalid language profile {id}: {reason}")]
    InvalidProfile {
        /// Offending identifier
        id: String,
        /// What is wrong with it
        reason: String,
    },

    /// Invalid sandbox configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Registry document could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Pipeline task panicked or was cancelled
    #[error("execution task failed: {0}")]
    Task(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
