//! # kiln-core
//!
//! Multi-language execution sandbox for untrusted code snippets.
//!
//! This crate accepts source code plus a language identifier, compiles it
//! when the language needs a separate build step, runs it under a hard
//! wall-clock limit, and reports a structured result. Every request gets its
//! own scratch workspace that is removed on every outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Sandbox                          │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │ LanguageRegistry│     │  ExecutionPool           │   │
//! │  │   - resolve()   │     │  (max_concurrent slots)  │   │
//! │  └─────────────────┘     └──────────────────────────┘   │
//! │           │                          │                   │
//! │           ▼                          ▼                   │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │   Workspace     │────▶│  ProcessRunner           │   │
//! │  │  - write_source │     │  compile steps, run step │   │
//! │  │  - release()    │     │  (process group, limit)  │   │
//! │  └─────────────────┘     └──────────────────────────┘   │
//! │                                      │                   │
//! │                                      ▼                   │
//! │                          ┌──────────────────────────┐   │
//! │                          │  ExecutionResult         │   │
//! │                          │  output, error, outcome  │   │
//! │                          └──────────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use kiln_core::{ExecutionRequest, Outcome, Sandbox, SandboxConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> kiln_core::Result<()> {
//! let config = SandboxConfig::builder()
//!     .scratch_root("/tmp/kiln")
//!     .step_timeout(Duration::from_secs(10))
//!     .max_concurrent(8)
//!     .build()?;
//! let sandbox = Sandbox::new(config)?;
//!
//! let result = sandbox
//!     .execute(ExecutionRequest::new("python", "print('Hello, World!')"))
//!     .await;
//! assert_eq!(result.outcome, Outcome::Success);
//! println!("Output: {}", result.output);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Language Registry**: 20 built-in toolchains, extendable from TOML
//! - **Isolated Workspaces**: one fresh directory per request, always removed
//! - **Hard Time Limits**: timed-out process groups are killed and reaped
//! - **Bounded Concurrency**: a fixed number of pipelines run at once

mod config;
mod error;
mod language;
mod pipeline;
mod pool;
mod process;
mod result;
mod workspace;

pub use config::{
    SandboxConfig, SandboxConfigBuilder, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_SOURCE_BYTES,
    DEFAULT_STEP_TIMEOUT,
};
pub use error::{Result, SandboxError};
pub use language::{
    InvocationStep, LanguageProfile, LanguageRegistry, StepKind, ARTIFACT_NAME,
    DEFAULT_SOURCE_STEM,
};
pub use pipeline::{ExecutionRequest, Sandbox};
pub use pool::{ExecutionPermit, ExecutionPool, ExecutionStats, StatsSnapshot};
pub use process::{
    Invocation, ProcessLimits, ProcessOutput, ProcessRunner, SystemRunner, TRUNCATION_MARKER,
};
pub use result::{ExecutionResult, Outcome};
pub use workspace::{Workspace, WorkspaceId, WORKSPACE_PREFIX};
