//! Build/run pipeline - the entry point for executing untrusted code.

use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::language::{InvocationStep, LanguageProfile, LanguageRegistry};
use crate::pool::{ExecutionPool, ExecutionStats};
use crate::process::{Invocation, ProcessLimits, ProcessOutput, ProcessRunner, SystemRunner};
use crate::result::ExecutionResult;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One request to compile (if needed) and run a piece of source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code, untrusted.
    pub code: String,
    /// Language identifier, resolved case-insensitively.
    pub language: String,
}

impl ExecutionRequest {
    /// Create a request.
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
        }
    }
}

/// Multi-language execution sandbox.
///
/// Cheap to clone; clones share the registry, the runner and the execution
/// slots. Requests share nothing else: each gets its own workspace and its
/// own timeout clock.
#[derive(Clone)]
pub struct Sandbox {
    inner: Arc<Inner>,
}

struct Inner {
    config: SandboxConfig,
    registry: Arc<LanguageRegistry>,
    runner: Arc<dyn ProcessRunner>,
    pool: ExecutionPool,
}

impl Sandbox {
    /// Create a sandbox with the built-in languages.
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        Self::with_registry(config, Arc::new(LanguageRegistry::builtin()))
    }

    /// Create a sandbox with a custom language registry.
    pub fn with_registry(
        config: SandboxConfig,
        registry: Arc<LanguageRegistry>,
    ) -> Result<Self, SandboxError> {
        Self::with_runner(config, registry, Arc::new(SystemRunner))
    }

    /// Create a sandbox with a custom registry and process runner.
    pub fn with_runner(
        config: SandboxConfig,
        registry: Arc<LanguageRegistry>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self, SandboxError> {
        config.validate()?;
        tracing::info!(
            scratch_root = %config.scratch_root.display(),
            step_timeout_ms = config.step_timeout.as_millis() as u64,
            max_concurrent = config.max_concurrent,
            languages = registry.len(),
            "Creating sandbox"
        );
        let pool = ExecutionPool::new(config.max_concurrent, config.queue_timeout);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry,
                runner,
                pool,
            }),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    /// Get the language registry.
    pub fn registry(&self) -> &LanguageRegistry {
        &self.inner.registry
    }

    /// Get the execution counters.
    pub fn stats(&self) -> &ExecutionStats {
        self.inner.pool.stats()
    }

    /// Get the execution slot pool.
    pub fn pool(&self) -> &ExecutionPool {
        &self.inner.pool
    }

    /// Compile (if needed) and run `request`.
    ///
    /// Never fails: every error, including a panic inside the pipeline, is
    /// folded into an `InternalError` result. The request's workspace is
    /// gone by the time this returns.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let inner = Arc::clone(&self.inner);
        let language = request.language.clone();
        let result = match tokio::spawn(async move { inner.run(request).await }).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(language = %language, error = %e, "Execution task failed");
                SandboxError::Task(e.to_string()).into()
            }
        };
        self.inner.pool.stats().record(result.outcome);
        tracing::info!(
            language = %language,
            outcome = %result.outcome,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            "Execution finished"
        );
        result
    }
}

impl Inner {
    async fn run(&self, request: ExecutionRequest) -> ExecutionResult {
        // Rejections below happen before any resource is allocated.
        let profile = match self.registry.resolve(&request.language) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::debug!(language = %request.language, error = %e, "Language rejected");
                return e.into();
            }
        };
        if request.code.len() > self.config.max_source_bytes {
            return SandboxError::SourceTooLarge {
                size: request.code.len(),
                max: self.config.max_source_bytes,
            }
            .into();
        }

        let _permit = match self.pool.acquire().await {
            Ok(permit) => permit,
            Err(e) => return e.into(),
        };

        let workspace = match Workspace::acquire(&self.config.scratch_root).await {
            Ok(ws) => ws,
            Err(e) => return e.into(),
        };
        tracing::debug!(
            workspace_id = %workspace.id(),
            language = %profile.id,
            code_len = request.code.len(),
            "Executing code"
        );

        let result = self.build_and_run(&workspace, profile, &request.code).await;

        if let Err(e) = workspace.release().await {
            tracing::warn!(error = %e, "Workspace release failed");
        }
        result
    }

    async fn build_and_run(
        &self,
        workspace: &Workspace,
        profile: &LanguageProfile,
        code: &str,
    ) -> ExecutionResult {
        if let Err(e) = workspace.write_source(profile, code).await {
            return e.into();
        }

        let limits = ProcessLimits {
            timeout: self.config.step_timeout,
            teardown_grace: self.config.teardown_grace,
            max_output_bytes: self.config.max_output_bytes,
        };
        let mut elapsed = Duration::ZERO;

        for step in profile.compile_steps() {
            let output = match self.invoke(workspace, profile, step, &limits).await {
                Ok(output) => output,
                Err(e) => return e.into(),
            };
            elapsed += output.duration;
            if output.timed_out {
                return ExecutionResult::timed_out(limits.timeout, elapsed);
            }
            if !output.success() {
                tracing::debug!(
                    workspace_id = %workspace.id(),
                    exit_code = ?output.exit_code,
                    "Compilation failed"
                );
                return ExecutionResult::compile_failed(output, elapsed);
            }
        }

        let Some(run) = profile.run_step() else {
            return SandboxError::NotImplemented(profile.id.clone()).into();
        };
        let output = match self.invoke(workspace, profile, run, &limits).await {
            Ok(output) => output,
            Err(e) => return e.into(),
        };
        elapsed += output.duration;

        if output.timed_out {
            ExecutionResult::timed_out(limits.timeout, elapsed)
        } else if output.success() {
            ExecutionResult::success(output, elapsed)
        } else {
            ExecutionResult::runtime_failed(output, elapsed)
        }
    }

    async fn invoke(
        &self,
        workspace: &Workspace,
        profile: &LanguageProfile,
        step: &InvocationStep,
        limits: &ProcessLimits,
    ) -> Result<ProcessOutput, SandboxError> {
        let (program, args) = step.render(profile);
        let invocation = Invocation {
            kind: step.kind,
            program,
            args,
            workdir: workspace.path().to_path_buf(),
        };
        tracing::trace!(workspace_id = %workspace.id(), kind = %step.kind, "Invoking toolchain");
        self.runner.run(&invocation, limits).await
    }
}
