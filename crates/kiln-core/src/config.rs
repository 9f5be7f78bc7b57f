//! Sandbox configuration types.

use crate::error::SandboxError;
use std::path::PathBuf;
use std::time::Duration;

/// Default wall-clock limit for every spawned toolchain process.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum captured size per output stream in bytes (1 MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Maximum size for submitted source code in bytes (10 MB).
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for the execution sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Directory under which every per-request workspace is created.
    pub scratch_root: PathBuf,
    /// Wall-clock limit applied to each compile and run step (default: 10s).
    pub step_timeout: Duration,
    /// How long to wait for a killed process to be reaped (default: 2s).
    pub teardown_grace: Duration,
    /// How long a request may wait for a free execution slot (default: 30s).
    pub queue_timeout: Duration,
    /// Maximum number of pipelines running at once (default: 8).
    pub max_concurrent: usize,
    /// Per-stream capture limit (default: 1 MB).
    pub max_output_bytes: usize,
    /// Maximum accepted source size (default: 10 MB).
    pub max_source_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("kiln"),
            step_timeout: DEFAULT_STEP_TIMEOUT,
            teardown_grace: Duration::from_secs(2),
            queue_timeout: Duration::from_secs(30),
            max_concurrent: 8,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl SandboxConfig {
    /// Create a new config builder.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.scratch_root.as_os_str().is_empty() {
            return Err(SandboxError::Config("scratch_root is required".into()));
        }
        if self.step_timeout.is_zero() {
            return Err(SandboxError::Config("step_timeout must be > 0".into()));
        }
        if self.max_concurrent == 0 {
            return Err(SandboxError::Config("max_concurrent must be > 0".into()));
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::Config("max_output_bytes must be > 0".into()));
        }
        if self.max_source_bytes == 0 {
            return Err(SandboxError::Config("max_source_bytes must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for SandboxConfig.
#[derive(Debug, Default)]
pub struct SandboxConfigBuilder {
    config: SandboxConfig,
}

impl SandboxConfigBuilder {
    /// Set the scratch root directory.
    pub fn scratch_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = path.into();
        self
    }

    /// Set the per-step timeout.
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.config.step_timeout = timeout;
        self
    }

    /// Set the grace period for reaping killed processes.
    pub fn teardown_grace(mut self, grace: Duration) -> Self {
        self.config.teardown_grace = grace;
        self
    }

    /// Set the maximum wait for an execution slot.
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue_timeout = timeout;
        self
    }

    /// Set the concurrency ceiling.
    pub fn max_concurrent(mut self, count: usize) -> Self {
        self.config.max_concurrent = count;
        self
    }

    /// Set the per-stream capture limit.
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.config.max_output_bytes = bytes;
        self
    }

    /// Set the maximum accepted source size.
    pub fn max_source_bytes(mut self, bytes: usize) -> Self {
        self.config.max_source_bytes = bytes;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<SandboxConfig, SandboxError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.step_timeout, Duration::from_secs(10));
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.max_output_bytes, 1024 * 1024);
        assert!(config.scratch_root.ends_with("kiln"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let result = SandboxConfig::builder().max_concurrent(0).build();
        assert!(matches!(result, Err(SandboxError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let result = SandboxConfig::builder()
            .step_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_success() {
        let config = SandboxConfig::builder()
            .scratch_root("/tmp/kiln-test")
            .step_timeout(Duration::from_secs(3))
            .max_concurrent(2)
            .max_output_bytes(4096)
            .build()
            .expect("should build successfully");

        assert_eq!(config.scratch_root, PathBuf::from("/tmp/kiln-test"));
        assert_eq!(config.step_timeout, Duration::from_secs(3));
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.max_output_bytes, 4096);
    }
}
