//! Configuration for the HTTP server.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use kiln_core::{LanguageRegistry, SandboxConfig, SandboxError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum accepted request body in bytes (10 MB of source plus envelope).
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024 + 64 * 1024;

/// Configuration for the kiln server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server bind address.
    pub http_addr: SocketAddr,

    /// Directory under which per-request workspaces are created.
    pub scratch_root: PathBuf,

    /// Wall-clock limit for each compile and run step (default: 10s).
    pub step_timeout: Duration,

    /// Maximum concurrently running pipelines (default: 8).
    pub max_concurrent: usize,

    /// Per-stream output capture limit (default: 1 MB).
    pub max_output_bytes: usize,

    /// Request body limit (default: [`MAX_BODY_BYTES`]).
    pub max_body_bytes: usize,

    /// Optional TOML file extending the built-in language table.
    pub languages_file: Option<PathBuf>,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    #[error("max concurrent executions must be greater than zero")]
    InvalidConcurrency,

    #[error("output limit must be greater than zero")]
    InvalidOutputLimit,

    #[error("languages file not found: {0}")]
    MissingLanguagesFile(PathBuf),

    #[error("scratch root parent directory not found: {0}")]
    InvalidScratchRoot(PathBuf),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl Default for ServerConfig {
    fn default() -> Self {
        let sandbox = SandboxConfig::default();
        Self {
            http_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 8080),
            scratch_root: sandbox.scratch_root,
            step_timeout: sandbox.step_timeout,
            max_concurrent: sandbox.max_concurrent,
            max_output_bytes: sandbox.max_output_bytes,
            max_body_bytes: MAX_BODY_BYTES,
            languages_file: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `KILN_HTTP_HOST` | `0.0.0.0` |
    /// | `KILN_HTTP_PORT` | `8080` |
    /// | `KILN_SCRATCH_ROOT` | `$TMPDIR/kiln` |
    /// | `KILN_TIMEOUT_SECS` | `10` |
    /// | `KILN_MAX_CONCURRENT` | `8` |
    /// | `KILN_MAX_OUTPUT_BYTES` | `1048576` |
    /// | `KILN_MAX_BODY_BYTES` | `10551296` |
    /// | `KILN_LANGUAGES_FILE` | unset |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let http_host: IpAddr = parse(&lookup, "KILN_HTTP_HOST").unwrap_or(default.http_addr.ip());
        let http_port: u16 = parse(&lookup, "KILN_HTTP_PORT").unwrap_or(default.http_addr.port());

        Self {
            http_addr: SocketAddr::new(http_host, http_port),
            scratch_root: lookup("KILN_SCRATCH_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.scratch_root),
            step_timeout: parse(&lookup, "KILN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.step_timeout),
            max_concurrent: parse(&lookup, "KILN_MAX_CONCURRENT")
                .unwrap_or(default.max_concurrent),
            max_output_bytes: parse(&lookup, "KILN_MAX_OUTPUT_BYTES")
                .unwrap_or(default.max_output_bytes),
            max_body_bytes: parse(&lookup, "KILN_MAX_BODY_BYTES")
                .unwrap_or(default.max_body_bytes),
            languages_file: lookup("KILN_LANGUAGES_FILE").map(PathBuf::from),
        }
    }

    /// Validate the configuration.
    ///
    /// Call this at startup to get clear error messages.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.max_output_bytes == 0 {
            return Err(ConfigError::InvalidOutputLimit);
        }
        if let Some(file) = &self.languages_file {
            if !file.is_file() {
                return Err(ConfigError::MissingLanguagesFile(file.clone()));
            }
        }
        // The scratch root itself is created on demand.
        if let Some(parent) = self.scratch_root.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidScratchRoot(self.scratch_root.clone()));
            }
        }
        Ok(())
    }

    /// Sandbox settings derived from this configuration.
    pub fn sandbox_config(&self) -> Result<SandboxConfig, ConfigError> {
        let config = SandboxConfig::builder()
            .scratch_root(&self.scratch_root)
            .step_timeout(self.step_timeout)
            .max_concurrent(self.max_concurrent)
            .max_output_bytes(self.max_output_bytes)
            .max_source_bytes(self.max_body_bytes)
            .build()?;
        Ok(config)
    }

    /// Built-in languages, extended by `languages_file` when set.
    pub fn load_registry(&self) -> Result<LanguageRegistry, ConfigError> {
        let registry = match &self.languages_file {
            Some(file) => {
                tracing::info!(path = %file.display(), "Loading language overrides");
                LanguageRegistry::load(file)?
            }
            None => LanguageRegistry::builtin(),
        };
        Ok(registry)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid environment value");
            None
        }
    }
}
