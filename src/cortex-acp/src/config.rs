//! Session configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default timeout for outbound requests in milliseconds (5 minutes).
///
/// Applies uniformly to every request of a session, including
/// `session/prompt`, so it has to cover a whole agent turn.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 300_000;

/// Default time to wait for the transport to close gracefully (30 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

/// Maximum accepted length of one inbound line (10MB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 10 * 1024 * 1024;

/// Environment variable overriding [`SessionConfig::request_timeout_ms`].
pub const ENV_REQUEST_TIMEOUT_MS: &str = "CORTEX_ACP_REQUEST_TIMEOUT_MS";
/// Environment variable overriding [`SessionConfig::shutdown_timeout_ms`].
pub const ENV_SHUTDOWN_TIMEOUT_MS: &str = "CORTEX_ACP_SHUTDOWN_TIMEOUT_MS";
/// Environment variable overriding [`SessionConfig::max_line_length`].
pub const ENV_MAX_LINE_LENGTH: &str = "CORTEX_ACP_MAX_LINE_LENGTH";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Timeout for every outbound request in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Upper bound on a graceful transport close in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Longest inbound line a stream transport will buffer.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            max_line_length: default_max_line_length(),
        }
    }
}

impl SessionConfig {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults overridden by `CORTEX_ACP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (environment, CLI maps).
    pub fn merge_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            self.request_timeout_ms = parse_value(ENV_REQUEST_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_SHUTDOWN_TIMEOUT_MS) {
            self.shutdown_timeout_ms = parse_value(ENV_SHUTDOWN_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_LINE_LENGTH) {
            self.max_line_length = parse_value(ENV_MAX_LINE_LENGTH, &value)?;
        }
        Ok(self)
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Shutdown timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the maximum inbound line length.
    pub fn with_max_line_length(mut self, max_length: usize) -> Self {
        self.max_line_length = max_length;
        self
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
