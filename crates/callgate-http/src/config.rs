//! # Environment-Based Configuration
//!
//! Runtime settings for the `callgate serve` process, loaded from environment
//! variables with builder-style overrides.
//!
//! ## Environment Variables
//!
//! ### HTTP
//! - `CALLGATE_BIND_ADDR` - Listen address (default: 0.0.0.0:8082)
//! - `CALLGATE_CALLBACK_NAMESPACE` - Namespace in which callback `runID`s are resolved (default: "default")
//! - `CALLGATE_MAX_BODY_SIZE` - Maximum request body size in bytes (default: 1048576 / 1MB)
//! - `CALLGATE_REQUEST_TIMEOUT_SECS` - Request timeout in seconds (default: 30)
//!
//! ### Controller
//! - `CALLGATE_WORKERS` - Worker pool size (default: 4)
//! - `CALLGATE_REMOTE_CALL_TIMEOUT_SECS` - Bound on one remote tool call (default: 60)
//! - `CALLGATE_BACKOFF_BASE_MS` - First requeue delay after a failed pass (default: 500)
//! - `CALLGATE_BACKOFF_MAX_SECS` - Requeue delay cap (default: 300)
//!
//! ### Observability
//! - `CALLGATE_LOG_FORMAT` - `json` or `pretty` (default: json)
//! - `CALLGATE_OTLP_ENDPOINT` - OTLP endpoint for spans (default: unset)

use callgate_controller::ControllerConfig;
use callgate_observability::{LogFormat, ObservabilityConfig};
use std::{env, net::SocketAddr, time::Duration};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8082";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: SocketAddr,
    pub callback_namespace: String,
    pub max_body_size: usize,
    pub request_timeout: Duration,
    pub workers: usize,
    pub remote_call_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub log_format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl RuntimeConfig {
    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max,
        }
    }

    pub fn observability(&self) -> ObservabilityConfig {
        ObservabilityConfig {
            log_format: self.log_format,
            otlp_endpoint: self.otlp_endpoint.clone(),
            ..ObservabilityConfig::default()
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfigBuilder::default().into_config()
    }
}

/// Builder for [`RuntimeConfig`] with environment variable support
#[derive(Debug, Clone)]
pub struct RuntimeConfigBuilder {
    bind_addr: SocketAddr,
    callback_namespace: String,
    max_body_size: usize,
    request_timeout_secs: u64,
    workers: usize,
    remote_call_timeout_secs: u64,
    backoff_base_ms: u64,
    backoff_max_secs: u64,
    log_format: LogFormat,
    otlp_endpoint: Option<String>,
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8082)),
            callback_namespace: "default".to_string(),
            max_body_size: 1024 * 1024, // 1MB
            request_timeout_secs: 30,
            workers: 4,
            remote_call_timeout_secs: 60,
            backoff_base_ms: 500,
            backoff_max_secs: 300,
            log_format: LogFormat::Json,
            otlp_endpoint: None,
        }
    }
}

impl RuntimeConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if any variable has a value that
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(addr) = get_env_string("CALLGATE_BIND_ADDR") {
            let parsed = addr.parse().map_err(|e| ConfigError::InvalidEnvVar {
                key: "CALLGATE_BIND_ADDR".to_string(),
                message: format!("invalid socket address '{addr}': {e}"),
            })?;
            builder = builder.bind_addr(parsed);
        }
        if let Some(namespace) = get_env_string("CALLGATE_CALLBACK_NAMESPACE") {
            builder = builder.callback_namespace(namespace);
        }
        if let Some(size) = get_env_usize("CALLGATE_MAX_BODY_SIZE")? {
            builder = builder.max_body_size(size);
        }
        if let Some(timeout) = get_env_u64("CALLGATE_REQUEST_TIMEOUT_SECS")? {
            builder = builder.request_timeout_secs(timeout);
        }

        if let Some(workers) = get_env_usize("CALLGATE_WORKERS")? {
            builder = builder.workers(workers);
        }
        if let Some(timeout) = get_env_u64("CALLGATE_REMOTE_CALL_TIMEOUT_SECS")? {
            builder = builder.remote_call_timeout_secs(timeout);
        }
        if let Some(base) = get_env_u64("CALLGATE_BACKOFF_BASE_MS")? {
            builder = builder.backoff_base_ms(base);
        }
        if let Some(max) = get_env_u64("CALLGATE_BACKOFF_MAX_SECS")? {
            builder = builder.backoff_max_secs(max);
        }

        if let Some(format) = get_env_string("CALLGATE_LOG_FORMAT") {
            let parsed = format.parse().map_err(|e| ConfigError::InvalidEnvVar {
                key: "CALLGATE_LOG_FORMAT".to_string(),
                message: format!("{e}"),
            })?;
            builder = builder.log_format(parsed);
        }
        if let Some(endpoint) = get_env_string("CALLGATE_OTLP_ENDPOINT") {
            builder = builder.otlp_endpoint(endpoint);
        }

        Ok(builder)
    }

    #[must_use]
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    #[must_use]
    pub fn callback_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.callback_namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, timeout: u64) -> Self {
        self.request_timeout_secs = timeout;
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn remote_call_timeout_secs(mut self, timeout: u64) -> Self {
        self.remote_call_timeout_secs = timeout;
        self
    }

    #[must_use]
    pub fn backoff_base_ms(mut self, base: u64) -> Self {
        self.backoff_base_ms = base;
        self
    }

    #[must_use]
    pub fn backoff_max_secs(mut self, max: u64) -> Self {
        self.backoff_max_secs = max;
        self
    }

    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    #[must_use]
    pub fn otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.otlp_endpoint = (!endpoint.trim().is_empty()).then_some(endpoint);
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is invalid.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        self.validate()?;
        Ok(self.into_config())
    }

    fn into_config(self) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: self.bind_addr,
            callback_namespace: self.callback_namespace,
            max_body_size: self.max_body_size,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            workers: self.workers,
            remote_call_timeout: Duration::from_secs(self.remote_call_timeout_secs),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
            log_format: self.log_format,
            otlp_endpoint: self.otlp_endpoint,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.callback_namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "callback_namespace must not be empty".to_string(),
            ));
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_body_size must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(ConfigError::ValidationError(
                "workers must be greater than 0".to_string(),
            ));
        }
        if self.remote_call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "remote_call_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.backoff_base_ms == 0 {
            return Err(ConfigError::ValidationError(
                "backoff_base_ms must be greater than 0".to_string(),
            ));
        }
        if Duration::from_secs(self.backoff_max_secs) < Duration::from_millis(self.backoff_base_ms)
        {
            return Err(ConfigError::ValidationError(
                "backoff_max_secs must not be shorter than backoff_base_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid usize value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}
