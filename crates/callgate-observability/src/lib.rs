//! Callgate Observability Framework
//!
//! Provides structured logging, logical trace continuity for tool calls and
//! reconcile metrics for the Callgate controller.
//!
//! A tool call is driven by many short, unrelated reconcile invocations. The
//! [`TraceContinuity`] manager lets all of them contribute to one logical
//! trace by persisting only a `{traceID, spanID}` token in the tool call
//! status and rebuilding remote span contexts from it on demand.

#[cfg(feature = "metrics")]
pub mod metrics;

pub mod otel;
pub mod trace;

#[cfg(feature = "metrics")]
pub use metrics::{MetricsError, ReconcileMetrics};

pub use otel::OtelConfig;
pub use trace::{ChildSpan, TraceContinuity, init_tracing};

use std::str::FromStr;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ObservabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(ObservabilityError::Config(format!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            ))),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name reported on traces
    pub service_name: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset
    pub default_filter: String,
    /// OTLP endpoint; spans are only exported when set and the `otlp` feature is on
    pub otlp_endpoint: Option<String>,
    /// Metrics namespace prefix
    pub metrics_namespace: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "callgate".to_string(),
            log_format: LogFormat::Json,
            default_filter: "info".to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            metrics_namespace: "callgate".to_string(),
        }
    }
}

/// Handles produced by [`init_observability`]
pub struct Telemetry {
    tracer_provider: opentelemetry_sdk::trace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    metrics: std::sync::Arc<ReconcileMetrics>,
}

impl Telemetry {
    /// Trace continuity manager bound to this process's tracer provider
    pub fn trace_continuity(&self) -> TraceContinuity {
        TraceContinuity::new(&self.tracer_provider)
    }

    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> std::sync::Arc<ReconcileMetrics> {
        self.metrics.clone()
    }

    /// Flush and stop span export
    pub fn shutdown(&self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            tracing::warn!(error = %e, "Tracer provider shutdown reported an error");
        }
    }
}

/// Initialize logging, tracing and metrics for the process
pub fn init_observability(config: &ObservabilityConfig) -> Result<Telemetry, ObservabilityError> {
    let tracer_provider = init_tracing(config)?;

    Ok(Telemetry {
        tracer_provider,
        #[cfg(feature = "metrics")]
        metrics: std::sync::Arc::new(ReconcileMetrics::new(&config.metrics_namespace)?),
    })
}

/// Observability framework errors
#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("OpenTelemetry setup failed: {0}")]
    OpenTelemetryInit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "metrics")]
    #[error("Metrics error: {0}")]
    Metrics(#[from] metrics::MetricsError),
}
