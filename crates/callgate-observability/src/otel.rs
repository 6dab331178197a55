//! OpenTelemetry Integration
//!
//! Builds the span provider used by trace continuity. Without an OTLP
//! endpoint (or without the `otlp` feature) the provider has no exporter:
//! span ids are still generated and persisted, nothing leaves the process.

use crate::{ObservabilityConfig, ObservabilityError};
use opentelemetry_sdk::trace::SdkTracerProvider;

/// OpenTelemetry configuration
#[derive(Debug, Clone)]
pub struct OtelConfig {
    /// OTLP endpoint URL; `None` disables export
    pub endpoint: Option<String>,
    /// Service name for telemetry
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Additional resource attributes
    pub resource_attributes: Vec<(String, String)>,
}

impl OtelConfig {
    pub fn new(endpoint: Option<String>, service_name: impl Into<String>) -> Self {
        Self {
            endpoint,
            service_name: service_name.into(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            resource_attributes: Vec::new(),
        }
    }

    /// Add resource attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource_attributes.push((key.into(), value.into()));
        self
    }
}

impl From<&ObservabilityConfig> for OtelConfig {
    fn from(config: &ObservabilityConfig) -> Self {
        Self::new(config.otlp_endpoint.clone(), config.service_name.clone())
    }
}

/// Build the tracer provider for `config`
#[cfg(feature = "otlp")]
pub fn build_tracer_provider(config: &OtelConfig) -> Result<SdkTracerProvider, ObservabilityError> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;

    let Some(endpoint) = config.endpoint.as_deref() else {
        return Ok(SdkTracerProvider::builder().build());
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| {
            ObservabilityError::OpenTelemetryInit(format!("Failed to create exporter: {e}"))
        })?;

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new("service.version", config.service_version.clone()))
        .with_attributes(
            config
                .resource_attributes
                .iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
        )
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    tracing::info!(
        endpoint,
        service = config.service_name,
        version = config.service_version,
        "OpenTelemetry exporter initialized"
    );

    Ok(provider)
}

#[cfg(not(feature = "otlp"))]
pub fn build_tracer_provider(config: &OtelConfig) -> Result<SdkTracerProvider, ObservabilityError> {
    if config.endpoint.is_some() {
        return Err(ObservabilityError::OpenTelemetryInit(
            "OTLP endpoint configured but the otlp feature is not enabled".to_string(),
        ));
    }
    Ok(SdkTracerProvider::builder().build())
}
