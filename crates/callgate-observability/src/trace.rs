//! Structured Tracing and Trace Continuity
//!
//! Provides log/trace subscriber setup and the trace continuity manager that
//! stitches the independent reconcile invocations of one tool call into a
//! single logical trace.
//!
//! The manager never keeps a span alive between invocations. It works purely
//! from the persisted [`TraceContext`] token:
//!
//! - **open**: start the logical root span, capture its ids, end it
//! - **child**: rebuild the root as a remote, sampled parent and start a
//!   child span for one unit of work
//! - **close**: rebuild the root and start-and-end a completion span under it,
//!   standing in for the end of a root whose start happened elsewhere
//!
//! Tracing is best effort. A missing or malformed token turns every operation
//! into a no-op instead of an error.

use crate::{LogFormat, ObservabilityConfig, ObservabilityError};
use callgate_core::{ObjectKey, Phase, TraceContext};
use opentelemetry::trace::{
    Span as _, SpanContext, SpanId, SpanKind, Status, TraceContextExt, TraceFlags, TraceId,
    TraceState, Tracer as _, TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider, Span};

/// Instrumentation scope name for all tool call spans
pub const TRACER_NAME: &str = "callgate";
/// Name of the logical root span of a tool call
pub const ROOT_SPAN_NAME: &str = "ToolCallRequest";
/// Name of the span that marks the end of a tool call
pub const COMPLETION_SPAN_NAME: &str = "ToolCallRequest.complete";

/// Rebuilds one logical span per tool call from its persisted token
#[derive(Clone)]
pub struct TraceContinuity {
    tracer: SdkTracer,
}

impl std::fmt::Debug for TraceContinuity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceContinuity").finish_non_exhaustive()
    }
}

impl TraceContinuity {
    pub fn new(provider: &SdkTracerProvider) -> Self {
        Self {
            tracer: provider.tracer(TRACER_NAME),
        }
    }

    /// Manager backed by a provider with no exporter
    ///
    /// Ids are still generated and persisted, so continuity survives a later
    /// switch to an exporting provider.
    pub fn local() -> Self {
        Self::new(&SdkTracerProvider::builder().build())
    }

    /// Start the logical root span for `key` and return its continuity token
    ///
    /// The span is ended before returning; only the ids outlive this call.
    pub fn open(&self, key: &ObjectKey, tool: &str) -> Option<TraceContext> {
        let mut span = self
            .tracer
            .span_builder(ROOT_SPAN_NAME)
            .with_kind(SpanKind::Internal)
            .with_attributes(vec![
                KeyValue::new("callgate.namespace", key.namespace().to_string()),
                KeyValue::new("callgate.tool_call", key.name().to_string()),
                KeyValue::new("callgate.tool", tool.to_string()),
            ])
            .start_with_context(&self.tracer, &Context::new());
        span.add_event("initialized", vec![]);
        let span_context = span.span_context().clone();
        span.end();

        if !span_context.is_valid() {
            tracing::debug!(object = %key, "Tracer produced an invalid span context, skipping");
            return None;
        }
        Some(TraceContext::new(
            span_context.trace_id().to_string(),
            span_context.span_id().to_string(),
        ))
    }

    /// Start a child span of the logical root for one unit of work
    ///
    /// The child ends when the returned guard is dropped or
    /// [`ChildSpan::end`] is called.
    pub fn child(&self, trace: Option<&TraceContext>, name: &'static str) -> ChildSpan {
        let Some(parent) = trace.and_then(remote_context) else {
            return ChildSpan { span: None };
        };
        ChildSpan {
            span: Some(self.tracer.start_with_context(name, &parent)),
        }
    }

    /// Emit the completion span of the logical root for a terminal `phase`
    pub fn close(&self, trace: Option<&TraceContext>, phase: Phase, detail: Option<&str>) {
        let Some(parent) = trace.and_then(remote_context) else {
            tracing::debug!(%phase, "No usable trace context, skipping trace close");
            return;
        };
        let mut span = self.tracer.start_with_context(COMPLETION_SPAN_NAME, &parent);
        span.set_attribute(KeyValue::new("callgate.phase", phase.as_str()));
        if let Some(detail) = detail {
            span.set_attribute(KeyValue::new("callgate.status_detail", detail.to_string()));
        }
        match phase {
            Phase::Failed => span.set_status(Status::error(detail.unwrap_or("failed").to_string())),
            _ => span.set_status(Status::Ok),
        }
        span.end();
    }
}

/// Guard for a child span of a tool call's logical root
///
/// Inert when the tool call carried no usable trace token.
pub struct ChildSpan {
    span: Option<Span>,
}

impl ChildSpan {
    pub fn is_recording(&self) -> bool {
        self.span.as_ref().is_some_and(|span| span.is_recording())
    }

    pub fn set_attribute(&mut self, key: &'static str, value: impl Into<opentelemetry::Value>) {
        if let Some(span) = self.span.as_mut() {
            span.set_attribute(KeyValue::new(key, value));
        }
    }

    pub fn record_error(&mut self, message: &str) {
        if let Some(span) = self.span.as_mut() {
            span.set_status(Status::error(message.to_string()));
        }
    }

    pub fn end(mut self) {
        if let Some(mut span) = self.span.take() {
            span.end();
        }
    }
}

/// Rebuild the persisted root span as a remote, sampled parent context
fn remote_context(trace: &TraceContext) -> Option<Context> {
    if !trace.is_well_formed() {
        return None;
    }
    let trace_id = TraceId::from_hex(&trace.trace_id).ok()?;
    let span_id = SpanId::from_hex(&trace.span_id).ok()?;
    let span_context = SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    );
    span_context
        .is_valid()
        .then(|| Context::new().with_remote_span_context(span_context))
}

/// Install the global `tracing` subscriber and build the span provider
///
/// Log lines go to stdout as JSON or pretty text, filtered by `RUST_LOG`
/// (falling back to `config.default_filter`). With the `otlp` feature and an
/// endpoint configured, spans are batched to the OTLP collector and `tracing`
/// spans are bridged into the same provider.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<SdkTracerProvider, ObservabilityError> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| ObservabilityError::Config(format!("invalid log filter: {e}")))?;

    let json = config.log_format == LogFormat::Json;
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json());
    let pretty_layer = (!json).then(|| tracing_subscriber::fmt::layer().pretty());

    let tracer_provider = crate::otel::build_tracer_provider(&crate::OtelConfig::from(config))?;

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer);

    #[cfg(feature = "otlp")]
    let registry = registry.with(config.otlp_endpoint.as_ref().map(|_| {
        tracing_opentelemetry::OpenTelemetryLayer::new(tracer_provider.tracer(TRACER_NAME))
    }));

    registry
        .try_init()
        .map_err(|e| ObservabilityError::TracingInit(e.to_string()))?;

    tracing::info!(
        service = config.service_name,
        format = ?config.log_format,
        otlp = config.otlp_endpoint.is_some(),
        "Initialized structured tracing"
    );

    Ok(tracer_provider)
}
