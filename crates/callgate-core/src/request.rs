//! The `ToolCallRequest` resource
//!
//! A tool call names a tool, the task run that issued it, and a JSON argument
//! bundle. The `spec` half is immutable once created; the status is owned by the
//! controller and the approval callback and only moves forward through
//! [`ToolCallStatus::advance`].

use crate::identifiers::{LocalObjectRef, ObjectKey, ObjectMeta};
use crate::phase::{InvalidTransition, Phase, PhaseEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One deferred tool invocation issued by an agentic task run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub metadata: ObjectMeta,
    pub spec: ToolCallSpec,
    #[serde(default)]
    pub status: ToolCallStatus,
}

impl ToolCallRequest {
    pub fn new(metadata: ObjectMeta, spec: ToolCallSpec) -> Self {
        Self {
            metadata,
            spec,
            status: ToolCallStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// Name used to correlate approval callbacks (`runID`)
    pub fn run_id(&self) -> &str {
        &self.metadata.name
    }
}

/// Immutable description of what to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallSpec {
    pub tool_ref: LocalObjectRef,
    #[serde(default)]
    pub task_run_ref: LocalObjectRef,
    /// JSON-encoded argument object, kept opaque until dispatch
    #[serde(default)]
    pub arguments: String,
}

impl ToolCallSpec {
    pub fn new(
        tool: impl Into<String>,
        task_run: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            tool_ref: LocalObjectRef::new(tool),
            task_run_ref: LocalObjectRef::new(task_run),
            arguments: arguments.into(),
        }
    }
}

/// Short, user-facing summary of where a tool call stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusText {
    Pending,
    AwaitingHumanApproval,
    Ready,
    Succeeded,
    Error,
}

impl StatusText {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusText::Pending => "Pending",
            StatusText::AwaitingHumanApproval => "AwaitingHumanApproval",
            StatusText::Ready => "Ready",
            StatusText::Succeeded => "Succeeded",
            StatusText::Error => "Error",
        }
    }
}

impl fmt::Display for StatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted continuity token for the logical trace span of one tool call
///
/// Holds the W3C trace and span ids as lowercase hex. It carries no handle to
/// a live span; the observability layer rebuilds a remote span context from it
/// whenever a later invocation needs to attach work to the same trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
        }
    }

    /// 32 hex digits of trace id and 16 of span id, neither all zeros
    pub fn is_well_formed(&self) -> bool {
        fn hex_id(value: &str, len: usize) -> bool {
            value.len() == len
                && value.chars().all(|c| c.is_ascii_hexdigit())
                && value.chars().any(|c| c != '0')
        }
        hex_id(&self.trace_id, 32) && hex_id(&self.span_id, 16)
    }
}

/// Mutable, forward-only status of a tool call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<StatusText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_context: Option<TraceContext>,
}

impl ToolCallStatus {
    /// Move the phase forward by `event`, stamping lifecycle timestamps
    ///
    /// `start_time` is set on initialization and `completion_time` on the
    /// first terminal move. Illegal moves leave the status unchanged.
    pub fn advance(
        &mut self,
        event: PhaseEvent,
        now: DateTime<Utc>,
    ) -> Result<Phase, InvalidTransition> {
        let next = self.phase.transition(event)?;
        self.phase = next;
        if next == Phase::Pending && self.start_time.is_none() {
            self.start_time = Some(now);
        }
        if next.is_terminal() {
            self.completion_time = Some(now);
        }
        Ok(next)
    }

    /// Record the trace token; a token that is already set is never replaced
    pub fn set_trace_context(&mut self, trace: TraceContext) -> bool {
        if self.trace_context.is_some() {
            return false;
        }
        self.trace_context = Some(trace);
        true
    }
}
