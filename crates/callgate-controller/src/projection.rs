//! Status and event projection
//!
//! Every phase-advancing step of the coordinator and the callback service is
//! expressed as an [`Outcome`]. This module is the one place that maps an
//! outcome onto the persisted status fields and onto the notification event
//! users see, and [`StatusProjector`] is the one place that commits it.

use crate::error::ReconcileError;
use callgate_core::{
    EventRecorder, EventType, InvalidTransition, Phase, PhaseEvent, ResourceStore, StatusText,
    ToolCallRequest, ToolCallStatus, TraceContext,
};
use callgate_observability::TraceContinuity;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Event reasons
pub mod reason {
    pub const AWAITING_APPROVAL: &str = "AwaitingHumanApproval";
    pub const EXECUTION_SUCCEEDED: &str = "ExecutionSucceeded";
    pub const EXECUTION_FAILED: &str = "ExecutionFailed";
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    pub const INVALID_ARGUMENTS: &str = "InvalidArguments";
    pub const APPROVAL_GRANTED: &str = "ApprovalGranted";
    pub const APPROVAL_REJECTED: &str = "ApprovalRejected";
}

/// `statusDetail` values of terminal and suspended states
pub mod detail {
    pub const INITIALIZED: &str = "initialized";
    pub const INVALID_ARGUMENTS: &str = "invalid arguments";
    pub const TOOL_NOT_FOUND: &str = "tool definition not found";
    pub const UNKNOWN_TOOL_TYPE: &str = "unknown tool type";
    pub const DELEGATION_NOT_SUPPORTED: &str = "delegation not supported";
    pub const UNKNOWN_BUILTIN: &str = "unknown builtin function";
    pub const DIVISION_BY_ZERO: &str = "division by zero";
    pub const REMOTE_CALL_FAILED: &str = "remote tool call failed";
    pub const CREDENTIALS_NOT_FOUND: &str = "credentials not found";
    pub const EMPTY_CREDENTIALS: &str = "empty credentials";
    pub const EXTERNAL_API_NOT_CONFIGURED: &str = "external API not configured";
    pub const EXECUTION_APPROVED: &str = "execution approved";
    pub const EXECUTION_REJECTED: &str = "execution rejected";
}

/// `result` written by an approval decision
pub const RESULT_APPROVED: &str = "Approved";
/// `result` written by a denial
pub const RESULT_REJECTED: &str = "Rejected";
/// `error` written by a denial that carried no comment
pub const DEFAULT_REJECTION: &str = "rejected by approver";

/// What a single phase-advancing step decided
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// First pass: trace opened, request now Pending
    Initialized { trace: Option<TraceContext> },
    /// Suspended until a human decision arrives on `channel`
    AwaitingApproval { channel: String },
    /// Dispatch finished successfully
    Succeeded {
        result: Option<String>,
        detail: String,
    },
    /// Dispatch or validation ended the request
    Failed {
        reason: &'static str,
        detail: String,
        error: String,
    },
    /// A human approved the suspended request
    Approved { comment: Option<String> },
    /// A human rejected the suspended request
    Rejected { comment: Option<String> },
}

/// User-visible notification derived from an [`Outcome`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event_type: EventType,
    pub reason: &'static str,
    pub message: String,
}

impl Outcome {
    /// Execution failure (executor reported an error or a business rule failed)
    pub fn failed(detail: impl Into<String>, error: impl Into<String>) -> Self {
        Outcome::Failed {
            reason: reason::EXECUTION_FAILED,
            detail: detail.into(),
            error: error.into(),
        }
    }

    /// Validation failure (definition, credentials or configuration invalid)
    pub fn invalid(detail: impl Into<String>, error: impl Into<String>) -> Self {
        Outcome::Failed {
            reason: reason::VALIDATION_FAILED,
            detail: detail.into(),
            error: error.into(),
        }
    }

    pub fn succeeded(result: Option<String>, detail: impl Into<String>) -> Self {
        Outcome::Succeeded {
            result,
            detail: detail.into(),
        }
    }

    pub fn phase_event(&self) -> PhaseEvent {
        match self {
            Outcome::Initialized { .. } => PhaseEvent::Initialize,
            Outcome::AwaitingApproval { .. } => PhaseEvent::RequireApproval,
            Outcome::Succeeded { .. } => PhaseEvent::Succeed,
            Outcome::Failed { .. } => PhaseEvent::Fail,
            Outcome::Approved { .. } => PhaseEvent::Approve,
            Outcome::Rejected { .. } => PhaseEvent::Reject,
        }
    }

    /// Metrics label
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Initialized { .. } => "initialized",
            Outcome::AwaitingApproval { .. } => "awaiting_approval",
            Outcome::Succeeded { .. } => "succeeded",
            Outcome::Failed { .. } => "failed",
            Outcome::Approved { .. } => "approved",
            Outcome::Rejected { .. } => "rejected",
        }
    }

    /// Write this outcome into `status`.
    ///
    /// The phase move goes through the transition table first; an illegal
    /// move leaves `status` untouched.
    pub fn project(
        &self,
        status: &mut ToolCallStatus,
        now: DateTime<Utc>,
    ) -> Result<Phase, InvalidTransition> {
        let phase = status.advance(self.phase_event(), now)?;

        match self {
            Outcome::Initialized { trace } => {
                if let Some(trace) = trace {
                    status.set_trace_context(trace.clone());
                }
                status.status_text = Some(StatusText::Pending);
                status.status_detail = Some(detail::INITIALIZED.to_string());
            }
            Outcome::AwaitingApproval { channel } => {
                status.status_text = Some(StatusText::AwaitingHumanApproval);
                status.status_detail = Some(format!(
                    "waiting for human approval via contact channel {channel}"
                ));
            }
            Outcome::Succeeded { result, detail } => {
                status.status_text = Some(StatusText::Succeeded);
                status.status_detail = Some(detail.clone());
                status.result = result.clone();
                status.error = None;
            }
            Outcome::Failed { detail, error, .. } => {
                status.status_text = Some(StatusText::Error);
                status.status_detail = Some(detail.clone());
                status.error = Some(error.clone());
                status.result = None;
            }
            Outcome::Approved { comment } => {
                status.status_text = Some(StatusText::Ready);
                status.status_detail = Some(match comment {
                    Some(comment) => format!("{}: {comment}", detail::EXECUTION_APPROVED),
                    None => detail::EXECUTION_APPROVED.to_string(),
                });
                status.result = Some(RESULT_APPROVED.to_string());
                status.error = None;
            }
            Outcome::Rejected { comment } => {
                status.status_text = Some(StatusText::Error);
                status.status_detail = Some(detail::EXECUTION_REJECTED.to_string());
                status.result = Some(RESULT_REJECTED.to_string());
                status.error = Some(
                    comment
                        .clone()
                        .unwrap_or_else(|| DEFAULT_REJECTION.to_string()),
                );
            }
        }

        Ok(phase)
    }

    /// The event announcing this outcome, if it warrants one
    pub fn notification(&self, tool: &str) -> Option<Notification> {
        let (event_type, reason, message) = match self {
            Outcome::Initialized { .. } => return None,
            Outcome::AwaitingApproval { channel } => (
                EventType::Normal,
                reason::AWAITING_APPROVAL,
                format!("tool {tool} requires approval via contact channel {channel}"),
            ),
            Outcome::Succeeded { detail, .. } => (
                EventType::Normal,
                reason::EXECUTION_SUCCEEDED,
                format!("tool {tool} succeeded: {detail}"),
            ),
            Outcome::Failed {
                reason,
                detail,
                error,
            } => (
                EventType::Warning,
                *reason,
                format!("tool {tool} failed: {detail}: {error}"),
            ),
            Outcome::Approved { .. } => (
                EventType::Normal,
                reason::APPROVAL_GRANTED,
                format!("tool {tool} approved by human"),
            ),
            Outcome::Rejected { comment } => (
                EventType::Warning,
                reason::APPROVAL_REJECTED,
                format!(
                    "tool {tool} rejected by human: {}",
                    comment.as_deref().unwrap_or(DEFAULT_REJECTION)
                ),
            ),
        };
        Some(Notification {
            event_type,
            reason,
            message,
        })
    }
}

/// Commits outcomes and announces them.
///
/// The event is recorded and the logical trace closed only after the commit
/// succeeds, so a conflicting write that is retried never produces a
/// duplicate notification.
#[derive(Clone)]
pub struct StatusProjector {
    store: Arc<dyn ResourceStore>,
    recorder: Arc<dyn EventRecorder>,
    trace: TraceContinuity,
}

impl StatusProjector {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        recorder: Arc<dyn EventRecorder>,
        trace: TraceContinuity,
    ) -> Self {
        Self {
            store,
            recorder,
            trace,
        }
    }

    pub fn trace(&self) -> &TraceContinuity {
        &self.trace
    }

    /// Project `outcome` onto a copy of `request` and compare-and-commit it
    pub async fn commit(
        &self,
        request: &ToolCallRequest,
        outcome: &Outcome,
    ) -> Result<ToolCallRequest, ReconcileError> {
        let mut next = request.clone();
        let phase = outcome.project(&mut next.status, Utc::now())?;
        let committed = self.store.update_tool_call_status(&next).await?;
        let key = committed.key();

        tracing::debug!(
            namespace = key.namespace(),
            name = key.name(),
            phase = %phase,
            outcome = outcome.label(),
            "Committed tool call status"
        );

        if let Some(notification) = outcome.notification(&committed.spec.tool_ref.name) {
            self.recorder.record(
                &key,
                notification.event_type,
                notification.reason,
                &notification.message,
            );
        }

        if phase.is_terminal() {
            let status = &committed.status;
            let closing_detail = status.error.as_deref().or(status.status_detail.as_deref());
            self.trace
                .close(status.trace_context.as_ref(), phase, closing_detail);
        }

        Ok(committed)
    }
}
