//! Error types for reconcile passes and approval callbacks.

use callgate_core::{InvalidTransition, ObjectKey, Phase, StoreError};
use callgate_tools::{BuiltinError, ExternalApiError};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a reconcile pass.
///
/// Most variants leave the tool call non-terminal and are retried by the
/// control loop. [`ReconcileError::InvalidArguments`] is returned only after
/// the request was committed as failed, so its retry is a no-op.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Store read or commit failed, including optimistic conflicts.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Arguments were not a JSON object; the request is already Failed.
    #[error("invalid arguments for {key}: {message}")]
    InvalidArguments { key: ObjectKey, message: String },

    /// A builtin operand could not be coerced; nothing was committed.
    #[error("builtin dispatch aborted: {0}")]
    Builtin(BuiltinError),

    /// External API client resolution or call failed; nothing was committed.
    #[error("external API dispatch failed: {0}")]
    ExternalApi(#[from] ExternalApiError),

    /// Remote tool call exceeded its time bound; nothing was committed.
    #[error("remote call {server}__{tool} timed out after {timeout:?}")]
    RemoteTimeout {
        server: String,
        tool: String,
        timeout: Duration,
    },

    /// A status move outside the transition table.
    #[error("illegal status transition: {0}")]
    Transition(#[from] InvalidTransition),
}

impl ReconcileError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::Store(_)
                | ReconcileError::Builtin(_)
                | ReconcileError::ExternalApi(_)
                | ReconcileError::RemoteTimeout { .. }
        )
    }

    /// Get the error code suitable for logging or metrics labels.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::Store(StoreError::Conflict { .. }) => "conflict",
            ReconcileError::Store(_) => "store",
            ReconcileError::InvalidArguments { .. } => "invalid_arguments",
            ReconcileError::Builtin(_) => "builtin",
            ReconcileError::ExternalApi(_) => "external_api",
            ReconcileError::RemoteTimeout { .. } => "remote_timeout",
            ReconcileError::Transition(_) => "transition",
        }
    }
}

/// Errors returned when applying an approval decision.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The decision carried no `approved` value.
    #[error("approval decision for {0} is missing 'approved'")]
    MissingDecision(String),

    #[error("invalid runID {run_id:?}: {message}")]
    InvalidRunId { run_id: String, message: String },

    #[error("no tool call found for runID {0}")]
    NotFound(String),

    /// The tool call is not suspended on an approval.
    #[error("tool call {run_id} is {phase}, not awaiting approval")]
    NotAwaitingApproval { run_id: String, phase: Phase },

    #[error("gave up on {run_id} after {attempts} conflicting commits")]
    ConflictRetriesExhausted { run_id: String, attempts: u32 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CallbackError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CallbackError::MissingDecision(_) => "missing_decision",
            CallbackError::InvalidRunId { .. } => "invalid_run_id",
            CallbackError::NotFound(_) => "not_found",
            CallbackError::NotAwaitingApproval { .. } => "not_awaiting_approval",
            CallbackError::ConflictRetriesExhausted { .. } => "conflict",
            CallbackError::Store(_) => "store",
        }
    }
}
