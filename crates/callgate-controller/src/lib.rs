//! # Callgate Controller
//!
//! Reconciles tool call requests to a terminal outcome.
//!
//! - [`ReconcileCoordinator`]: one guarded, phase-advancing step per pass
//! - [`DispatchRouter`]: routes a request to the remote, builtin or external
//!   API executor and normalizes the result
//! - [`ApprovalGate`] / [`CallbackService`]: suspension on human approval and
//!   its out-of-band resolution
//! - [`StatusProjector`]: the single mapping from outcomes to persisted
//!   status and notification events
//! - [`Controller`]: work queue and worker pool with per-key backoff
//!
//! Collaborators (store, event recorder, remote capability manager, external
//! API resolver, tracer, metrics) are injected through
//! [`ReconcileCoordinator::builder`].

pub mod approval;
pub mod controller;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod projection;
pub mod queue;

pub use approval::{
    ApprovalDecision, ApprovalGate, CallbackPayload, CallbackService, CallbackStatus,
    GateDecision,
};
pub use controller::{Controller, ControllerConfig};
pub use coordinator::{
    CoordinatorBuilder, DEFAULT_REMOTE_CALL_TIMEOUT, ReconcileCoordinator, ReconcileOutcome,
    parse_arguments,
};
pub use dispatch::{DispatchRouter, Resolution, Route};
pub use error::{CallbackError, ReconcileError};
pub use projection::{Notification, Outcome, StatusProjector};
pub use queue::{Backoff, WorkQueue};
