//! Tool call lifecycle state machine
//!
//! The phase of a tool call only ever moves forward:
//!
//! ```text
//! Unset ──Initialize──▶ Pending ──Succeed──▶ Succeeded
//!                          │  └────Fail────▶ Failed
//!                          │
//!                   RequireApproval
//!                          ▼
//!                  AwaitingApproval ──Approve──▶ Succeeded
//!                                   └──Reject───▶ Failed
//! ```
//!
//! [`Phase::transition`] is the only place legal moves are declared, and
//! [`Phase::reconcile_action`] is the only place that decides which phases
//! short-circuit a reconcile pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse lifecycle state of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Created but never touched by the controller
    #[default]
    Unset,
    /// Initialized, trace opened, eligible for dispatch
    Pending,
    /// Suspended until an approval decision arrives out of band
    AwaitingApproval,
    /// Terminal success
    Succeeded,
    /// Terminal failure
    Failed,
}

/// Something that happened to a tool call and may move its phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseEvent {
    Initialize,
    RequireApproval,
    Succeed,
    Fail,
    Approve,
    Reject,
}

/// What a reconcile pass should do with an object in a given phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Open the trace and move to `Pending`, nothing else
    Initialize,
    /// Leave the object untouched
    Skip(SkipReason),
    /// Run the duplicate guard, approval gate and dispatch
    Proceed,
}

/// Why a reconcile pass leaves an object untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Terminal,
    AwaitingApproval,
}

/// An event that is not legal in the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition {event:?} from phase {from}")]
pub struct InvalidTransition {
    pub from: Phase,
    pub event: PhaseEvent,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Unset => "Unset",
            Phase::Pending => "Pending",
            Phase::AwaitingApproval => "AwaitingApproval",
            Phase::Succeeded => "Succeeded",
            Phase::Failed => "Failed",
        }
    }

    /// Apply `event`, returning the next phase or rejecting the move
    pub fn transition(self, event: PhaseEvent) -> Result<Phase, InvalidTransition> {
        use PhaseEvent::*;

        let next = match (self, event) {
            (Phase::Unset, Initialize) => Phase::Pending,
            (Phase::Pending, RequireApproval) => Phase::AwaitingApproval,
            (Phase::Pending, Succeed) => Phase::Succeeded,
            (Phase::Pending, Fail) => Phase::Failed,
            (Phase::AwaitingApproval, Approve) => Phase::Succeeded,
            (Phase::AwaitingApproval, Reject) => Phase::Failed,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// Decide how a reconcile pass treats an object in this phase
    pub fn reconcile_action(self) -> ReconcileAction {
        match self {
            Phase::Unset => ReconcileAction::Initialize,
            Phase::Pending => ReconcileAction::Proceed,
            Phase::AwaitingApproval => ReconcileAction::Skip(SkipReason::AwaitingApproval),
            Phase::Succeeded | Phase::Failed => ReconcileAction::Skip(SkipReason::Terminal),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
