//! Approval Gate and Callback service
//!
//! A remote-qualified tool call whose capability binding names an approval
//! contact channel is suspended in `AwaitingApproval`. The reconcile loop then
//! leaves it alone; only a decision delivered out of band through
//! [`CallbackService::apply`] ends it. The decision is the outcome: approval
//! or denial never unblocks a later dispatch.

use crate::error::{CallbackError, ReconcileError};
use crate::projection::{Outcome, StatusProjector};
use callgate_core::{ObjectKey, Phase, ResourceStore, ToolCallRequest};
use callgate_observability::ReconcileMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default bound on re-read-and-retry cycles for a conflicting commit
pub const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// What the gate decided for a remote-qualified request
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// No approval required; continue to dispatch
    Open,
    /// Suspend until a human answers on `channel`
    Suspend { channel: String },
}

/// Decides whether a remote-qualified request needs a human decision
#[derive(Clone)]
pub struct ApprovalGate {
    store: Arc<dyn ResourceStore>,
}

impl ApprovalGate {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Look up the binding for `server` next to `request`.
    ///
    /// Without a binding there is no approval channel, so the gate stays open
    /// and routing is left to the dispatch router.
    pub async fn check(
        &self,
        request: &ToolCallRequest,
        server: &str,
    ) -> Result<GateDecision, ReconcileError> {
        let key = request.key().sibling(server);
        let Some(binding) = self.store.get_remote_binding(&key).await? else {
            tracing::debug!(binding = %key, "No remote capability binding, no approval required");
            return Ok(GateDecision::Open);
        };

        Ok(match binding.approval_channel() {
            Some(channel) => GateDecision::Suspend {
                channel: channel.to_string(),
            },
            None => GateDecision::Open,
        })
    }
}

/// Inbound callback body: `{"runID": "...", "status": {"approved": true, "comment": "..."}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    #[serde(rename = "runID")]
    pub run_id: String,
    #[serde(default)]
    pub status: CallbackStatus,
}

/// Decision part of a [`CallbackPayload`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackStatus {
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl CallbackPayload {
    /// Validate the payload into a decision; `approved` must be present
    pub fn into_decision(self) -> Result<ApprovalDecision, CallbackError> {
        let approved = self
            .status
            .approved
            .ok_or_else(|| CallbackError::MissingDecision(self.run_id.clone()))?;
        Ok(ApprovalDecision {
            run_id: self.run_id,
            approved,
            comment: self.status.comment.filter(|comment| !comment.trim().is_empty()),
        })
    }
}

/// A validated human decision for one tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub run_id: String,
    pub approved: bool,
    pub comment: Option<String>,
}

impl ApprovalDecision {
    fn outcome(&self) -> Outcome {
        if self.approved {
            Outcome::Approved {
                comment: self.comment.clone(),
            }
        } else {
            Outcome::Rejected {
                comment: self.comment.clone(),
            }
        }
    }
}

/// Applies approval decisions to suspended tool calls.
///
/// Runs independently of the reconcile loop and competes with it only
/// through compare-and-commit; conflicting writes are retried against a fresh
/// read a bounded number of times.
#[derive(Clone)]
pub struct CallbackService {
    store: Arc<dyn ResourceStore>,
    projector: StatusProjector,
    namespace: String,
    max_conflict_retries: u32,
    metrics: Option<Arc<ReconcileMetrics>>,
}

impl CallbackService {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        projector: StatusProjector,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            projector,
            namespace: namespace.into(),
            max_conflict_retries: DEFAULT_CONFLICT_RETRIES,
            metrics: None,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ReconcileMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Apply `decision` to the tool call named by its `run_id`
    pub async fn apply(
        &self,
        decision: &ApprovalDecision,
    ) -> Result<ToolCallRequest, CallbackError> {
        let key = ObjectKey::parse(format!("{}/{}", self.namespace, decision.run_id)).map_err(
            |err| CallbackError::InvalidRunId {
                run_id: decision.run_id.clone(),
                message: err.to_string(),
            },
        )?;
        let outcome = decision.outcome();

        let mut attempts = 0;
        loop {
            attempts += 1;
            let request = self
                .store
                .get_tool_call(&key)
                .await?
                .ok_or_else(|| CallbackError::NotFound(decision.run_id.clone()))?;

            if request.status.phase != Phase::AwaitingApproval {
                return Err(CallbackError::NotAwaitingApproval {
                    run_id: decision.run_id.clone(),
                    phase: request.status.phase,
                });
            }

            match self.projector.commit(&request, &outcome).await {
                Ok(committed) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_callback(decision.approved);
                    }
                    tracing::info!(
                        namespace = key.namespace(),
                        name = key.name(),
                        approved = decision.approved,
                        phase = %committed.status.phase,
                        "Applied approval decision"
                    );
                    return Ok(committed);
                }
                Err(ReconcileError::Store(err)) if err.is_conflict() => {
                    if attempts >= self.max_conflict_retries {
                        return Err(CallbackError::ConflictRetriesExhausted {
                            run_id: decision.run_id.clone(),
                            attempts,
                        });
                    }
                    tracing::debug!(
                        namespace = key.namespace(),
                        name = key.name(),
                        attempt = attempts,
                        "Approval commit conflicted, re-reading"
                    );
                }
                Err(ReconcileError::Store(err)) => return Err(CallbackError::Store(err)),
                Err(ReconcileError::Transition(err)) => {
                    return Err(CallbackError::NotAwaitingApproval {
                        run_id: decision.run_id.clone(),
                        phase: err.from,
                    });
                }
                Err(other) => {
                    return Err(CallbackError::Store(callgate_core::StoreError::Unavailable(
                        other.to_string(),
                    )));
                }
            }
        }
    }
}
