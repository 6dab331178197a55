//! Reconcile Coordinator
//!
//! One call to [`ReconcileCoordinator::reconcile`] performs at most one
//! phase-advancing step for one tool call and returns. Every pass starts from
//! a fresh read and runs the same ordered guards, so a pass is safe to repeat
//! after a crash, a duplicate delivery or a conflicting commit:
//!
//! 1. fetch (missing object ⇒ no-op)
//! 2. initialize if the phase is unset, and stop
//! 3. skip terminal and suspended phases; skip if an execution record exists
//! 4. resolve `server__tool` qualification
//! 5. approval gate for remote-qualified tools
//! 6. parse arguments (malformed ⇒ Failed)
//! 7. route and dispatch, then commit the outcome

use crate::approval::{ApprovalGate, CallbackService, GateDecision};
use crate::dispatch::{DispatchRouter, Resolution};
use crate::error::ReconcileError;
use crate::projection::{Outcome, StatusProjector, detail, reason};
use callgate_core::{
    EXECUTION_RECORD_LABEL, EventRecorder, ObjectKey, Phase, ReconcileAction, ResourceStore,
    SkipReason, ToolCallRequest, ToolTarget,
};
use callgate_observability::{ReconcileMetrics, TraceContinuity};
use callgate_tools::{ExternalApiResolver, RemoteCapabilityManager};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a remote tool call
pub const DEFAULT_REMOTE_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// What a reconcile pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The object no longer exists
    NotFound,
    /// The phase short-circuits the pass
    Skipped(SkipReason),
    /// A downstream execution record already exists
    DuplicateDispatch,
    /// A status change was committed
    Committed {
        phase: Phase,
        outcome: &'static str,
    },
}

impl ReconcileOutcome {
    /// Metrics label
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::NotFound => "not_found",
            ReconcileOutcome::Skipped(SkipReason::Terminal) => "skipped_terminal",
            ReconcileOutcome::Skipped(SkipReason::AwaitingApproval) => "skipped_awaiting_approval",
            ReconcileOutcome::DuplicateDispatch => "duplicate_dispatch",
            ReconcileOutcome::Committed { outcome, .. } => *outcome,
        }
    }
}

/// Drives one tool call through its lifecycle, one step per pass
#[derive(Clone)]
pub struct ReconcileCoordinator {
    store: Arc<dyn ResourceStore>,
    gate: ApprovalGate,
    router: DispatchRouter,
    projector: StatusProjector,
    metrics: Option<Arc<ReconcileMetrics>>,
}

impl ReconcileCoordinator {
    pub fn builder(
        store: Arc<dyn ResourceStore>,
        recorder: Arc<dyn EventRecorder>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            store,
            recorder,
            trace: None,
            remote: None,
            remote_timeout: DEFAULT_REMOTE_CALL_TIMEOUT,
            external: None,
            metrics: None,
        }
    }

    /// Callback service sharing this coordinator's store, events and trace
    pub fn callback_service(&self, namespace: impl Into<String>) -> CallbackService {
        let service = CallbackService::new(self.store.clone(), self.projector.clone(), namespace);
        match &self.metrics {
            Some(metrics) => service.with_metrics(metrics.clone()),
            None => service,
        }
    }

    /// Run one reconcile pass for `key`
    #[tracing::instrument(
        name = "reconcile",
        skip_all,
        fields(namespace = key.namespace(), name = key.name())
    )]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let result = self.reconcile_once(key).await;

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(err) => err.error_code(),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_reconcile(label);
        }
        match &result {
            Ok(_) => tracing::debug!(outcome = label, "Reconcile pass finished"),
            Err(err) if err.is_retryable() => {
                tracing::warn!(error = %err, outcome = label, "Reconcile pass will be retried")
            }
            Err(err) => tracing::warn!(error = %err, outcome = label, "Reconcile pass failed"),
        }
        result
    }

    async fn reconcile_once(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(request) = self.store.get_tool_call(key).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };

        match request.status.phase.reconcile_action() {
            ReconcileAction::Initialize => return self.initialize(&request).await,
            ReconcileAction::Skip(reason) => return Ok(ReconcileOutcome::Skipped(reason)),
            ReconcileAction::Proceed => {}
        }

        if self.has_execution_record(&request).await? {
            tracing::info!("Execution record already exists, not dispatching again");
            return Ok(ReconcileOutcome::DuplicateDispatch);
        }

        let target = ToolTarget::parse(&request.spec.tool_ref.name);
        if let ToolTarget::Remote { server, .. } = &target {
            match self.gate.check(&request, server).await? {
                GateDecision::Open => {}
                GateDecision::Suspend { channel } => {
                    return self
                        .commit(&request, Outcome::AwaitingApproval { channel })
                        .await;
                }
            }
        }

        let arguments = match parse_arguments(&request.spec.arguments) {
            Ok(arguments) => arguments,
            Err(message) => {
                let outcome = Outcome::Failed {
                    reason: reason::INVALID_ARGUMENTS,
                    detail: detail::INVALID_ARGUMENTS.to_string(),
                    error: message.clone(),
                };
                self.commit(&request, outcome).await?;
                return Err(ReconcileError::InvalidArguments {
                    key: key.clone(),
                    message,
                });
            }
        };

        let route = match self.router.resolve(&request, &target).await? {
            Resolution::Dispatch(route) => route,
            Resolution::Reject(outcome) => return self.commit(&request, outcome).await,
        };

        let outcome = self.router.dispatch(&request, &route, &arguments).await?;
        self.commit(&request, outcome).await
    }

    /// Open the logical trace and move to `Pending`; never fused with dispatch
    async fn initialize(
        &self,
        request: &ToolCallRequest,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let trace = self
            .projector
            .trace()
            .open(&request.key(), &request.spec.tool_ref.name);
        if trace.is_none() {
            tracing::warn!("Could not open a trace for the tool call, continuing untraced");
        }
        self.commit(request, Outcome::Initialized { trace }).await
    }

    async fn has_execution_record(&self, request: &ToolCallRequest) -> Result<bool, ReconcileError> {
        let records = self
            .store
            .list_execution_records(
                &request.metadata.namespace,
                EXECUTION_RECORD_LABEL,
                &request.metadata.name,
            )
            .await?;
        Ok(!records.is_empty())
    }

    async fn commit(
        &self,
        request: &ToolCallRequest,
        outcome: Outcome,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let committed = self.projector.commit(request, &outcome).await?;
        Ok(ReconcileOutcome::Committed {
            phase: committed.status.phase,
            outcome: outcome.label(),
        })
    }
}

/// Parse the opaque argument string into a JSON object.
///
/// A blank string means "no arguments".
pub fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(other) => Err(format!(
            "arguments must be a JSON object, got {}",
            json_type(&other)
        )),
        Err(err) => Err(format!("invalid argument JSON: {err}")),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builder for [`ReconcileCoordinator`]
pub struct CoordinatorBuilder {
    store: Arc<dyn ResourceStore>,
    recorder: Arc<dyn EventRecorder>,
    trace: Option<TraceContinuity>,
    remote: Option<Arc<dyn RemoteCapabilityManager>>,
    remote_timeout: Duration,
    external: Option<Arc<dyn ExternalApiResolver>>,
    metrics: Option<Arc<ReconcileMetrics>>,
}

impl CoordinatorBuilder {
    pub fn trace(mut self, trace: TraceContinuity) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn remote_capabilities(mut self, manager: Arc<dyn RemoteCapabilityManager>) -> Self {
        self.remote = Some(manager);
        self
    }

    pub fn remote_call_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn external_api(mut self, resolver: Arc<dyn ExternalApiResolver>) -> Self {
        self.external = Some(resolver);
        self
    }

    pub fn metrics(mut self, metrics: Arc<ReconcileMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> ReconcileCoordinator {
        let trace = self.trace.unwrap_or_else(TraceContinuity::local);

        let mut router = DispatchRouter::new(self.store.clone(), trace.clone());
        if let Some(manager) = self.remote {
            router = router.with_remote(manager, self.remote_timeout);
        }
        if let Some(resolver) = self.external {
            router = router.with_external_api(resolver);
        }
        if let Some(metrics) = &self.metrics {
            router = router.with_metrics(metrics.clone());
        }

        ReconcileCoordinator {
            gate: ApprovalGate::new(self.store.clone()),
            projector: StatusProjector::new(self.store.clone(), self.recorder, trace),
            store: self.store,
            router,
            metrics: self.metrics,
        }
    }
}
