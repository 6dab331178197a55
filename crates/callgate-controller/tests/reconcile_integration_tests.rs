//! Integration tests for the reconcile coordinator
//!
//! These tests drive whole tool call lifecycles against the in-memory store:
//! - Initialization is idempotent and opens exactly one trace identity
//! - Terminal statuses never change on later passes
//! - Existing execution records block every executor
//! - Builtin, remote and external API routes end in the expected phase
//! - Approval suspension is a no-op until a decision arrives

use callgate_controller::{
    ApprovalDecision, CallbackError, Outcome, ReconcileCoordinator, ReconcileError,
    ReconcileOutcome, StatusProjector,
};
use callgate_core::{
    EventType, ExecuteSpec, ExecutionRecord, ExternalApiRef, InMemoryEventRecorder,
    InMemoryStore, LocalObjectRef, ObjectKey, ObjectMeta, Phase, RemoteCapabilityBinding,
    RemoteCapabilityBindingSpec, ResourceStore, Secret, SecretKeyRef, SkipReason, StatusText,
    StoreError, ToolCallRequest, ToolCallSpec, ToolDefinition, ToolDefinitionSpec,
};
use callgate_observability::{ReconcileMetrics, TraceContinuity};
use callgate_tools::{RecordingExternalApi, StaticCapabilityManager};
use std::collections::BTreeMap;
use std::sync::Arc;

const NS: &str = "default";

struct Harness {
    store: InMemoryStore,
    events: InMemoryEventRecorder,
    coordinator: ReconcileCoordinator,
}

impl Harness {
    fn new() -> Self {
        Self::with(|builder| builder)
    }

    fn with(
        configure: impl FnOnce(
            callgate_controller::CoordinatorBuilder,
        ) -> callgate_controller::CoordinatorBuilder,
    ) -> Self {
        let store = InMemoryStore::new();
        let events = InMemoryEventRecorder::new();
        let builder = ReconcileCoordinator::builder(
            Arc::new(store.clone()),
            Arc::new(events.clone()),
        );
        Self {
            coordinator: configure(builder).build(),
            store,
            events,
        }
    }

    fn submit(&self, name: &str, tool: &str, arguments: &str) -> ObjectKey {
        self.store
            .insert_tool_call(ToolCallRequest::new(
                ObjectMeta::new(NS, name),
                ToolCallSpec::new(tool, "task-1", arguments),
            ))
            .key()
    }

    async fn status_of(&self, key: &ObjectKey) -> ToolCallRequest {
        self.store.get_tool_call(key).await.unwrap().unwrap()
    }

    /// Reconcile until the pass stops committing anything new
    async fn settle(&self, key: &ObjectKey) -> ToolCallRequest {
        for _ in 0..5 {
            match self.coordinator.reconcile(key).await {
                Ok(ReconcileOutcome::Committed { .. }) => continue,
                _ => break,
            }
        }
        self.status_of(key).await
    }
}

fn approval_binding(server: &str, channel: Option<&str>) -> RemoteCapabilityBinding {
    RemoteCapabilityBinding::new(
        ObjectMeta::new(NS, server),
        RemoteCapabilityBindingSpec {
            transport: Some("stdio".to_string()),
            approval_contact_channel: channel.map(LocalObjectRef::new),
        },
    )
}

fn external_api_definition(name: &str, secret: &str, key: &str) -> ToolDefinition {
    ToolDefinition::new(
        ObjectMeta::new(NS, name),
        ToolDefinitionSpec {
            tool_type: Some("externalAPI".to_string()),
            description: None,
            execute: ExecuteSpec {
                external_api: Some(ExternalApiRef {
                    credentials: Some(SecretKeyRef {
                        name: secret.to_string(),
                        key: key.to_string(),
                    }),
                }),
                ..ExecuteSpec::default()
            },
        },
    )
}

fn secret(name: &str, key: &str, value: &str) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(key.to_string(), value.to_string());
    Secret::new(ObjectMeta::new(NS, name), data)
}

#[tokio::test]
async fn test_first_pass_only_initializes() {
    let harness = Harness::new();
    harness
        .store
        .insert_tool_definition(ToolDefinition::builtin(NS, "add", "add"));
    let key = harness.submit("call-1", "add", r#"{"a": 2, "b": 3}"#);

    let outcome = harness.coordinator.reconcile(&key).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Committed {
            phase: Phase::Pending,
            outcome: "initialized"
        }
    );

    let request = harness.status_of(&key).await;
    assert_eq!(request.status.phase, Phase::Pending);
    assert_eq!(request.status.status_text, Some(StatusText::Pending));
    assert!(request.status.start_time.is_some());
    assert!(request.status.result.is_none(), "initialization must not dispatch");
    let trace = request.status.trace_context.expect("trace token persisted");
    assert!(trace.is_well_formed());
    assert!(harness.events.events().is_empty());
}

#[tokio::test]
async fn test_stale_initialization_cannot_persist_second_trace() {
    let harness = Harness::new();
    let key = harness.submit("call-1", "add", "{}");
    let stale = harness.status_of(&key).await;

    harness.coordinator.reconcile(&key).await.unwrap();
    let first_trace = harness.status_of(&key).await.status.trace_context;

    // A second pass that started from the same read races the first one.
    let trace = TraceContinuity::local();
    let projector = StatusProjector::new(
        Arc::new(harness.store.clone()),
        Arc::new(harness.events.clone()),
        trace.clone(),
    );
    let second = Outcome::Initialized {
        trace: trace.open(&key, "add"),
    };
    let err = projector.commit(&stale, &second).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Store(StoreError::Conflict { .. })));
    assert!(err.is_retryable());

    assert_eq!(harness.status_of(&key).await.status.trace_context, first_trace);
}

#[tokio::test]
async fn test_builtin_add_succeeds() {
    let harness = Harness::new();
    harness
        .store
        .insert_tool_definition(ToolDefinition::builtin(NS, "add", "add"));
    let key = harness.submit("call-1", "add", r#"{"a": 2, "b": 3}"#);

    let request = harness.settle(&key).await;
    assert_eq!(request.status.phase, Phase::Succeeded);
    assert_eq!(request.status.status_text, Some(StatusText::Succeeded));
    assert_eq!(request.status.result.as_deref(), Some("5"));
    assert!(request.status.completion_time.is_some());

    let events = harness.events.events_for(&key);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "ExecutionSucceeded");
    assert_eq!(events[0].event_type, EventType::Normal);
}

#[tokio::test]
async fn test_builtin_divide() {
    let harness = Harness::new();
    harness
        .store
        .insert_tool_definition(ToolDefinition::builtin(NS, "divide", "divide"));

    let ok = harness.submit("call-ok", "divide", r#"{"a": 10, "b": 2}"#);
    let request = harness.settle(&ok).await;
    assert_eq!(request.status.phase, Phase::Succeeded);
    assert_eq!(request.status.result.as_deref(), Some("5"));

    let by_zero = harness.submit("call-zero", "divide", r#"{"a": 1, "b": 0}"#);
    let request = harness.settle(&by_zero).await;
    assert_eq!(request.status.phase, Phase::Failed);
    assert_eq!(request.status.status_detail.as_deref(), Some("division by zero"));
    assert!(request.status.error.is_some());
    assert!(request.status.completion_time.is_some());

    let events = harness.events.events_for(&by_zero);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Warning);
}

#[tokio::test]
async fn test_operand_coercion_failure_is_retried_without_commit() {
    let harness = Harness::new();
    harness
        .store
        .insert_tool_definition(ToolDefinition::builtin(NS, "add", "add"));
    let key = harness.submit("call-1", "add", r#"{"a": "two", "b": 3}"#);

    harness.coordinator.reconcile(&key).await.unwrap();
    let err = harness.coordinator.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Builtin(_)));
    assert!(err.is_retryable());

    let request = harness.status_of(&key).await;
    assert_eq!(request.status.phase, Phase::Pending);
    assert!(harness.events.events().is_empty());
}

#[tokio::test]
async fn test_malformed_arguments_fail_terminally() {
    let harness = Harness::new();
    harness
        .store
        .insert_tool_definition(ToolDefinition::builtin(NS, "add", "add"));
    let key = harness.submit("call-1", "add", "{not json");

    harness.coordinator.reconcile(&key).await.unwrap();
    let err = harness.coordinator.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidArguments { .. }));
    assert!(!err.is_retryable());

    let request = harness.status_of(&key).await;
    assert_eq!(request.status.phase, Phase::Failed);
    assert_eq!(request.status.status_detail.as_deref(), Some("invalid arguments"));
    let error = request.status.error.unwrap();
    assert!(error.starts_with("invalid argument JSON"), "{error}");

    let events = harness.events.events_for(&key);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "InvalidArguments");

    // The re-run after the terminal commit is a no-op.
    assert_eq!(
        harness.coordinator.reconcile(&key).await.unwrap(),
        ReconcileOutcome::Skipped(SkipReason::Terminal)
    );
}

#[tokio::test]
async fn test_terminal_status_is_immutable() {
    let harness = Harness::new();
    harness
        .store
        .insert_tool_definition(ToolDefinition::builtin(NS, "multiply", "multiply"));
    let key = harness.submit("call-1", "multiply", r#"{"a": 4, "b": 2.5}"#);

    let settled = harness.settle(&key).await;
    assert_eq!(settled.status.phase, Phase::Succeeded);

    for _ in 0..3 {
        assert_eq!(
            harness.coordinator.reconcile(&key).await.unwrap(),
            ReconcileOutcome::Skipped(SkipReason::Terminal)
        );
    }
    let after = harness.status_of(&key).await;
    assert_eq!(after.status, settled.status);
    assert_eq!(after.metadata.resource_version, settled.metadata.resource_version);
    assert_eq!(harness.events.events_for(&key).len(), 1);
}

#[tokio::test]
async fn test_execution_record_blocks_dispatch() {
    let manager = StaticCapabilityManager::new().with_tool("search", "lookup", "found");
    let harness = Harness::with(|builder| builder.remote_capabilities(Arc::new(manager.clone())));
    harness
        .store
        .insert_remote_binding(approval_binding("search", None));
    let key = harness.submit("call-1", "search__lookup", r#"{"q": "rust"}"#);
    harness
        .store
        .insert_execution_record(ExecutionRecord::for_tool_call("exec-1", &key));

    harness.coordinator.reconcile(&key).await.unwrap();
    for _ in 0..2 {
        assert_eq!(
            harness.coordinator.reconcile(&key).await.unwrap(),
            ReconcileOutcome::DuplicateDispatch
        );
    }

    assert!(manager.calls().is_empty());
    assert_eq!(harness.status_of(&key).await.status.phase, Phase::Pending);
}

#[tokio::test]
async fn test_remote_tool_without_approval_runs() {
    let manager = StaticCapabilityManager::new().with_tool("search", "lookup", "found it");
    let harness = Harness::with(|builder| builder.remote_capabilities(Arc::new(manager.clone())));
    harness
        .store
        .insert_remote_binding(approval_binding("search", None));
    let key = harness.submit("call-1", "search__lookup", r#"{"q": "rust"}"#);

    let request = harness.settle(&key).await;
    assert_eq!(request.status.phase, Phase::Succeeded);
    assert_eq!(request.status.result.as_deref(), Some("found it"));

    let calls = manager.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "search");
    assert_eq!(calls[0].1, "lookup");
    assert_eq!(calls[0].2.get("q"), Some(&serde_json::json!("rust")));
}

#[tokio::test]
async fn test_remote_tool_failure_is_terminal() {
    let manager =
        StaticCapabilityManager::new().with_failing_tool("search", "lookup", "index offline");
    let harness = Harness::with(|builder| builder.remote_capabilities(Arc::new(manager)));
    harness
        .store
        .insert_remote_binding(approval_binding("search", None));
    let key = harness.submit("call-1", "search__lookup", "{}");

    let request = harness.settle(&key).await;
    assert_eq!(request.status.phase, Phase::Failed);
    assert_eq!(
        request.status.status_detail.as_deref(),
        Some("remote tool call failed")
    );
    assert!(request.status.error.unwrap().contains("index offline"));
}

#[tokio::test]
async fn test_unbound_qualified_name_falls_back_to_definition() {
    let harness = Harness::new();
    harness
        .store
        .insert_tool_definition(ToolDefinition::builtin(NS, "math__add", "add"));
    let key = harness.submit("call-1", "math__add", r#"{"a": 2, "b": 3}"#);

    let request = harness.settle(&key).await;
    assert_eq!(request.status.phase, Phase::Succeeded);
    assert_eq!(request.status.result.as_deref(), Some("5"));
    assert_eq!(harness.events.events_for(&key).len(), 1);
}

#[tokio::test]
async fn test_unbound_remote_tool_dispatches_without_approval() {
    let manager = StaticCapabilityManager::new().with_tool("search", "lookup", "found");
    let harness = Harness::with(|builder| builder.remote_capabilities(Arc::new(manager.clone())));
    let key = harness.submit("call-1", "search__lookup", "{}");

    let request = harness.settle(&key).await;
    assert_eq!(request.status.phase, Phase::Succeeded);
    assert_eq!(request.status.result.as_deref(), Some("found"));
    assert_eq!(manager.calls().len(), 1);
}

#[tokio::test]
async fn test_unbound_qualified_name_without_definition_fails() {
    let harness = Harness::new();
    let key = harness.submit("call-1", "search__lookup", "{}");

    let request = harness.settle(&key).await;
    assert_eq!(request.status.phase, Phase::Failed);
    assert_eq!(
        request.status.status_detail.as_deref(),
        Some("tool definition not found")
    );
}

#[tokio::test]
async fn test_missing_definition_fails() {
    let harness = Harness::new();
    let key = harness.submit("call-1", "nowhere", "{}");

    let request = harness.settle(&key).await;
    assert_eq!(request.status.phase, Phase::Failed);
    assert_eq!(
        request.status.status_detail.as_deref(),
        Some("tool definition not found")
    );
    assert_eq!(harness.events.events_for(&key)[0].reason, "ValidationFailed");
}

#[tokio::test]
async fn test_approval_round_trip_approved() {
    let manager = StaticCapabilityManager::new().with_tool("chat", "send", "sent");
    let harness = Harness::with(|builder| builder.remote_capabilities(Arc::new(manager.clone())));
    harness
        .store
        .insert_remote_binding(approval_binding("chat", Some("team-chat")));
    let key = harness.submit("call-1", "chat__send", r#"{"text": "hello"}"#);

    let request = harness.settle(&key).await;
    assert_eq!(request.status.phase, Phase::AwaitingApproval);
    assert_eq!(
        request.status.status_text,
        Some(StatusText::AwaitingHumanApproval)
    );
    assert!(request.status.status_detail.unwrap().contains("team-chat"));

    // Suspended requests are left alone by the loop.
    for _ in 0..3 {
        assert_eq!(
            harness.coordinator.reconcile(&key).await.unwrap(),
            ReconcileOutcome::Skipped(SkipReason::AwaitingApproval)
        );
    }
    assert_eq!(harness.events.events_for(&key).len(), 1);

    let callbacks = harness.coordinator.callback_service(NS);
    let committed = callbacks
        .apply(&ApprovalDecision {
            run_id: "call-1".to_string(),
            approved: true,
            comment: Some("ship it".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(committed.status.phase, Phase::Succeeded);
    assert_eq!(committed.status.result.as_deref(), Some("Approved"));
    assert_eq!(
        committed.status.status_detail.as_deref(),
        Some("execution approved: ship it")
    );
    assert!(committed.status.completion_time.is_some());
    assert!(manager.calls().is_empty(), "approval must not dispatch");

    let reasons: Vec<String> = harness
        .events
        .events_for(&key)
        .into_iter()
        .map(|event| event.reason)
        .collect();
    assert_eq!(reasons, vec!["AwaitingHumanApproval", "ApprovalGranted"]);
}

#[tokio::test]
async fn test_approval_round_trip_rejected() {
    let harness =
        Harness::with(|builder| builder.remote_capabilities(Arc::new(StaticCapabilityManager::new())));
    harness
        .store
        .insert_remote_binding(approval_binding("chat", Some("team-chat")));
    let key = harness.submit("call-1", "chat__send", "{}");
    harness.settle(&key).await;

    let callbacks = harness.coordinator.callback_service(NS);
    let decision = ApprovalDecision {
        run_id: "call-1".to_string(),
        approved: false,
        comment: None,
    };
    let committed = callbacks.apply(&decision).await.unwrap();
    assert_eq!(committed.status.phase, Phase::Failed);
    assert_eq!(committed.status.result.as_deref(), Some("Rejected"));
    assert_eq!(committed.status.error.as_deref(), Some("rejected by approver"));

    // Terminal requests do not accept a second decision.
    let err = callbacks.apply(&decision).await.unwrap_err();
    assert!(matches!(
        err,
        CallbackError::NotAwaitingApproval {
            phase: Phase::Failed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_callback_for_unknown_run_id() {
    let harness = Harness::new();
    let err = harness
        .coordinator
        .callback_service(NS)
        .apply(&ApprovalDecision {
            run_id: "missing".to_string(),
            approved: true,
            comment: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::NotFound(_)));
}

#[tokio::test]
async fn test_external_api_call_is_retried_then_accepted() {
    let api = RecordingExternalApi::new().failing_first(1);
    let harness = Harness::with(|builder| builder.external_api(Arc::new(api.clone())));
    harness
        .store
        .insert_tool_definition(external_api_definition("notify", "api-creds", "token"));
    harness
        .store
        .insert_secret(secret("api-creds", "token", "sk-test"));
    let key = harness.submit("call-1", "notify", r#"{"channel": "ops"}"#);

    harness.coordinator.reconcile(&key).await.unwrap();
    let err = harness.coordinator.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::ExternalApi(_)));
    assert!(err.is_retryable());
    assert_eq!(harness.status_of(&key).await.status.phase, Phase::Pending);

    let outcome = harness.coordinator.reconcile(&key).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Committed {
            phase: Phase::Succeeded,
            outcome: "succeeded"
        }
    );

    let request = harness.status_of(&key).await;
    assert!(request.status.result.is_none());
    assert!(
        request
            .status
            .status_detail
            .unwrap()
            .starts_with("external call ")
    );

    let calls = api.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tool, "notify");
    assert_eq!(calls[0].request_name, "call-1");
    assert_eq!(calls[0].call.function, "notify");
    assert_eq!(calls[0].call.kwargs.get("channel"), Some(&serde_json::json!("ops")));
}

#[tokio::test]
async fn test_external_api_credential_failures() {
    let api = RecordingExternalApi::new();
    let harness = Harness::with(|builder| builder.external_api(Arc::new(api.clone())));
    harness
        .store
        .insert_tool_definition(external_api_definition("missing", "absent", "token"));
    harness
        .store
        .insert_tool_definition(external_api_definition("empty", "blank-creds", "token"));
    harness
        .store
        .insert_secret(secret("blank-creds", "token", "  "));

    let missing = harness.submit("call-missing", "missing", "{}");
    let request = harness.settle(&missing).await;
    assert_eq!(request.status.phase, Phase::Failed);
    assert_eq!(
        request.status.status_detail.as_deref(),
        Some("credentials not found")
    );

    let empty = harness.submit("call-empty", "empty", "{}");
    let request = harness.settle(&empty).await;
    assert_eq!(request.status.phase, Phase::Failed);
    assert_eq!(request.status.status_detail.as_deref(), Some("empty credentials"));

    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_external_api_without_collaborator() {
    let harness = Harness::new();
    harness
        .store
        .insert_tool_definition(external_api_definition("notify", "api-creds", "token"));
    harness
        .store
        .insert_secret(secret("api-creds", "token", "sk-test"));
    let key = harness.submit("call-1", "notify", "{}");

    let request = harness.settle(&key).await;
    assert_eq!(request.status.phase, Phase::Failed);
    assert_eq!(
        request.status.status_detail.as_deref(),
        Some("external API not configured")
    );
}

#[tokio::test]
async fn test_human_approval_tool_payload() {
    let api = RecordingExternalApi::new();
    let harness = Harness::with(|builder| builder.external_api(Arc::new(api.clone())));
    harness.store.insert_tool_definition(external_api_definition(
        "humanlayer-function-call",
        "api-creds",
        "token",
    ));
    harness
        .store
        .insert_secret(secret("api-creds", "token", "sk-test"));
    let key = harness.submit("call-7", "humanlayer-function-call", "");

    assert_eq!(harness.settle(&key).await.status.phase, Phase::Succeeded);

    let calls = api.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].call.function, "approve_tool_call");
    assert_eq!(
        calls[0].call.kwargs.get("tool_call"),
        Some(&serde_json::json!("call-7"))
    );

    // The accepted call is terminal; a later decision cannot attach a result.
    let err = harness
        .coordinator
        .callback_service(NS)
        .apply(&ApprovalDecision {
            run_id: "call-7".to_string(),
            approved: true,
            comment: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallbackError::NotAwaitingApproval {
            phase: Phase::Succeeded,
            ..
        }
    ));
    assert!(harness.status_of(&key).await.status.result.is_none());
}

#[tokio::test]
async fn test_deleted_request_is_not_found() {
    let harness = Harness::new();
    let key = harness.submit("call-1", "add", "{}");
    harness.store.delete_tool_call(&key);

    assert_eq!(
        harness.coordinator.reconcile(&key).await.unwrap(),
        ReconcileOutcome::NotFound
    );
}

#[tokio::test]
async fn test_metrics_follow_passes() {
    let metrics = Arc::new(ReconcileMetrics::new("callgate_it").unwrap());
    let harness = Harness::with(|builder| builder.metrics(metrics.clone()));
    harness
        .store
        .insert_tool_definition(ToolDefinition::builtin(NS, "subtract", "subtract"));
    let key = harness.submit("call-1", "subtract", r#"{"a": 5, "b": "2"}"#);

    harness.settle(&key).await;
    harness.coordinator.reconcile(&key).await.unwrap();

    assert_eq!(metrics.reconcile_count("initialized"), 1);
    assert_eq!(metrics.reconcile_count("succeeded"), 1);
    assert_eq!(metrics.reconcile_count("skipped_terminal"), 2);
    assert_eq!(metrics.dispatch_count("builtin"), 1);
}
