//! Integration tests for the worker-pool control loop
//!
//! The controller consumes the in-memory store's change feed, so a submitted
//! tool call is driven through every phase without explicit reconcile calls.

use callgate_controller::{Controller, ControllerConfig, ReconcileCoordinator};
use callgate_core::{
    ExecuteSpec, ExternalApiRef, InMemoryEventRecorder, InMemoryStore, ObjectKey, ObjectMeta,
    Phase, ResourceStore, Secret, SecretKeyRef, ToolCallRequest, ToolCallSpec, ToolDefinition,
    ToolDefinitionSpec,
};
use callgate_tools::RecordingExternalApi;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_config() -> ControllerConfig {
    ControllerConfig {
        workers: 2,
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(50),
    }
}

fn submit(store: &InMemoryStore, name: &str, tool: &str, arguments: &str) -> ObjectKey {
    store
        .insert_tool_call(ToolCallRequest::new(
            ObjectMeta::new("default", name),
            ToolCallSpec::new(tool, "task-1", arguments),
        ))
        .key()
}

async fn wait_for_terminal(store: &InMemoryStore, key: &ObjectKey) -> ToolCallRequest {
    for _ in 0..300 {
        if let Some(request) = store.get_tool_call(key).await.unwrap() {
            if request.status.phase.is_terminal() {
                return request;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{key} did not reach a terminal phase");
}

#[tokio::test]
async fn test_controller_drives_requests_to_completion() {
    let store = InMemoryStore::new();
    store.insert_tool_definition(ToolDefinition::builtin("default", "add", "add"));
    store.insert_tool_definition(ToolDefinition::builtin("default", "divide", "divide"));

    let coordinator = ReconcileCoordinator::builder(
        Arc::new(store.clone()),
        Arc::new(InMemoryEventRecorder::new()),
    )
    .build();
    let controller = Controller::new(coordinator, fast_config());

    // A request that exists before startup arrives through the initial list.
    let existing = submit(&store, "call-existing", "add", r#"{"a": 1, "b": 1}"#);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(controller.run(
        store.watch(),
        store.tool_call_keys(),
        shutdown.clone(),
    ));

    let added = submit(&store, "call-added", "divide", r#"{"a": 9, "b": 0}"#);

    let existing = wait_for_terminal(&store, &existing).await;
    assert_eq!(existing.status.phase, Phase::Succeeded);
    assert_eq!(existing.status.result.as_deref(), Some("2"));

    let added = wait_for_terminal(&store, &added).await;
    assert_eq!(added.status.phase, Phase::Failed);
    assert_eq!(added.status.status_detail.as_deref(), Some("division by zero"));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("controller stops after cancellation")
        .unwrap();
}

#[tokio::test]
async fn test_retryable_failures_are_requeued_with_backoff() {
    let store = InMemoryStore::new();
    store.insert_tool_definition(ToolDefinition::new(
        ObjectMeta::new("default", "notify"),
        ToolDefinitionSpec {
            tool_type: Some("externalAPI".to_string()),
            description: None,
            execute: ExecuteSpec {
                external_api: Some(ExternalApiRef {
                    credentials: Some(SecretKeyRef {
                        name: "api-creds".to_string(),
                        key: "token".to_string(),
                    }),
                }),
                ..ExecuteSpec::default()
            },
        },
    ));
    let mut data = BTreeMap::new();
    data.insert("token".to_string(), "sk-test".to_string());
    store.insert_secret(Secret::new(ObjectMeta::new("default", "api-creds"), data));

    let api = RecordingExternalApi::new().failing_first(2);
    let coordinator = ReconcileCoordinator::builder(
        Arc::new(store.clone()),
        Arc::new(InMemoryEventRecorder::new()),
    )
    .external_api(Arc::new(api.clone()))
    .build();
    let controller = Controller::new(coordinator, fast_config());

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(controller.run(store.watch(), Vec::new(), shutdown.clone()));

    let key = submit(&store, "call-1", "notify", r#"{"message": "deploy done"}"#);
    let request = wait_for_terminal(&store, &key).await;
    assert_eq!(request.status.phase, Phase::Succeeded);
    assert_eq!(api.calls().len(), 1);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_controller_stops_when_idle() {
    let store = InMemoryStore::new();
    let coordinator = ReconcileCoordinator::builder(
        Arc::new(store.clone()),
        Arc::new(InMemoryEventRecorder::new()),
    )
    .build();
    let controller = Controller::new(coordinator, ControllerConfig::default());
    let queue = controller.queue();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(controller.run(store.watch(), Vec::new(), shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(queue.is_empty());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("idle controller stops after cancellation")
        .unwrap();
}
