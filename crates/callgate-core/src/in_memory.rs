use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::definition::{ExecutionRecord, RemoteCapabilityBinding, Secret, ToolDefinition};
use crate::error::{StoreError, StoreResult};
use crate::identifiers::ObjectKey;
use crate::request::ToolCallRequest;
use crate::store::ResourceStore;

/// Capacity of the change notification channel
const WATCH_CAPACITY: usize = 1024;

/// Transient resource store backed by in-process maps.
///
/// `InMemoryStore` gives the controller a real compare-and-commit store for
/// tests, the CLI and single-process deployments. Every write stamps a fresh
/// `resource_version` from a store-wide counter, and tool call changes are
/// published on a broadcast channel that the control loop consumes in place
/// of a cluster watch. All data is lost when the process terminates.
///
/// Clones share the same underlying state.
///
/// # Example
///
/// ```rust
/// use callgate_core::{InMemoryStore, ObjectMeta, ResourceStore, ToolCallRequest, ToolCallSpec};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryStore::new();
/// let stored = store.insert_tool_call(ToolCallRequest::new(
///     ObjectMeta::new("default", "call-1"),
///     ToolCallSpec::new("add", "task-1", r#"{"a": 1, "b": 2}"#),
/// ));
///
/// let mut stale = stored.clone();
/// let mut fresh = stored.clone();
/// fresh.status.status_detail = Some("first".into());
/// store.update_tool_call_status(&fresh).await.unwrap();
///
/// stale.status.status_detail = Some("second".into());
/// assert!(store.update_tool_call_status(&stale).await.is_err());
/// # });
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    changes: broadcast::Sender<ObjectKey>,
}

#[derive(Default)]
struct StoreState {
    next_version: u64,
    tool_calls: HashMap<ObjectKey, ToolCallRequest>,
    definitions: HashMap<ObjectKey, ToolDefinition>,
    bindings: HashMap<ObjectKey, RemoteCapabilityBinding>,
    secrets: HashMap<ObjectKey, Secret>,
    records: HashMap<ObjectKey, ExecutionRecord>,
}

impl StoreState {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            changes,
        }
    }

    /// Subscribe to keys of tool calls that were created or updated
    pub fn watch(&self) -> broadcast::Receiver<ObjectKey> {
        self.changes.subscribe()
    }

    /// Create or replace a tool call, returning it with its stored version
    pub fn insert_tool_call(&self, mut request: ToolCallRequest) -> ToolCallRequest {
        let key = request.key();
        {
            let mut state = self.write();
            request.metadata.resource_version = state.bump();
            state.tool_calls.insert(key.clone(), request.clone());
        }
        self.notify(key);
        request
    }

    /// Remove a tool call, as garbage collection would
    pub fn delete_tool_call(&self, key: &ObjectKey) -> Option<ToolCallRequest> {
        self.write().tool_calls.remove(key)
    }

    pub fn insert_tool_definition(&self, mut definition: ToolDefinition) {
        let mut state = self.write();
        definition.metadata.resource_version = state.bump();
        state.definitions.insert(definition.key(), definition);
    }

    pub fn insert_remote_binding(&self, mut binding: RemoteCapabilityBinding) {
        let mut state = self.write();
        binding.metadata.resource_version = state.bump();
        state.bindings.insert(binding.key(), binding);
    }

    pub fn insert_secret(&self, mut secret: Secret) {
        let mut state = self.write();
        secret.metadata.resource_version = state.bump();
        state.secrets.insert(secret.key(), secret);
    }

    pub fn insert_execution_record(&self, mut record: ExecutionRecord) {
        let mut state = self.write();
        record.metadata.resource_version = state.bump();
        state.records.insert(record.metadata.key(), record);
    }

    /// Keys of all stored tool calls, sorted
    pub fn tool_call_keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<ObjectKey> = self.read().tool_calls.keys().cloned().collect();
        keys.sort();
        keys
    }

    // Poisoning only happens if a writer panicked mid-update; the maps are
    // still structurally valid, so recover the guard instead of failing reads.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, key: ObjectKey) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(key);
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_tool_call(&self, key: &ObjectKey) -> StoreResult<Option<ToolCallRequest>> {
        Ok(self.read().tool_calls.get(key).cloned())
    }

    async fn update_tool_call_status(
        &self,
        request: &ToolCallRequest,
    ) -> StoreResult<ToolCallRequest> {
        let key = request.key();
        let committed = {
            let mut state = self.write();
            let version = state.next_version + 1;
            let stored = state
                .tool_calls
                .get_mut(&key)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "ToolCallRequest",
                    key: key.clone(),
                })?;

            if stored.metadata.resource_version != request.metadata.resource_version {
                return Err(StoreError::Conflict {
                    key,
                    expected: request.metadata.resource_version,
                    actual: stored.metadata.resource_version,
                });
            }

            stored.status = request.status.clone();
            stored.metadata.resource_version = version;
            let committed = stored.clone();
            state.next_version = version;
            committed
        };

        tracing::trace!(
            object = %key,
            version = committed.metadata.resource_version,
            phase = %committed.status.phase,
            "Committed tool call status"
        );
        self.notify(key);
        Ok(committed)
    }

    async fn get_tool_definition(&self, key: &ObjectKey) -> StoreResult<Option<ToolDefinition>> {
        Ok(self.read().definitions.get(key).cloned())
    }

    async fn get_remote_binding(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<Option<RemoteCapabilityBinding>> {
        Ok(self.read().bindings.get(key).cloned())
    }

    async fn get_secret(&self, key: &ObjectKey) -> StoreResult<Option<Secret>> {
        Ok(self.read().secrets.get(key).cloned())
    }

    async fn list_execution_records(
        &self,
        namespace: &str,
        label_key: &str,
        label_value: &str,
    ) -> StoreResult<Vec<ExecutionRecord>> {
        let state = self.read();
        let mut records: Vec<ExecutionRecord> = state
            .records
            .values()
            .filter(|record| record.metadata.namespace == namespace)
            .filter(|record| {
                record.metadata.labels.get(label_key).map(String::as_str) == Some(label_value)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::ObjectMeta;
    use crate::phase::Phase;
    use crate::request::ToolCallSpec;
    use crate::store::EXECUTION_RECORD_LABEL;

    fn request(name: &str) -> ToolCallRequest {
        ToolCallRequest::new(
            ObjectMeta::new("default", name),
            ToolCallSpec::new("add", "task-1", "{}"),
        )
    }

    #[tokio::test]
    async fn test_missing_tool_call_is_none() {
        let store = InMemoryStore::new();
        let found = store
            .get_tool_call(&ObjectKey::new("default", "nope"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_status_commit_bumps_version() {
        let store = InMemoryStore::new();
        let mut stored = store.insert_tool_call(request("call-1"));
        let before = stored.metadata.resource_version;

        stored.status.phase = Phase::Pending;
        let committed = store.update_tool_call_status(&stored).await.unwrap();

        assert!(committed.metadata.resource_version > before);
        let reread = store.get_tool_call(&stored.key()).await.unwrap().unwrap();
        assert_eq!(reread.status.phase, Phase::Pending);
        assert_eq!(reread.metadata.resource_version, committed.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_stale_commit_conflicts() {
        let store = InMemoryStore::new();
        let stored = store.insert_tool_call(request("call-1"));

        let mut first = stored.clone();
        first.status.phase = Phase::Pending;
        store.update_tool_call_status(&first).await.unwrap();

        let mut second = stored;
        second.status.phase = Phase::Failed;
        let err = store.update_tool_call_status(&second).await.unwrap_err();
        assert!(err.is_conflict());

        let reread = store.get_tool_call(&first.key()).await.unwrap().unwrap();
        assert_eq!(reread.status.phase, Phase::Pending);
    }

    #[tokio::test]
    async fn test_commit_after_delete_is_not_found() {
        let store = InMemoryStore::new();
        let stored = store.insert_tool_call(request("call-1"));
        store.delete_tool_call(&stored.key());

        let err = store.update_tool_call_status(&stored).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_commit_does_not_touch_spec() {
        let store = InMemoryStore::new();
        let mut stored = store.insert_tool_call(request("call-1"));
        stored.spec.arguments = "tampered".to_string();
        stored.status.phase = Phase::Pending;

        store.update_tool_call_status(&stored).await.unwrap();
        let reread = store.get_tool_call(&stored.key()).await.unwrap().unwrap();
        assert_eq!(reread.spec.arguments, "{}");
    }

    #[tokio::test]
    async fn test_watch_sees_inserts_and_commits() {
        let store = InMemoryStore::new();
        let mut changes = store.watch();

        let mut stored = store.insert_tool_call(request("call-1"));
        assert_eq!(changes.recv().await.unwrap(), stored.key());

        stored.status.phase = Phase::Pending;
        store.update_tool_call_status(&stored).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), stored.key());
    }

    #[tokio::test]
    async fn test_list_execution_records_by_label() {
        let store = InMemoryStore::new();
        let owner = ObjectKey::new("default", "call-1");
        store.insert_execution_record(ExecutionRecord::for_tool_call("run-b", &owner));
        store.insert_execution_record(ExecutionRecord::for_tool_call("run-a", &owner));
        store.insert_execution_record(ExecutionRecord::for_tool_call(
            "run-other",
            &ObjectKey::new("default", "call-2"),
        ));
        store.insert_execution_record(ExecutionRecord::for_tool_call(
            "run-elsewhere",
            &ObjectKey::new("other", "call-1"),
        ));

        let records = store
            .list_execution_records("default", EXECUTION_RECORD_LABEL, "call-1")
            .await
            .unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["run-a", "run-b"]);
    }
}
