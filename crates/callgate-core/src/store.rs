//! Resource store contract
//!
//! The store is the single source of truth the controller works from. It is
//! an external collaborator: the controller only relies on these operations
//! and on compare-and-commit semantics for status writes.

use crate::definition::{ExecutionRecord, RemoteCapabilityBinding, Secret, ToolDefinition};
use crate::error::StoreResult;
use crate::identifiers::ObjectKey;
use crate::request::ToolCallRequest;
use async_trait::async_trait;

/// Label carried by execution records, valued with the tool call name
pub const EXECUTION_RECORD_LABEL: &str = "callgate.dev/tool-call-request";

/// Read/commit access to the resources a reconcile pass needs
///
/// Lookups return `Ok(None)` for missing objects; absence is a normal outcome.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_tool_call(&self, key: &ObjectKey) -> StoreResult<Option<ToolCallRequest>>;

    /// Compare-and-commit the status of `request`
    ///
    /// Succeeds only if `request.metadata.resource_version` still matches the
    /// stored version, returning the stored object with its new version.
    /// Stale writes fail with [`StoreError::Conflict`](crate::StoreError::Conflict).
    /// Only the status is written; metadata and spec are left as stored.
    async fn update_tool_call_status(&self, request: &ToolCallRequest)
    -> StoreResult<ToolCallRequest>;

    async fn get_tool_definition(&self, key: &ObjectKey) -> StoreResult<Option<ToolDefinition>>;

    async fn get_remote_binding(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<Option<RemoteCapabilityBinding>>;

    async fn get_secret(&self, key: &ObjectKey) -> StoreResult<Option<Secret>>;

    /// Execution records in `namespace` whose `label_key` equals `label_value`
    async fn list_execution_records(
        &self,
        namespace: &str,
        label_key: &str,
        label_value: &str,
    ) -> StoreResult<Vec<ExecutionRecord>>;
}
