use crate::error::ReconcileError;
use crate::projection::{Outcome, detail};
use callgate_tools::RemoteCapabilityManager;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Calls tools on remote capability servers with a time bound
#[derive(Clone)]
pub struct RemoteExecutor {
    manager: Arc<dyn RemoteCapabilityManager>,
    timeout: Duration,
}

impl RemoteExecutor {
    pub fn new(manager: Arc<dyn RemoteCapabilityManager>, timeout: Duration) -> Self {
        Self { manager, timeout }
    }

    /// Call `tool` on `server`.
    ///
    /// A call that errors ends the request. A call that stalls past the
    /// timeout is abandoned and returned as a retryable error; nothing is
    /// committed for it.
    pub async fn execute(
        &self,
        server: &str,
        tool: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Outcome, ReconcileError> {
        let call = self.manager.call_tool(server, tool, arguments);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => Ok(Outcome::succeeded(
                Some(result),
                format!("remote tool {server}__{tool} executed"),
            )),
            Ok(Err(err)) => Ok(Outcome::failed(detail::REMOTE_CALL_FAILED, err.to_string())),
            Err(_elapsed) => Err(ReconcileError::RemoteTimeout {
                server: server.to_string(),
                tool: tool.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}
