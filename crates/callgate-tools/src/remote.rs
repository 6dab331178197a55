use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Invokes tools hosted on remote capability servers.
///
/// Implementations own connection management for each server. The controller
/// only calls [`call_tool`](Self::call_tool) and bounds it with its own
/// timeout.
#[async_trait]
pub trait RemoteCapabilityManager: Send + Sync {
    /// Call `tool` on `server` with the parsed argument object, returning the
    /// tool's textual result
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: &Map<String, Value>,
    ) -> Result<String, RemoteCallError>;
}

/// Remote tool call errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteCallError {
    #[error("remote capability server '{0}' is not connected")]
    ServerUnavailable(String),

    #[error("tool '{tool}' not found on server '{server}'")]
    ToolNotFound { server: String, tool: String },

    #[error("tool '{tool}' on server '{server}' failed: {message}")]
    ToolFailed {
        server: String,
        tool: String,
        message: String,
    },
}

/// In-process capability manager serving canned responses.
///
/// Each `(server, tool)` pair maps to a fixed result. Used by the CLI fixture
/// mode and by tests that need a remote server without a network. Clones
/// share the same registrations and call log.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilityManager {
    tools: Arc<RwLock<HashMap<(String, String), Result<String, String>>>>,
    calls: Arc<RwLock<Vec<(String, String, Map<String, Value>)>>>,
}

impl StaticCapabilityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool that succeeds with `result`
    pub fn with_tool(self, server: &str, tool: &str, result: impl Into<String>) -> Self {
        self.register(server, tool, Ok(result.into()));
        self
    }

    /// Register a tool that always fails with `message`
    pub fn with_failing_tool(self, server: &str, tool: &str, message: impl Into<String>) -> Self {
        self.register(server, tool, Err(message.into()));
        self
    }

    pub fn register(&self, server: &str, tool: &str, response: Result<String, String>) {
        if let Ok(mut tools) = self.tools.write() {
            tools.insert((server.to_string(), tool.to_string()), response);
        }
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<(String, String, Map<String, Value>)> {
        self.calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn has_server(&self, server: &str) -> bool {
        self.tools
            .read()
            .map(|tools| tools.keys().any(|(s, _)| s == server))
            .unwrap_or(false)
    }
}

#[async_trait]
impl RemoteCapabilityManager for StaticCapabilityManager {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: &Map<String, Value>,
    ) -> Result<String, RemoteCallError> {
        if let Ok(mut calls) = self.calls.write() {
            calls.push((server.to_string(), tool.to_string(), arguments.clone()));
        }

        if !self.has_server(server) {
            return Err(RemoteCallError::ServerUnavailable(server.to_string()));
        }

        let response = self
            .tools
            .read()
            .ok()
            .and_then(|tools| tools.get(&(server.to_string(), tool.to_string())).cloned());

        match response {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(RemoteCallError::ToolFailed {
                server: server.to_string(),
                tool: tool.to_string(),
                message,
            }),
            None => Err(RemoteCallError::ToolNotFound {
                server: server.to_string(),
                tool: tool.to_string(),
            }),
        }
    }
}
