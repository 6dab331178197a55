//! External API collaborator contracts
//!
//! An external-API tool is executed by resolving a client for the tool (with
//! credentials read from a secret) and submitting a single function call to
//! it. The call is fire-and-accept: a successful submission carries no result
//! payload, results of approval-style APIs come back later through the
//! approval callback.

use async_trait::async_trait;
use callgate_core::SecretKeyRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Tool name of the human-approval integration, which gets a synthesized
/// payload when called without arguments
pub const HUMAN_APPROVAL_TOOL: &str = "humanlayer-function-call";

/// Function invoked by the default human-approval payload
pub const DEFAULT_APPROVAL_FUNCTION: &str = "approve_tool_call";

/// Payload submitted to an external API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(rename = "fn")]
    pub function: String,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(function: impl Into<String>, kwargs: Map<String, Value>) -> Self {
        Self {
            function: function.into(),
            kwargs,
        }
    }

    /// Build the payload for `tool` from the caller's argument object.
    ///
    /// The human-approval tool called with no arguments asks for approval of
    /// the request itself. Otherwise `fn` comes from the arguments (default:
    /// the tool name) and `kwargs` from the arguments' `kwargs` object
    /// (default: the whole argument object).
    ///
    /// ```rust
    /// use callgate_tools::{FunctionCall, HUMAN_APPROVAL_TOOL};
    /// use serde_json::Map;
    ///
    /// let call = FunctionCall::from_arguments(HUMAN_APPROVAL_TOOL, "call-7", &Map::new());
    /// assert_eq!(call.function, "approve_tool_call");
    /// assert_eq!(call.kwargs["tool_call"], "call-7");
    /// ```
    pub fn from_arguments(tool: &str, request_name: &str, arguments: &Map<String, Value>) -> Self {
        if arguments.is_empty() && tool == HUMAN_APPROVAL_TOOL {
            let mut kwargs = Map::new();
            kwargs.insert("tool_call".to_string(), Value::from(request_name));
            return Self::new(DEFAULT_APPROVAL_FUNCTION, kwargs);
        }

        let function = arguments
            .get("fn")
            .and_then(Value::as_str)
            .unwrap_or(tool)
            .to_string();
        let kwargs = match arguments.get("kwargs") {
            Some(Value::Object(kwargs)) => kwargs.clone(),
            _ => arguments.clone(),
        };
        Self { function, kwargs }
    }
}

/// Globally unique id for one external call
pub fn new_call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Credentials resolved from a secret for one external API tool
#[derive(Clone)]
pub struct ApiCredentials {
    pub secret: SecretKeyRef,
    api_key: String,
}

impl ApiCredentials {
    pub fn new(secret: SecretKeyRef, api_key: impl Into<String>) -> Self {
        Self {
            secret,
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("secret", &self.secret)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Client bound to one external API
#[async_trait]
pub trait ExternalApiClient: Send + Sync {
    /// Submit `call` on behalf of the tool call named `request_name`
    async fn call(
        &self,
        request_name: &str,
        call_id: &str,
        call: &FunctionCall,
    ) -> Result<(), ExternalApiError>;
}

/// Produces clients for external API tools
#[async_trait]
pub trait ExternalApiResolver: Send + Sync {
    async fn resolve_client(
        &self,
        tool: &str,
        credentials: &ApiCredentials,
    ) -> Result<Arc<dyn ExternalApiClient>, ExternalApiError>;
}

/// External API errors; both kinds are transient from the controller's view
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalApiError {
    #[error("failed to resolve client for '{tool}': {message}")]
    ClientResolution { tool: String, message: String },

    #[error("external call failed: {0}")]
    Call(String),
}

/// One call captured by [`RecordingExternalApi`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub tool: String,
    pub request_name: String,
    pub call_id: String,
    pub call: FunctionCall,
}

/// External API stand-in that accepts and records every call.
///
/// Acts as both resolver and client. A configurable number of leading calls
/// can be made to fail, to exercise redelivery.
#[derive(Debug, Clone, Default)]
pub struct RecordingExternalApi {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    failures_remaining: Arc<Mutex<usize>>,
}

impl RecordingExternalApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` calls with [`ExternalApiError::Call`]
    pub fn failing_first(self, count: usize) -> Self {
        if let Ok(mut remaining) = self.failures_remaining.lock() {
            *remaining = count;
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn take_failure(&self) -> bool {
        match self.failures_remaining.lock() {
            Ok(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ExternalApiResolver for RecordingExternalApi {
    async fn resolve_client(
        &self,
        tool: &str,
        credentials: &ApiCredentials,
    ) -> Result<Arc<dyn ExternalApiClient>, ExternalApiError> {
        tracing::debug!(tool, secret = %credentials.secret.name, "Resolved recording client");
        Ok(Arc::new(BoundRecordingClient {
            tool: tool.to_string(),
            api: self.clone(),
        }))
    }
}

struct BoundRecordingClient {
    tool: String,
    api: RecordingExternalApi,
}

#[async_trait]
impl ExternalApiClient for BoundRecordingClient {
    async fn call(
        &self,
        request_name: &str,
        call_id: &str,
        call: &FunctionCall,
    ) -> Result<(), ExternalApiError> {
        if self.api.take_failure() {
            return Err(ExternalApiError::Call("simulated outage".to_string()));
        }
        if let Ok(mut calls) = self.api.calls.lock() {
            calls.push(RecordedCall {
                tool: self.tool.clone(),
                request_name: request_name.to_string(),
                call_id: call_id.to_string(),
                call: call.clone(),
            });
        }
        Ok(())
    }
}
