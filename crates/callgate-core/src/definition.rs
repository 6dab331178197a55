//! Reference resources resolved while dispatching a tool call
//!
//! None of these are written by the controller. Tool definitions, remote
//! capability bindings and secrets are authored elsewhere and read by name;
//! execution records are created by downstream runners and only looked up by
//! the duplicate-dispatch guard.

use crate::error::DefinitionError;
use crate::identifiers::{LocalObjectRef, ObjectKey, ObjectMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `toolType` value for builtin functions
pub const TOOL_TYPE_FUNCTION: &str = "function";
/// `toolType` value for delegation to another agent
pub const TOOL_TYPE_DELEGATE: &str = "delegateToAgent";
/// `toolType` value for external API integrations
pub const TOOL_TYPE_EXTERNAL_API: &str = "externalAPI";

/// Named tool and how to execute it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub metadata: ObjectMeta,
    pub spec: ToolDefinitionSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinitionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub execute: ExecuteSpec,
}

/// Execution configuration; exactly one field must be set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<BuiltinRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_agent: Option<AgentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_api: Option<ExternalApiRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinRef {
    /// Function name in the builtin registry
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalApiRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<SecretKeyRef>,
}

/// Selects one key of a [`Secret`] in the same namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// The resolved, validated execution kind of a tool definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionKind {
    Builtin { function: String },
    DelegatedAgent { agent: String },
    ExternalApi { credentials: Option<SecretKeyRef> },
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionKind::Builtin { .. } => "builtin",
            ExecutionKind::DelegatedAgent { .. } => "delegated_agent",
            ExecutionKind::ExternalApi { .. } => "external_api",
        }
    }
}

impl ToolDefinition {
    pub fn new(metadata: ObjectMeta, spec: ToolDefinitionSpec) -> Self {
        Self { metadata, spec }
    }

    /// Builtin function definition, mostly for tests and fixtures
    pub fn builtin(namespace: &str, name: &str, function: &str) -> Self {
        Self::new(
            ObjectMeta::new(namespace, name),
            ToolDefinitionSpec {
                tool_type: Some(TOOL_TYPE_FUNCTION.to_string()),
                description: None,
                execute: ExecuteSpec {
                    builtin: Some(BuiltinRef {
                        name: function.to_string(),
                    }),
                    ..ExecuteSpec::default()
                },
            },
        )
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// Resolve exactly one execution kind, honoring an explicit `toolType`
    pub fn execution_kind(&self) -> Result<ExecutionKind, DefinitionError> {
        let execute = &self.spec.execute;
        let mut configured = Vec::new();
        if execute.builtin.is_some() {
            configured.push(TOOL_TYPE_FUNCTION);
        }
        if execute.delegated_agent.is_some() {
            configured.push(TOOL_TYPE_DELEGATE);
        }
        if execute.external_api.is_some() {
            configured.push(TOOL_TYPE_EXTERNAL_API);
        }

        if let Some(declared) = self.spec.tool_type.as_deref() {
            if ![TOOL_TYPE_FUNCTION, TOOL_TYPE_DELEGATE, TOOL_TYPE_EXTERNAL_API].contains(&declared)
            {
                return Err(DefinitionError::UnknownToolType(declared.to_string()));
            }
            if let [only] = configured.as_slice() {
                if *only != declared {
                    return Err(DefinitionError::ToolTypeMismatch {
                        declared: declared.to_string(),
                        configured: *only,
                    });
                }
            }
        }

        match configured.as_slice() {
            [] => Err(DefinitionError::MissingExecutionKind),
            [_] => Ok(match (&execute.builtin, &execute.delegated_agent, &execute.external_api) {
                (Some(builtin), _, _) => ExecutionKind::Builtin {
                    function: builtin.name.clone(),
                },
                (_, Some(agent), _) => ExecutionKind::DelegatedAgent {
                    agent: agent.name.clone(),
                },
                (_, _, Some(api)) => ExecutionKind::ExternalApi {
                    credentials: api.credentials.clone(),
                },
                (None, None, None) => return Err(DefinitionError::MissingExecutionKind),
            }),
            _ => Err(DefinitionError::AmbiguousExecutionKind(configured)),
        }
    }
}

/// Connection to a remote capability server, named after the server
///
/// Resolved when a tool name has the qualified `<server>__<tool>` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCapabilityBinding {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RemoteCapabilityBindingSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCapabilityBindingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Contact channel that must approve every call to this server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_contact_channel: Option<LocalObjectRef>,
}

impl RemoteCapabilityBinding {
    pub fn new(metadata: ObjectMeta, spec: RemoteCapabilityBindingSpec) -> Self {
        Self { metadata, spec }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn approval_channel(&self) -> Option<&str> {
        self.spec
            .approval_contact_channel
            .as_ref()
            .map(|channel| channel.name.as_str())
    }
}

/// Opaque key/value credential material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    pub fn new(metadata: ObjectMeta, data: BTreeMap<String, String>) -> Self {
        Self { metadata, data }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

/// Downstream execution created on behalf of a tool call
///
/// Carries the [`EXECUTION_RECORD_LABEL`](crate::EXECUTION_RECORD_LABEL) label
/// pointing back at the tool call it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub metadata: ObjectMeta,
}

impl ExecutionRecord {
    /// Record labelled as belonging to `tool_call`
    pub fn for_tool_call(name: impl Into<String>, tool_call: &ObjectKey) -> Self {
        Self {
            metadata: ObjectMeta::new(tool_call.namespace(), name)
                .with_label(crate::store::EXECUTION_RECORD_LABEL, tool_call.name()),
        }
    }
}
