//! YAML fixtures for the in-memory store
//!
//! A fixture file seeds every resource kind the controller reads, plus canned
//! responses for remote capability servers:
//!
//! ```yaml
//! toolDefinitions:
//!   - metadata: { name: add }
//!     spec:
//!       toolType: function
//!       execute: { builtin: { name: add } }
//! toolCalls:
//!   - metadata: { name: call-1 }
//!     spec:
//!       toolRef: { name: add }
//!       taskRunRef: { name: task-1 }
//!       arguments: '{"a": 2, "b": 3}'
//! remoteTools:
//!   - { server: search, tool: lookup, result: "found" }
//! externalApi: true
//! ```

use callgate_core::{
    ExecutionRecord, InMemoryStore, RemoteCapabilityBinding, Secret, ToolCallRequest,
    ToolDefinition,
};
use callgate_tools::{RecordingExternalApi, StaticCapabilityManager};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read fixtures from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("remote tool {server}__{tool} needs exactly one of 'result' or 'error'")]
    AmbiguousRemoteTool { server: String, tool: String },
}

/// Canned response of one remote tool
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteToolFixture {
    pub server: String,
    pub tool: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Resources loaded from a fixture file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Fixtures {
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default)]
    pub tool_definitions: Vec<ToolDefinition>,
    #[serde(default)]
    pub remote_bindings: Vec<RemoteCapabilityBinding>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
    #[serde(default)]
    pub execution_records: Vec<ExecutionRecord>,
    #[serde(default)]
    pub remote_tools: Vec<RemoteToolFixture>,
    /// Accept external API calls with a recording stand-in
    #[serde(default)]
    pub external_api: bool,
}

impl Fixtures {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, FixtureError> {
        let fixtures: Fixtures = serde_yaml::from_str(raw)?;
        for remote in &fixtures.remote_tools {
            if remote.result.is_some() == remote.error.is_some() {
                return Err(FixtureError::AmbiguousRemoteTool {
                    server: remote.server.clone(),
                    tool: remote.tool.clone(),
                });
            }
        }
        Ok(fixtures)
    }

    /// Insert every resource into `store`; tool calls go last
    pub fn seed(&self, store: &InMemoryStore) {
        for definition in &self.tool_definitions {
            store.insert_tool_definition(definition.clone());
        }
        for binding in &self.remote_bindings {
            store.insert_remote_binding(binding.clone());
        }
        for secret in &self.secrets {
            store.insert_secret(secret.clone());
        }
        for record in &self.execution_records {
            store.insert_execution_record(record.clone());
        }
        for request in &self.tool_calls {
            store.insert_tool_call(request.clone());
        }
        tracing::info!(
            tool_calls = self.tool_calls.len(),
            tool_definitions = self.tool_definitions.len(),
            remote_bindings = self.remote_bindings.len(),
            "Seeded store from fixtures"
        );
    }

    pub fn capability_manager(&self) -> Option<StaticCapabilityManager> {
        if self.remote_tools.is_empty() {
            return None;
        }
        let manager = StaticCapabilityManager::new();
        for remote in &self.remote_tools {
            let response = match (&remote.result, &remote.error) {
                (Some(result), _) => Ok(result.clone()),
                (None, Some(error)) => Err(error.clone()),
                (None, None) => continue,
            };
            manager.register(&remote.server, &remote.tool, response);
        }
        Some(manager)
    }

    pub fn external_api(&self) -> Option<RecordingExternalApi> {
        self.external_api.then(RecordingExternalApi::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callgate_core::{ObjectKey, Phase, ResourceStore};
    use std::io::Write;

    const FIXTURE: &str = r#"
toolDefinitions:
  - metadata: { name: add }
    spec:
      toolType: function
      execute: { builtin: { name: add } }
remoteBindings:
  - metadata: { name: chat }
    spec:
      approvalContactChannel: { name: team-chat }
toolCalls:
  - metadata: { name: call-1 }
    spec:
      toolRef: { name: add }
      taskRunRef: { name: task-1 }
      arguments: '{"a": 2, "b": 3}'
remoteTools:
  - { server: search, tool: lookup, result: found }
  - { server: search, tool: broken, error: offline }
"#;

    #[tokio::test]
    async fn test_seed_store() {
        let fixtures = Fixtures::parse(FIXTURE).unwrap();
        let store = InMemoryStore::new();
        fixtures.seed(&store);

        let request = store
            .get_tool_call(&ObjectKey::new("default", "call-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status.phase, Phase::Unset);
        assert_eq!(request.spec.tool_ref.name, "add");

        let binding = store
            .get_remote_binding(&ObjectKey::new("default", "chat"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(binding.approval_channel(), Some("team-chat"));
        assert!(fixtures.external_api().is_none());
    }

    #[test]
    fn test_capability_manager_from_remote_tools() {
        let fixtures = Fixtures::parse(FIXTURE).unwrap();
        assert!(fixtures.capability_manager().is_some());
        assert!(Fixtures::default().capability_manager().is_none());
    }

    #[test]
    fn test_remote_tool_needs_one_response() {
        let err = Fixtures::parse(
            "remoteTools:\n  - { server: search, tool: lookup, result: a, error: b }\n",
        )
        .unwrap_err();
        assert!(matches!(err, FixtureError::AmbiguousRemoteTool { .. }));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(matches!(
            Fixtures::parse("toolCall: []\n"),
            Err(FixtureError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        let fixtures = Fixtures::load(file.path()).unwrap();
        assert_eq!(fixtures.tool_calls.len(), 1);

        let missing = Fixtures::load(Path::new("/nonexistent/fixtures.yaml"));
        assert!(matches!(missing, Err(FixtureError::Io { .. })));
    }
}
