//! Dispatch Router
//!
//! Routes a parsed tool call to exactly one executor and normalizes the
//! executor's result into an [`Outcome`]:
//!
//! | Route | Executor |
//! |---|---|
//! | `server__tool` with a capability manager | [`RemoteExecutor`] |
//! | definition `builtin` | builtin registry |
//! | definition `delegatedAgent` | none, always fails |
//! | definition `externalAPI` | [`ExternalApiExecutor`] |
//!
//! Executors return `Ok(outcome)` for anything that should be committed and
//! `Err` for failures left to redelivery.

mod builtin;
mod external_api;
mod remote;

pub use external_api::ExternalApiExecutor;
pub use remote::RemoteExecutor;

use crate::error::ReconcileError;
use crate::projection::{Outcome, detail};
use callgate_core::{ExecutionKind, ResourceStore, SecretKeyRef, ToolCallRequest, ToolTarget};
use callgate_observability::{ReconcileMetrics, TraceContinuity};
use callgate_tools::{ExternalApiResolver, RemoteCapabilityManager};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Executor a request is routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Remote { server: String, tool: String },
    Builtin { function: String },
    DelegatedAgent { agent: String },
    ExternalApi { credentials: Option<SecretKeyRef> },
}

impl Route {
    /// Executor kind, used as the `kind` metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Route::Remote { .. } => "remote",
            Route::Builtin { .. } => "builtin",
            Route::DelegatedAgent { .. } => "delegated_agent",
            Route::ExternalApi { .. } => "external_api",
        }
    }
}

impl From<ExecutionKind> for Route {
    fn from(kind: ExecutionKind) -> Self {
        match kind {
            ExecutionKind::Builtin { function } => Route::Builtin { function },
            ExecutionKind::DelegatedAgent { agent } => Route::DelegatedAgent { agent },
            ExecutionKind::ExternalApi { credentials } => Route::ExternalApi { credentials },
        }
    }
}

/// Result of route resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Dispatch(Route),
    /// The request cannot be routed and ends with this outcome
    Reject(Outcome),
}

/// Resolves routes and runs executors
#[derive(Clone)]
pub struct DispatchRouter {
    store: Arc<dyn ResourceStore>,
    trace: TraceContinuity,
    remote: Option<RemoteExecutor>,
    external: ExternalApiExecutor,
    metrics: Option<Arc<ReconcileMetrics>>,
}

impl DispatchRouter {
    pub fn new(store: Arc<dyn ResourceStore>, trace: TraceContinuity) -> Self {
        Self {
            external: ExternalApiExecutor::new(store.clone(), None),
            store,
            trace,
            remote: None,
            metrics: None,
        }
    }

    pub fn with_remote(
        mut self,
        manager: Arc<dyn RemoteCapabilityManager>,
        timeout: Duration,
    ) -> Self {
        self.remote = Some(RemoteExecutor::new(manager, timeout));
        self
    }

    pub fn with_external_api(mut self, resolver: Arc<dyn ExternalApiResolver>) -> Self {
        self.external = ExternalApiExecutor::new(self.store.clone(), Some(resolver));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ReconcileMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pick the executor for `request`.
    ///
    /// Remote-qualified names go to the capability manager when one is
    /// configured; everything else is resolved through the tool definition
    /// named by `toolRef`.
    pub async fn resolve(
        &self,
        request: &ToolCallRequest,
        target: &ToolTarget,
    ) -> Result<Resolution, ReconcileError> {
        if let (ToolTarget::Remote { server, tool }, Some(_)) = (target, &self.remote) {
            return Ok(Resolution::Dispatch(Route::Remote {
                server: server.clone(),
                tool: tool.clone(),
            }));
        }

        let definition_key = request.key().sibling(request.spec.tool_ref.name.clone());
        let Some(definition) = self.store.get_tool_definition(&definition_key).await? else {
            return Ok(Resolution::Reject(Outcome::invalid(
                detail::TOOL_NOT_FOUND,
                format!("tool definition {definition_key} not found"),
            )));
        };

        Ok(match definition.execution_kind() {
            Ok(kind) => Resolution::Dispatch(kind.into()),
            Err(err) => Resolution::Reject(Outcome::invalid(
                detail::UNKNOWN_TOOL_TYPE,
                err.to_string(),
            )),
        })
    }

    /// Run the executor for `route` under a child span of the request's trace
    pub async fn dispatch(
        &self,
        request: &ToolCallRequest,
        route: &Route,
        arguments: &Map<String, Value>,
    ) -> Result<Outcome, ReconcileError> {
        let mut span = self
            .trace
            .child(request.status.trace_context.as_ref(), "ToolCallRequest.dispatch");
        span.set_attribute("callgate.executor", route.kind());
        let timer = self
            .metrics
            .as_ref()
            .map(|metrics| metrics.start_dispatch(route.kind()));

        tracing::debug!(
            namespace = %request.metadata.namespace,
            name = %request.metadata.name,
            tool = %request.spec.tool_ref.name,
            executor = route.kind(),
            "Dispatching tool call"
        );

        let result = match route {
            Route::Remote { server, tool } => match &self.remote {
                Some(remote) => remote.execute(server, tool, arguments).await,
                None => Ok(Outcome::invalid(
                    detail::UNKNOWN_TOOL_TYPE,
                    "no remote capability manager is configured",
                )),
            },
            Route::Builtin { function } => builtin::execute(function, arguments),
            Route::DelegatedAgent { agent } => Ok(Outcome::invalid(
                detail::DELEGATION_NOT_SUPPORTED,
                format!("delegation to agent {agent} is not supported"),
            )),
            Route::ExternalApi { credentials } => {
                self.external
                    .execute(request, credentials.as_ref(), arguments)
                    .await
            }
        };

        let succeeded = matches!(result, Ok(Outcome::Succeeded { .. }));
        if let Some(timer) = timer {
            timer.finish(succeeded);
        }
        match &result {
            Ok(Outcome::Failed { error, .. }) => span.record_error(error),
            Err(err) => span.record_error(&err.to_string()),
            Ok(_) => {}
        }
        span.end();

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callgate_core::{
        ExecuteSpec, InMemoryStore, ObjectMeta, ToolCallSpec, ToolDefinition, ToolDefinitionSpec,
    };
    use callgate_tools::StaticCapabilityManager;

    fn request(tool: &str) -> ToolCallRequest {
        ToolCallRequest::new(
            ObjectMeta::new("default", "call-1"),
            ToolCallSpec::new(tool, "task-1", "{}"),
        )
    }

    fn router(store: &InMemoryStore) -> DispatchRouter {
        DispatchRouter::new(Arc::new(store.clone()), TraceContinuity::local())
    }

    #[tokio::test]
    async fn test_qualified_name_routes_remote_only_with_manager() {
        let store = InMemoryStore::new();
        let target = ToolTarget::parse("search__lookup");

        let without = router(&store).resolve(&request("search__lookup"), &target).await;
        assert!(matches!(
            without.unwrap(),
            Resolution::Reject(Outcome::Failed { ref detail, .. }) if detail == "tool definition not found"
        ));

        let with = router(&store)
            .with_remote(
                Arc::new(StaticCapabilityManager::new()),
                Duration::from_secs(1),
            )
            .resolve(&request("search__lookup"), &target)
            .await
            .unwrap();
        assert_eq!(
            with,
            Resolution::Dispatch(Route::Remote {
                server: "search".into(),
                tool: "lookup".into()
            })
        );
    }

    #[tokio::test]
    async fn test_definition_routes() {
        let store = InMemoryStore::new();
        store.insert_tool_definition(ToolDefinition::builtin("default", "add", "add"));
        store.insert_tool_definition(ToolDefinition::new(
            ObjectMeta::new("default", "broken"),
            ToolDefinitionSpec {
                tool_type: Some("mystery".into()),
                description: None,
                execute: ExecuteSpec::default(),
            },
        ));

        let resolution = router(&store)
            .resolve(&request("add"), &ToolTarget::parse("add"))
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Dispatch(Route::Builtin {
                function: "add".into()
            })
        );

        let resolution = router(&store)
            .resolve(&request("broken"), &ToolTarget::parse("broken"))
            .await
            .unwrap();
        assert!(matches!(
            resolution,
            Resolution::Reject(Outcome::Failed { ref detail, .. }) if detail == "unknown tool type"
        ));
    }

    #[tokio::test]
    async fn test_delegation_is_not_supported() {
        let store = InMemoryStore::new();
        let route: Route = ExecutionKind::DelegatedAgent {
            agent: "researcher".into(),
        }
        .into();

        let outcome = router(&store)
            .dispatch(&request("research"), &route, &Map::new())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Outcome::Failed { ref detail, .. } if detail == "delegation not supported"
        ));
    }

    #[tokio::test]
    async fn test_dispatch_records_metrics() {
        let store = InMemoryStore::new();
        let metrics = Arc::new(ReconcileMetrics::new("callgate_test").unwrap());
        let router = router(&store).with_metrics(metrics.clone());
        let args = serde_json::json!({"a": 6, "b": 7})
            .as_object()
            .cloned()
            .unwrap();

        router
            .dispatch(
                &request("multiply"),
                &Route::Builtin {
                    function: "multiply".into(),
                },
                &args,
            )
            .await
            .unwrap();
        assert_eq!(metrics.dispatch_count("builtin"), 1);
    }
}
