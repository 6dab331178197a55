use crate::error::ReconcileError;
use crate::projection::{Outcome, detail};
use callgate_core::{ResourceStore, SecretKeyRef, ToolCallRequest};
use callgate_tools::{ApiCredentials, ExternalApiResolver, FunctionCall, new_call_id};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Submits function calls to external APIs
#[derive(Clone)]
pub struct ExternalApiExecutor {
    store: Arc<dyn ResourceStore>,
    resolver: Option<Arc<dyn ExternalApiResolver>>,
}

impl ExternalApiExecutor {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        resolver: Option<Arc<dyn ExternalApiResolver>>,
    ) -> Self {
        Self { store, resolver }
    }

    /// Resolve credentials, then submit one `{fn, kwargs}` call.
    ///
    /// Credential and configuration problems end the request. Client
    /// resolution and call failures are returned uncommitted for redelivery.
    /// Acceptance ends the request as succeeded without a result.
    pub async fn execute(
        &self,
        request: &ToolCallRequest,
        credentials: Option<&SecretKeyRef>,
        arguments: &Map<String, Value>,
    ) -> Result<Outcome, ReconcileError> {
        let tool = request.spec.tool_ref.name.as_str();

        let credentials = match self.resolve_credentials(request, credentials).await? {
            Ok(credentials) => credentials,
            Err(rejection) => return Ok(rejection),
        };

        let Some(resolver) = self.resolver.as_ref() else {
            return Ok(Outcome::invalid(
                detail::EXTERNAL_API_NOT_CONFIGURED,
                format!("no external API client is configured for tool {tool}"),
            ));
        };

        let client = resolver.resolve_client(tool, &credentials).await?;
        let call = FunctionCall::from_arguments(tool, request.run_id(), arguments);
        let call_id = new_call_id();

        tracing::info!(
            namespace = %request.metadata.namespace,
            name = %request.metadata.name,
            tool,
            call_id = %call_id,
            function = %call.function,
            "Submitting external API call"
        );
        client.call(request.run_id(), &call_id, &call).await?;

        Ok(Outcome::succeeded(
            None,
            format!("external call {call_id} accepted"),
        ))
    }

    /// Read the API key named by `credentials`, or the validation failure
    async fn resolve_credentials(
        &self,
        request: &ToolCallRequest,
        credentials: Option<&SecretKeyRef>,
    ) -> Result<Result<ApiCredentials, Outcome>, ReconcileError> {
        let Some(reference) = credentials else {
            return Ok(Err(Outcome::invalid(
                detail::CREDENTIALS_NOT_FOUND,
                "tool definition references no credentials secret",
            )));
        };

        let secret_key = request.key().sibling(reference.name.clone());
        let Some(secret) = self.store.get_secret(&secret_key).await? else {
            return Ok(Err(Outcome::invalid(
                detail::CREDENTIALS_NOT_FOUND,
                format!("secret {secret_key} not found"),
            )));
        };

        match secret.data.get(&reference.key) {
            None => Ok(Err(Outcome::invalid(
                detail::CREDENTIALS_NOT_FOUND,
                format!("key {} not found in secret {secret_key}", reference.key),
            ))),
            Some(value) if value.trim().is_empty() => Ok(Err(Outcome::invalid(
                detail::EMPTY_CREDENTIALS,
                format!("key {} in secret {secret_key} is empty", reference.key),
            ))),
            Some(value) => Ok(Ok(ApiCredentials::new(reference.clone(), value.clone()))),
        }
    }
}
