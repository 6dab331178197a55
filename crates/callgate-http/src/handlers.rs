//! HTTP handlers
//!
//! - `POST /approvals/callback` applies a human decision to a suspended tool call
//! - `GET /health` reports liveness and version
//! - `GET /metrics` renders reconcile metrics in Prometheus text format

use axum::{
    Extension,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use callgate_controller::CallbackPayload;
use serde_json::{Value, json};

use crate::error::{ApiError, ApiErrorKind, RequestId};
use crate::router::AppState;

/// POST /approvals/callback
pub async fn approval_callback(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<CallbackPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::from_rejection(rejection, &request_id))?;

    let decision = payload
        .into_decision()
        .map_err(|err| ApiError::new(err, &request_id))?;

    tracing::info!(
        request_id = request_id.as_str(),
        run_id = %decision.run_id,
        approved = decision.approved,
        "Received approval callback"
    );

    state
        .callbacks
        .apply(&decision)
        .await
        .map_err(|err| ApiError::new(err, &request_id))?;

    Ok(Json(json!({ "status": "ok" })))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "callgate",
            "timestamp": chrono::Utc::now(),
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": state.started.elapsed().as_secs(),
        })),
    )
}

/// GET /metrics
pub async fn metrics_endpoint(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let Some(metrics) = state.metrics.as_ref() else {
        return Ok((
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            String::new(),
        )
            .into_response());
    };

    let body = metrics
        .render()
        .map_err(|e| ApiError::new(ApiErrorKind::Metrics(e.to_string()), &request_id))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
