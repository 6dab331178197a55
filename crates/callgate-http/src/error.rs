//! Error responses and request ids
//!
//! Every error leaves the HTTP surface as a JSON [`ErrorResponse`] carrying
//! the request id that [`request_id_middleware`] assigned to the request.

use axum::{
    extract::{Request, rejection::JsonRejection},
    http::{
        StatusCode,
        header::{HeaderName, HeaderValue},
    },
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use callgate_controller::CallbackError;
use serde::{Deserialize, Serialize};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Maximum length for client-provided request IDs
const MAX_REQUEST_ID_LENGTH: usize = 128;

/// Request id stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Only alphanumerics, hyphens and underscores; keeps ids safe to log.
fn validate_request_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_REQUEST_ID_LENGTH
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Reuse a valid `x-request-id` header or generate one, and echo it back
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| validate_request_id(s))
        .map(|s| RequestId(s.to_string()))
        .unwrap_or_else(RequestId::generate);

    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// JSON body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// What went wrong while serving a request
#[derive(Debug, thiserror::Error)]
pub enum ApiErrorKind {
    #[error("{message}")]
    InvalidBody { status: StatusCode, message: String },

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error("metrics unavailable: {0}")]
    Metrics(String),
}

/// An [`ApiErrorKind`] tagged with the request it belongs to
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: Option<RequestId>,
}

impl ApiError {
    pub fn new(kind: impl Into<ApiErrorKind>, request_id: &RequestId) -> Self {
        Self {
            kind: kind.into(),
            request_id: Some(request_id.clone()),
        }
    }

    pub fn from_rejection(rejection: JsonRejection, request_id: &RequestId) -> Self {
        Self::new(
            ApiErrorKind::InvalidBody {
                status: rejection.status(),
                message: rejection.body_text(),
            },
            request_id,
        )
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::InvalidBody { status, .. } => *status,
            ApiErrorKind::Callback(err) => match err {
                CallbackError::MissingDecision(_) | CallbackError::InvalidRunId { .. } => {
                    StatusCode::BAD_REQUEST
                }
                CallbackError::NotFound(_) => StatusCode::NOT_FOUND,
                CallbackError::NotAwaitingApproval { .. } => StatusCode::CONFLICT,
                CallbackError::ConflictRetriesExhausted { .. } | CallbackError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiErrorKind::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match &self.kind {
            ApiErrorKind::InvalidBody { .. } => "invalid_body",
            ApiErrorKind::Callback(err) => err.error_code(),
            ApiErrorKind::Metrics(_) => "metrics_unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.kind, code = self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self.kind, code = self.code(), "Request rejected");
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.kind.to_string(),
            request_id: self.request_id.map(|id| id.0),
        };
        (status, Json(body)).into_response()
    }
}
