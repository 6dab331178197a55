//! HTTP router configuration

use axum::{
    Router, middleware,
    routing::{get, post},
};
use callgate_controller::CallbackService;
use callgate_observability::ReconcileMetrics;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::RuntimeConfig;
use crate::error::request_id_middleware;
use crate::handlers::{approval_callback, health_check, metrics_endpoint};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub callbacks: CallbackService,
    pub metrics: Option<Arc<ReconcileMetrics>>,
    pub started: Instant,
}

impl AppState {
    pub fn new(callbacks: CallbackService) -> Self {
        Self {
            callbacks,
            metrics: None,
            started: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ReconcileMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Build the router with all endpoints and middleware
pub fn router(state: AppState, config: &RuntimeConfig) -> Router {
    Router::new()
        .route("/approvals/callback", post(approval_callback))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}
