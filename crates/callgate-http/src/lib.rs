//! # Callgate HTTP
//!
//! The process-facing HTTP surface of the controller: the inbound approval
//! callback, liveness and Prometheus metrics, plus environment configuration
//! and graceful shutdown for the `callgate serve` process.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod shutdown;

pub use config::{ConfigError, RuntimeConfig, RuntimeConfigBuilder};
pub use error::{ApiError, ApiErrorKind, ErrorResponse, REQUEST_ID_HEADER, RequestId};
pub use router::{AppState, router};
pub use server::{serve, serve_listener};
pub use shutdown::{cancel_on_signal, shutdown_signal};
