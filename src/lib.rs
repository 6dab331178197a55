//! # Callgate
//!
//! A reconciling controller that drives agent tool calls from submission to a
//! terminal outcome, suspending remote calls on human approval when their
//! capability binding asks for it.
//!
//! This meta crate re-exports the workspace members:
//!
//! - [`model`]: resources, phase state machine, store and event contracts
//! - [`observability`]: logging, trace continuity and metrics
//! - [`tools`]: builtin functions and remote/external API collaborator contracts
//! - [`controller`]: reconcile coordinator, dispatch, approval and control loop
//! - [`http`]: approval callback, health and metrics endpoints

pub use callgate_controller as controller;
pub use callgate_core as model;
pub use callgate_http as http;
pub use callgate_observability as observability;
pub use callgate_tools as tools;

pub use callgate_controller::{
    CallbackService, Controller, ControllerConfig, ReconcileCoordinator, ReconcileError,
    ReconcileOutcome,
};
pub use callgate_core::{InMemoryStore, ObjectKey, Phase, ResourceStore, ToolCallRequest};
