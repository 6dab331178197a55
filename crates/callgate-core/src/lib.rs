//! # Callgate Core
//!
//! Core domain model and storage contracts for the Callgate tool-call
//! controller. This crate holds everything the reconcile loop and the
//! approval callback share:
//!
//! - **Resources**: [`ToolCallRequest`], [`ToolDefinition`],
//!   [`RemoteCapabilityBinding`], [`Secret`] and [`ExecutionRecord`]
//! - **Lifecycle**: the explicit [`Phase`] state machine and its transition table
//! - **Naming**: qualified `<server>__<tool>` name parsing ([`ToolTarget`])
//! - **Contracts**: [`ResourceStore`] and [`EventRecorder`], plus in-memory
//!   implementations used by tests and the CLI

pub mod definition;
pub mod error;
pub mod events;
pub mod identifiers;
pub mod in_memory;
pub mod phase;
pub mod request;
pub mod store;
pub mod tool_name;

pub use definition::{
    AgentRef, BuiltinRef, ExecuteSpec, ExecutionKind, ExecutionRecord, ExternalApiRef,
    RemoteCapabilityBinding, RemoteCapabilityBindingSpec, Secret, SecretKeyRef, ToolDefinition,
    ToolDefinitionSpec,
};
pub use error::{DefinitionError, KeyError, StoreError, StoreResult};
pub use events::{
    Event, EventRecorder, EventType, InMemoryEventRecorder, TracingEventRecorder,
};
pub use identifiers::{LocalObjectRef, ObjectKey, ObjectMeta};
pub use in_memory::InMemoryStore;
pub use phase::{InvalidTransition, Phase, PhaseEvent, ReconcileAction, SkipReason};
pub use request::{
    StatusText, ToolCallRequest, ToolCallSpec, ToolCallStatus, TraceContext,
};
pub use store::{EXECUTION_RECORD_LABEL, ResourceStore};
pub use tool_name::ToolTarget;
