//! # Callgate Tools
//!
//! Executors' building blocks for the tool kinds a tool call can target:
//!
//! - **Builtin** ([`builtin`]): a fixed registry of arithmetic functions over
//!   two coercible operands
//! - **Remote capability** ([`remote`]): the contract for invoking a tool on a
//!   remote capability server, plus a static in-process implementation
//! - **External API** ([`external`]): client resolution and call contracts,
//!   and synthesis of the `{fn, kwargs}` function-call payload
//!
//! Network clients are not part of this crate; deployments plug their own
//! implementations in through the collaborator traits.

/// Builtin arithmetic functions and operand coercion.
pub mod builtin;
/// External API collaborator contracts and payload synthesis.
pub mod external;
/// Remote capability server collaborator contract.
pub mod remote;

pub use builtin::{BuiltinError, BuiltinFunction, format_result};
pub use external::{
    ApiCredentials, ExternalApiClient, ExternalApiError, ExternalApiResolver, FunctionCall,
    HUMAN_APPROVAL_TOOL, RecordedCall, RecordingExternalApi, new_call_id,
};
pub use remote::{RemoteCallError, RemoteCapabilityManager, StaticCapabilityManager};
