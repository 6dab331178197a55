//! # Error Types
//!
//! Domain-specific failures shared by the store, the definition resolver and
//! key parsing.

use crate::identifiers::ObjectKey;
use thiserror::Error;

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a [`ResourceStore`](crate::ResourceStore)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The object being committed no longer exists
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    /// Compare-and-commit rejected a write against a stale read
    #[error("conflict committing {key}: read version {expected}, stored version {actual}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    /// The backing store could not serve the request
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether re-reading and retrying the operation may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors produced while parsing an [`ObjectKey`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("name must not be empty")]
    Empty,

    #[error("name is {length} characters, maximum is {max}")]
    TooLong { length: usize, max: usize },

    #[error("invalid character {character:?} in {segment:?}")]
    InvalidCharacter { segment: String, character: char },
}

/// A tool definition that does not name exactly one valid execution kind
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("unknown tool type {0:?}")]
    UnknownToolType(String),

    #[error("tool definition declares no execution kind")]
    MissingExecutionKind,

    #[error("tool definition declares more than one execution kind: {0:?}")]
    AmbiguousExecutionKind(Vec<&'static str>),

    #[error("tool type {declared:?} does not match configured execution kind {configured:?}")]
    ToolTypeMismatch {
        declared: String,
        configured: &'static str,
    },
}
