//! Object identity for stored resources
//!
//! Every resource the controller touches is addressed by a namespace and a
//! name. [`ObjectKey`] is that address; [`ObjectMeta`] carries it together with
//! labels and the optimistic-concurrency version assigned by the store.
//!
//! # Validation Rules
//!
//! Keys parsed from untrusted input (CLI arguments, callback payloads) must:
//! - Be non-empty and at most [`MAX_NAME_LENGTH`] characters per segment
//! - Contain only alphanumeric characters, hyphens (`-`), underscores (`_`)
//!   and dots (`.`)
//! - Not start or end with whitespace

use crate::error::KeyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Maximum length of a namespace or name segment
pub const MAX_NAME_LENGTH: usize = 253;

/// Namespace used when a key is given without one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace + name address of a stored resource
///
/// # Examples
///
/// ```rust
/// use callgate_core::ObjectKey;
///
/// let key: ObjectKey = "team-a/fetch-weather-1".parse().unwrap();
/// assert_eq!(key.namespace(), "team-a");
/// assert_eq!(key.name(), "fetch-weather-1");
///
/// let bare: ObjectKey = "fetch-weather-1".parse().unwrap();
/// assert_eq!(bare.namespace(), "default");
///
/// assert!("team-a/".parse::<ObjectKey>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    /// Build a key from trusted parts without validation
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse and validate a key of the form `namespace/name` or `name`
    pub fn parse(input: impl AsRef<str>) -> Result<Self, KeyError> {
        let input = input.as_ref();
        match input.split_once('/') {
            Some((namespace, name)) => Ok(Self {
                namespace: validate_segment(namespace)?.to_string(),
                name: validate_segment(name)?.to_string(),
            }),
            None => Ok(Self {
                namespace: DEFAULT_NAMESPACE.to_string(),
                name: validate_segment(input)?.to_string(),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of a sibling resource in the same namespace
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.namespace.clone(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn validate_segment(segment: &str) -> Result<&str, KeyError> {
    if segment.is_empty() {
        return Err(KeyError::Empty);
    }
    if segment.len() > MAX_NAME_LENGTH {
        return Err(KeyError::TooLong {
            length: segment.len(),
            max: MAX_NAME_LENGTH,
        });
    }
    if let Some(invalid) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(KeyError::InvalidCharacter {
            segment: segment.to_string(),
            character: invalid,
        });
    }
    Ok(segment)
}

/// Reference to another resource in the same namespace
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocalObjectRef {
    pub name: String,
}

impl LocalObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Identity, labels and store version of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Version stamped by the store on every write; compared on status commits
    #[serde(default)]
    pub resource_version: u64,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            resource_version: 0,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_namespaced_key() {
        let key = ObjectKey::parse("ops/deploy-check").unwrap();
        assert_eq!(key.namespace(), "ops");
        assert_eq!(key.name(), "deploy-check");
        assert_eq!(key.to_string(), "ops/deploy-check");
    }

    #[test]
    fn test_parse_bare_name_uses_default_namespace() {
        let key = ObjectKey::parse("search__lookup-7").unwrap();
        assert_eq!(key.namespace(), DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_parse_rejects_invalid_keys() {
        assert!(matches!(ObjectKey::parse(""), Err(KeyError::Empty)));
        assert!(matches!(ObjectKey::parse("ns/"), Err(KeyError::Empty)));
        assert!(matches!(
            ObjectKey::parse("ns/a b"),
            Err(KeyError::InvalidCharacter { character: ' ', .. })
        ));
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            ObjectKey::parse(&long),
            Err(KeyError::TooLong { .. })
        ));
    }

    #[test]
    fn test_sibling_keeps_namespace() {
        let key = ObjectKey::new("ops", "call-1");
        assert_eq!(key.sibling("calculator"), ObjectKey::new("ops", "calculator"));
    }
}
