//! Qualified tool name parsing
//!
//! Tools hosted by a remote capability server are addressed as
//! `<serverName>__<toolName>`. Only names with exactly two non-empty
//! segments qualify; everything else is a plain local tool name.

use std::fmt;

/// Separator between server and tool in a qualified name
pub const QUALIFIED_SEPARATOR: &str = "__";

/// Where a tool name points
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolTarget {
    /// Tool hosted by the named remote capability server
    Remote { server: String, tool: String },
    /// Tool resolved through a local tool definition
    Local(String),
}

impl ToolTarget {
    /// Parse a tool reference name
    ///
    /// ```rust
    /// use callgate_core::ToolTarget;
    ///
    /// assert_eq!(
    ///     ToolTarget::parse("search__lookup"),
    ///     ToolTarget::Remote { server: "search".into(), tool: "lookup".into() }
    /// );
    /// assert!(!ToolTarget::parse("lookup").is_remote());
    /// assert!(!ToolTarget::parse("a__b__c").is_remote());
    /// ```
    pub fn parse(name: &str) -> Self {
        let segments: Vec<&str> = name.split(QUALIFIED_SEPARATOR).collect();
        match segments.as_slice() {
            [server, tool] if !server.is_empty() && !tool.is_empty() => ToolTarget::Remote {
                server: (*server).to_string(),
                tool: (*tool).to_string(),
            },
            _ => ToolTarget::Local(name.to_string()),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ToolTarget::Remote { .. })
    }
}

impl fmt::Display for ToolTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolTarget::Remote { server, tool } => {
                write!(f, "{server}{QUALIFIED_SEPARATOR}{tool}")
            }
            ToolTarget::Local(name) => f.write_str(name),
        }
    }
}
