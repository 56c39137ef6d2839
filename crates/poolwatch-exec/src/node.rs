//! Node identity and command output types.

use serde::{Deserialize, Serialize};

/// Opaque identity of a remote cluster node.
///
/// The connection capability behind a node (SSH session, channel pool)
/// belongs to whatever implements [`crate::RemoteShell`]; the verification
/// engine only ever holds the identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        NodeId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// Line-oriented text result of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured stdout.
    pub output: String,

    /// Exit code (0 = success).
    pub exit_code: i32,
}

impl CommandOutput {
    /// A successful command that produced the given text.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: 0,
        }
    }

    /// A successful command that produced nothing.
    pub fn empty() -> Self {
        Self::text("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let node = NodeId::new("ma1.pool.local");
        assert_eq!(node.to_string(), "ma1.pool.local");
        assert_eq!(node.as_str(), "ma1.pool.local");
    }

    #[test]
    fn test_command_output_constructors() {
        assert_eq!(CommandOutput::empty().output, "");
        assert_eq!(CommandOutput::empty().exit_code, 0);
        assert_eq!(CommandOutput::text("x").output, "x");
    }
}
