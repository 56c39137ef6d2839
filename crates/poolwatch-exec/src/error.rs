//! Error types for the remote execution boundary.

use crate::node::NodeId;
use thiserror::Error;

/// Errors raised by the execution collaborators.
///
/// The taxonomy matters more than the variants: transient transport
/// hiccups are retried by the engine (they consume one retry attempt),
/// everything else aborts the run. `is_transient` is the single branch
/// retry loops are allowed to consult.
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// The transport channel dropped mid-command.
    #[error("transport channel dropped on {node}: {reason}")]
    ChannelDropped { node: NodeId, reason: String },

    /// Could not establish a connection to the node.
    #[error("no valid connection to {node}: {reason}")]
    ConnectionFailed { node: NodeId, reason: String },

    /// The host did not respond to a reachability probe.
    #[error("host {0} not reachable")]
    HostUnreachable(NodeId),

    /// The node is not part of the fleet the collaborator knows about.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// The remote command itself failed in a way that is not a transport
    /// problem (bad invocation, permission denied, missing binary).
    #[error("command failed on {node}: {reason}")]
    CommandFailed { node: NodeId, reason: String },

    /// A registry/config key was read without checking existence first.
    #[error("config key {kind}:{key} not present on {node}")]
    KeyNotFound {
        node: NodeId,
        kind: String,
        key: String,
    },
}

impl ExecError {
    /// Whether a retry loop may swallow this error and probe again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecError::ChannelDropped { .. }
                | ExecError::ConnectionFailed { .. }
                | ExecError::HostUnreachable(_)
        )
    }
}

/// Result type for execution collaborator operations.
pub type ExecResult<T> = std::result::Result<T, ExecError>;
