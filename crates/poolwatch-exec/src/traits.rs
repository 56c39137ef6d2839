//! Collaborator trait definitions for poolwatch
//!
//! These traits define the external interfaces the verification engine
//! depends on:
//! - `RemoteShell`: run a command on a node, get text output back
//! - `Pinger`: reachability probe for reboot observation
//! - `ConfigRegistry`: per-node configuration/registry key access
//!
//! All traits are async and transport-agnostic. The engine never mutates
//! node state through them; state-changing actions belong to the external
//! orchestrator being observed. In-memory fakes are provided for testing
//! via the `fakes` module.

use async_trait::async_trait;

use crate::error::ExecResult;
use crate::node::{CommandOutput, NodeId};

/// Remote command execution.
///
/// Guarantees:
/// - Commands run to completion before `execute` returns; there is no
///   streaming or backgrounding at this boundary.
/// - Output is line-oriented text; no structured contract is assumed.
/// - Transport failures surface as transient `ExecError`s.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `command` on `node` and return its output.
    async fn execute(&self, node: &NodeId, command: &str) -> ExecResult<CommandOutput>;
}

/// Host reachability probe.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Whether the node currently answers pings.
    ///
    /// Implementations may either return `Ok(false)` or raise
    /// `ExecError::HostUnreachable` for a dead host; callers treat both
    /// as a normal negative probe result.
    async fn ping(&self, node: &NodeId) -> ExecResult<bool>;
}

/// Per-node configuration/registry key access.
#[async_trait]
pub trait ConfigRegistry: Send + Sync {
    /// Whether `key` exists under `kind` on the node.
    async fn exists(&self, node: &NodeId, kind: &str, key: &str) -> ExecResult<bool>;

    /// Read the value of `key` under `kind`. Fails with
    /// `ExecError::KeyNotFound` if the key is absent.
    async fn read(&self, node: &NodeId, kind: &str, key: &str) -> ExecResult<String>;
}
