//! Poolwatch-Exec: Remote Execution Boundary
//!
//! Everything the verification engine needs from the outside world lives
//! behind the traits in this crate: running a command on a node, probing
//! reachability, and reading per-node config keys. The engine issues
//! commands but never mutates node state; the maintenance actions it
//! observes are driven elsewhere.
//!
//! ## Key Components
//!
//! - `RemoteShell` / `Pinger` / `ConfigRegistry`: collaborator traits
//! - `LogSearchRequest` / `LogSliceRequest`: typed wire requests, with the
//!   single render/parse adapter that owns the remote command format
//! - `ExecError`: the transient-vs-fatal error taxonomy
//! - `fakes::FakeCluster`: in-memory implementation of all three traits

mod error;
pub mod fakes;
mod node;
pub mod search;
mod traits;

pub use error::{ExecError, ExecResult};
pub use node::{CommandOutput, NodeId};
pub use search::{line_count_command, LogSearchRequest, LogSliceRequest, MatchMode, Occurrence};
pub use traits::{ConfigRegistry, Pinger, RemoteShell};
