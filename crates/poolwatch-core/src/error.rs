//! Error types for the verification engine.
//!
//! The engine distinguishes hard failures (this module) from ordinary
//! not-found outcomes, which are values: `Option<LineMatch>`,
//! `SequenceOutcome::Failed`, `FleetResult::all_equal`. A `VerifyError`
//! always aborts the run it occurs in.

use poolwatch_exec::{ExecError, NodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    /// A non-transient error from the execution collaborator.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The remote search reply violated the `"<line>:<text>"` contract.
    #[error("malformed search reply for |{command}|: {output:?}")]
    MalformedSearchReply { command: String, output: String },

    /// The inferred upgrade order does not end with the coordinator.
    /// Later phase logic assumes the coordinator finishes last and
    /// performs the cluster-wide finalize, so this aborts immediately.
    #[error("last node in upgrade order is {actual}, expected coordinator {coordinator}")]
    CoordinatorNotLast { coordinator: NodeId, actual: NodeId },

    /// Sequence inference could not locate every participant; a partial
    /// order cannot be trusted.
    #[error("could not infer upgrade order: {reason}")]
    InferenceFailed { reason: String },

    /// A phase of the orchestration saga could not be verified.
    #[error("phase {phase} failed on {node}: pattern #{index} |{pattern}| not verified")]
    PhaseFailed {
        phase: String,
        node: NodeId,
        index: usize,
        pattern: String,
    },

    /// The coordinator was not observed rebooting when the plan required
    /// it to.
    #[error("reboot of {node} was not observed")]
    RebootNotObserved { node: NodeId },
}

/// Result type for verification engine operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
