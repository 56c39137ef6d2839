//! Poolwatch-Core: Log-Based Upgrade Verification Engine
//!
//! Verifies distributed maintenance actions on a storage pool cluster by
//! reading the logs those actions leave behind. The engine never drives
//! an action itself; it observes externally running upgrades through the
//! execution boundary in `poolwatch-exec` and decides whether each step
//! left the evidence it was supposed to.
//!
//! ## Key Components
//!
//! - `retry`: bounded probe loops ([`retry::wait_until`]); exhaustion is
//!   an outcome, not an error
//! - `command`: retrying remote command execution with a transient-error
//!   budget
//! - `matcher` / `sequence`: cursor-tracked log search and ordered
//!   multi-pattern verification
//! - `fleet`: same-operation-everywhere consistency checks
//! - `upgrade`: the orchestration verifier walking pre-check, per-node
//!   stop/apply/start phases, and cluster finalize

pub mod command;
pub mod error;
pub mod fleet;
pub mod matcher;
pub mod pattern;
pub mod reboot;
pub mod retry;
pub mod sequence;
pub mod summary;
pub mod upgrade;

pub use command::CommandRunner;
pub use error::{Result, VerifyError};
pub use fleet::{ConfigKeyReport, FleetChecker, FleetResult};
pub use matcher::LogMatcher;
pub use pattern::{Cursor, LineMatch, LogPattern};
pub use reboot::{wait_for_reachability, wait_for_reboot};
pub use retry::{wait_until, RetryPolicy, Waited};
pub use sequence::{SequenceOutcome, SequenceVerifier};
pub use summary::verify_action_summary;
pub use upgrade::{
    infer_order, CursorResetPolicy, PhaseRecord, UpgradePlan, UpgradeReport, UpgradeSequence,
    UpgradeVerifier,
};
