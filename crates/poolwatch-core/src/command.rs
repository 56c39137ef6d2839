//! Remote command execution with bounded retries.
//!
//! Transport hiccups (dropped channels, refused connections) count as one
//! consumed attempt and the loop continues; anything else propagates
//! immediately as fatal.

use tracing::{info, warn};

use poolwatch_exec::{ExecError, NodeId, RemoteShell};

use crate::error::Result;
use crate::retry::{wait_until, RetryPolicy};

/// Success predicate over command output.
pub type AcceptFn<'p> = &'p (dyn Fn(&str) -> bool + Sync);

/// Retrying command runner over a [`RemoteShell`].
pub struct CommandRunner<'a> {
    shell: &'a dyn RemoteShell,
}

impl<'a> CommandRunner<'a> {
    pub fn new(shell: &'a dyn RemoteShell) -> Self {
        Self { shell }
    }

    /// Run `command` on `node` until `accept` approves its output or the
    /// policy is exhausted. `accept` defaults to "non-empty output".
    ///
    /// Returns `Ok(None)` on exhaustion; only fatal collaborator errors
    /// become `Err`.
    pub async fn run_until_success(
        &self,
        node: &NodeId,
        command: &str,
        accept: Option<AcceptFn<'_>>,
        policy: &RetryPolicy,
    ) -> Result<Option<String>> {
        info!(node = %node, command = %command, "running until success");
        let shell = self.shell;
        let probe = || async move {
            match shell.execute(node, command).await {
                Ok(out) => {
                    let ok = match accept {
                        Some(f) => f(&out.output),
                        None => !out.output.is_empty(),
                    };
                    Ok(if ok { Some(out.output) } else { None })
                }
                Err(e) if e.is_transient() => {
                    warn!(node = %node, error = %e, "transient transport error, retrying");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        };
        // A fatal error also terminates the wait; it is unpacked below.
        let waited = wait_until(probe, Self::is_settled, policy, false).await;
        match waited.last {
            Some(Ok(Some(output))) => Ok(Some(output)),
            Some(Err(e)) => Err(e.into()),
            _ => Ok(None),
        }
    }

    /// Race a set of candidate commands: within each retry round, try them
    /// sequentially and return the first whose output is non-empty, paired
    /// with its index. One sleep per round, not per candidate.
    ///
    /// Useful when the exact variant of a command differs by build and
    /// only one will exist.
    pub async fn run_until_either(
        &self,
        node: &NodeId,
        commands: &[String],
        policy: &RetryPolicy,
    ) -> Result<Option<(usize, String)>> {
        info!(node = %node, candidates = commands.len(), "running until either succeeds");
        let shell = self.shell;
        let probe = || async move {
            for (index, command) in commands.iter().enumerate() {
                match shell.execute(node, command).await {
                    Ok(out) if !out.output.is_empty() => {
                        return Ok(Some((index, out.output)));
                    }
                    Ok(_) => continue,
                    Err(e) if e.is_transient() => {
                        warn!(node = %node, error = %e, "transient transport error, next candidate");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(None)
        };
        let waited = wait_until(probe, Self::is_settled, policy, false).await;
        match waited.last {
            Some(Ok(Some(hit))) => Ok(Some(hit)),
            Some(Err(e)) => Err(e.into()),
            _ => Ok(None),
        }
    }

    fn is_settled<T>(probed: &std::result::Result<Option<T>, ExecError>) -> bool {
        !matches!(probed, Ok(None))
    }
}
