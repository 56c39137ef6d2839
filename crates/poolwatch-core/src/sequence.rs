//! Ordered multi-pattern sequence verification.
//!
//! The lines under verification are produced by a process executing in a
//! known order, so ordering is a hard requirement: each pattern must be
//! found at or after the previous match point, and the first miss aborts
//! the scan.

use tracing::{error, info};

use poolwatch_exec::RemoteShell;

use crate::error::Result;
use crate::matcher::LogMatcher;
use crate::pattern::{Cursor, LogPattern};

/// Outcome of verifying an ordered pattern list.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
    /// Every pattern matched in order; the cursor sits at the last match.
    Verified(Cursor),

    /// The pattern at `index` could not be found after the previous match
    /// point. Later patterns were not probed.
    Failed { index: usize, pattern: String },
}

impl SequenceOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, SequenceOutcome::Verified(_))
    }

    /// The advanced cursor, if verification succeeded.
    pub fn cursor(self) -> Option<Cursor> {
        match self {
            SequenceOutcome::Verified(cursor) => Some(cursor),
            SequenceOutcome::Failed { .. } => None,
        }
    }
}

/// Verifier for ordered pattern sequences in one remote log.
pub struct SequenceVerifier<'a> {
    matcher: LogMatcher<'a>,
}

impl<'a> SequenceVerifier<'a> {
    pub fn new(shell: &'a dyn RemoteShell) -> Self {
        Self {
            matcher: LogMatcher::new(shell),
        }
    }

    /// Verify that every pattern appears in order, each at or after the
    /// previous match's line. Returns the advanced cursor on full success
    /// so callers can chain phases without re-scanning matched regions.
    pub async fn verify_all(
        &self,
        mut cursor: Cursor,
        patterns: &[LogPattern],
    ) -> Result<SequenceOutcome> {
        for (index, pattern) in patterns.iter().enumerate() {
            match self.matcher.find(&cursor, pattern).await? {
                Some(found) => {
                    cursor = cursor.advanced_to(found.line);
                }
                None => {
                    error!(
                        node = %cursor.node,
                        index,
                        pattern = %pattern.text,
                        "sequence verification failed"
                    );
                    return Ok(SequenceOutcome::Failed {
                        index,
                        pattern: pattern.text.clone(),
                    });
                }
            }
        }
        info!(
            node = %cursor.node,
            patterns = patterns.len(),
            line = cursor.line,
            "all patterns verified"
        );
        Ok(SequenceOutcome::Verified(cursor))
    }
}
