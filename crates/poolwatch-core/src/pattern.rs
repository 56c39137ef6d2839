//! Log pattern, cursor, and match value types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use poolwatch_exec::{MatchMode, NodeId, Occurrence};

use crate::retry::RetryPolicy;

/// One expected log occurrence: the text, how it matches, which occurrence
/// resolves, and the retry budget spent waiting for it to be written.
///
/// Immutable once constructed; matching never mutates a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPattern {
    pub text: String,
    pub mode: MatchMode,
    pub occurrence: Occurrence,
    pub retry: RetryPolicy,
}

impl LogPattern {
    /// Exact-substring pattern with the default retry policy.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: MatchMode::Literal,
            occurrence: Occurrence::First,
            retry: RetryPolicy::default(),
        }
    }

    /// Regex pattern with the default retry policy.
    pub fn regex(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: MatchMode::Regex,
            occurrence: Occurrence::First,
            retry: RetryPolicy::default(),
        }
    }

    /// Resolve to the last occurrence within a round's output instead of
    /// the first.
    pub fn last(mut self) -> Self {
        self.occurrence = Occurrence::Last;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

/// How far a log has been scanned: the next search starts at `line`
/// (1-based) of `file` on `node`.
///
/// A cursor is an owned value threaded through each call; callers get an
/// advanced cursor back instead of sharing mutable state. Within one
/// verification run `line` never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub node: NodeId,
    pub file: PathBuf,
    pub line: u64,
}

impl Cursor {
    /// Cursor at the top of a file.
    pub fn start(node: NodeId, file: impl Into<PathBuf>) -> Self {
        Self {
            node,
            file: file.into(),
            line: 1,
        }
    }

    /// Cursor at an explicit line offset.
    pub fn at(node: NodeId, file: impl Into<PathBuf>, line: u64) -> Self {
        Self {
            node,
            file: file.into(),
            line: line.max(1),
        }
    }

    /// The same position in a different file on the same node.
    pub fn in_file(&self, file: &Path, line: u64) -> Self {
        Self {
            node: self.node.clone(),
            file: file.to_path_buf(),
            line: line.max(1),
        }
    }

    /// Advance to an absolute line. Positions never move backwards.
    pub fn advanced_to(&self, line: u64) -> Self {
        Self {
            node: self.node.clone(),
            file: self.file.clone(),
            line: line.max(self.line),
        }
    }
}

/// A found log line: absolute 1-based line number plus the full matched
/// text. The not-found sentinel is `Option::None` at the call sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatch {
    pub line: u64,
    pub text: String,
}
