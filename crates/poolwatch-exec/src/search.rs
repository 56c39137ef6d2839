//! Typed log-search wire requests.
//!
//! The engine never formats raw command strings at call sites; it builds
//! one of the request values below and renders it here. This is the single
//! adapter that knows the wire form the remote side understands, and the
//! fakes reuse the inverse (`parse`) so tests exercise the exact same
//! contract.
//!
//! Wire contract: a search command returns zero or more lines of the form
//! `"<relativeLineNumber>:<matchedText>"`. No output means "not found this
//! round".

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How the search text is interpreted on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Exact substring match, no glob or regex expansion.
    Literal,

    /// Regex semantics.
    Regex,
}

/// Which occurrence a search resolves to within one round's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occurrence {
    First,
    Last,
}

/// One log search: read `file` from `from_line` onward, find `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSearchRequest {
    pub file: PathBuf,
    /// 1-based line offset the search starts from.
    pub from_line: u64,
    pub text: String,
    pub mode: MatchMode,
    pub occurrence: Occurrence,
}

impl LogSearchRequest {
    /// Render the request into the wire command form.
    pub fn to_command(&self) -> String {
        let fixed = match self.mode {
            MatchMode::Literal => "F",
            MatchMode::Regex => "",
        };
        let mut command = format!(
            "tail -n +{} '{}' | grep -n{} -- '{}'",
            self.from_line,
            self.file.display(),
            fixed,
            self.text
        );
        if self.occurrence == Occurrence::Last {
            command.push_str(" | tail -1");
        }
        command
    }

    /// Parse a rendered command back into a request. Returns `None` for
    /// commands that are not log searches.
    pub fn parse(command: &str) -> Option<Self> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^tail -n \+(\d+) '(.+?)' \| grep -n(F?) -- '(.*)'( \| tail -1)?$")
                .unwrap()
        });
        let caps = re.captures(command)?;
        let from_line: u64 = caps[1].parse().ok()?;
        let file = PathBuf::from(&caps[2]);
        let mode = if &caps[3] == "F" {
            MatchMode::Literal
        } else {
            MatchMode::Regex
        };
        let text = caps[4].to_string();
        let occurrence = if caps.get(5).is_some() {
            Occurrence::Last
        } else {
            Occurrence::First
        };
        Some(Self {
            file,
            from_line,
            text,
            mode,
            occurrence,
        })
    }
}

/// One log slice: read `lines` lines of `file` starting at `from_line`.
///
/// Used for block reads (action summaries) where the engine needs the raw
/// text below an already-located marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSliceRequest {
    pub file: PathBuf,
    /// 1-based line offset the slice starts from.
    pub from_line: u64,
    pub lines: u64,
}

impl LogSliceRequest {
    pub fn to_command(&self) -> String {
        format!(
            "tail -n +{} '{}' | head -n {}",
            self.from_line,
            self.file.display(),
            self.lines
        )
    }

    pub fn parse(command: &str) -> Option<Self> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE
            .get_or_init(|| Regex::new(r"^tail -n \+(\d+) '(.+?)' \| head -n (\d+)$").unwrap());
        let caps = re.captures(command)?;
        Some(Self {
            from_line: caps[1].parse().ok()?,
            file: PathBuf::from(&caps[2]),
            lines: caps[3].parse().ok()?,
        })
    }
}

/// Line count of a remote file, rendered the same way the other requests
/// are.
pub fn line_count_command(file: &Path) -> String {
    format!("cat '{}' | wc -l", file.display())
}
