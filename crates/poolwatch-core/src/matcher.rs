//! Cursor-tracked remote log search.
//!
//! The target text may not have been written yet by the externally running
//! process, so every find is driven through the retrying command runner
//! with the pattern's own policy.

use std::path::Path;

use tracing::{info, warn};

use poolwatch_exec::{line_count_command, LogSearchRequest, NodeId, RemoteShell};

use crate::command::CommandRunner;
use crate::error::{Result, VerifyError};
use crate::pattern::{Cursor, LineMatch, LogPattern};

/// Remote log searcher over a [`RemoteShell`].
pub struct LogMatcher<'a> {
    shell: &'a dyn RemoteShell,
}

impl<'a> LogMatcher<'a> {
    pub fn new(shell: &'a dyn RemoteShell) -> Self {
        Self { shell }
    }

    /// Find `pattern` in the cursor's file, searching from the cursor's
    /// line onward. Returns the absolute line number and full matched
    /// text, or `None` if the pattern never appeared within the pattern's
    /// retry budget.
    pub async fn find(&self, cursor: &Cursor, pattern: &LogPattern) -> Result<Option<LineMatch>> {
        let request = LogSearchRequest {
            file: cursor.file.clone(),
            from_line: cursor.line,
            text: pattern.text.clone(),
            mode: pattern.mode,
            occurrence: pattern.occurrence,
        };
        let command = request.to_command();
        let runner = CommandRunner::new(self.shell);
        let output = runner
            .run_until_success(&cursor.node, &command, None, &pattern.retry)
            .await?;
        let Some(output) = output else {
            warn!(
                node = %cursor.node,
                text = %pattern.text,
                from_line = cursor.line,
                "pattern not found within retry budget"
            );
            return Ok(None);
        };
        let found = Self::decode_reply(&command, &output, cursor.line)?;
        info!(
            node = %cursor.node,
            text = %pattern.text,
            line = found.line,
            "found pattern"
        );
        Ok(Some(found))
    }

    /// Find whichever of several alternative patterns appears first,
    /// returning its index alongside the match. All candidates are probed
    /// within each retry round; the first pattern's retry policy bounds
    /// the rounds.
    ///
    /// Used when either of two mutually exclusive log phrases is valid
    /// evidence of progress.
    pub async fn find_either(
        &self,
        cursor: &Cursor,
        patterns: &[LogPattern],
    ) -> Result<Option<(usize, LineMatch)>> {
        let Some(first) = patterns.first() else {
            return Ok(None);
        };
        let commands: Vec<String> = patterns
            .iter()
            .map(|pattern| {
                LogSearchRequest {
                    file: cursor.file.clone(),
                    from_line: cursor.line,
                    text: pattern.text.clone(),
                    mode: pattern.mode,
                    occurrence: pattern.occurrence,
                }
                .to_command()
            })
            .collect();
        let runner = CommandRunner::new(self.shell);
        let hit = runner
            .run_until_either(&cursor.node, &commands, &first.retry)
            .await?;
        let Some((index, output)) = hit else {
            warn!(
                node = %cursor.node,
                candidates = patterns.len(),
                from_line = cursor.line,
                "no candidate pattern found within retry budget"
            );
            return Ok(None);
        };
        let found = Self::decode_reply(&commands[index], &output, cursor.line)?;
        info!(
            node = %cursor.node,
            text = %patterns[index].text,
            line = found.line,
            "found candidate pattern"
        );
        Ok(Some((index, found)))
    }

    /// Number of lines currently in a remote file. Used to position a
    /// cursor at end-of-log before the observed action starts writing.
    pub async fn line_count(&self, node: &NodeId, file: &Path) -> Result<u64> {
        let command = line_count_command(file);
        let output = self.shell.execute(node, &command).await?;
        output
            .output
            .trim()
            .parse()
            .map_err(|_| VerifyError::MalformedSearchReply {
                command,
                output: output.output,
            })
    }

    /// Decode one `"<relative>:<text>"` reply line into an absolute match.
    fn decode_reply(command: &str, output: &str, from_line: u64) -> Result<LineMatch> {
        let malformed = || VerifyError::MalformedSearchReply {
            command: command.to_string(),
            output: output.to_string(),
        };
        // Occurrence::Last is already reduced to a single line remotely;
        // for First the reply may carry every match, so take the first.
        let reply_line = output.lines().next().ok_or_else(malformed)?;
        let (relative, text) = reply_line.split_once(':').ok_or_else(malformed)?;
        let relative: u64 = relative.parse().map_err(|_| malformed())?;
        if relative == 0 {
            return Err(malformed());
        }
        Ok(LineMatch {
            line: relative + from_line - 1,
            text: text.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolwatch_exec::fakes::FakeCluster;
    use poolwatch_exec::CommandOutput;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::retry::RetryPolicy;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::attempts(attempts).with_interval(Duration::ZERO)
    }

    fn cluster(node: &NodeId, file: &Path, lines: &[&str]) -> FakeCluster {
        let cluster = FakeCluster::new();
        cluster.add_node(node);
        cluster.load_log(node, file, lines);
        cluster
    }

    #[tokio::test]
    async fn test_find_reports_absolute_line() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/driver.log");
        let fake = cluster(&node, &file, &["one", "two", "target here", "four"]);

        let matcher = LogMatcher::new(&fake);
        let cursor = Cursor::at(node.clone(), &file, 2);
        let found = matcher
            .find(&cursor, &LogPattern::literal("target").retry(fast(1)))
            .await
            .unwrap()
            .expect("should match");
        assert_eq!(found.line, 3);
        assert_eq!(found.text, "target here");
    }

    #[tokio::test]
    async fn test_find_last_occurrence() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/driver.log");
        let fake = cluster(&node, &file, &["A", "B", "A"]);

        let matcher = LogMatcher::new(&fake);
        let cursor = Cursor::start(node.clone(), &file);
        let found = matcher
            .find(&cursor, &LogPattern::literal("A").last().retry(fast(1)))
            .await
            .unwrap()
            .expect("should match");
        // The second "A", not the first.
        assert_eq!(found.line, 3);
    }

    #[tokio::test]
    async fn test_find_retries_until_line_is_written() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/driver.log");
        let fake = cluster(&node, &file, &["early noise", "service stopped"]);

        // First round sees nothing; the fall-through to the stored log
        // models the line being written between rounds.
        let pattern = LogPattern::literal("service stopped").retry(fast(3));
        let command = LogSearchRequest {
            file: file.clone(),
            from_line: 1,
            text: pattern.text.clone(),
            mode: pattern.mode,
            occurrence: pattern.occurrence,
        }
        .to_command();
        fake.script_reply(&node, &command, Ok(CommandOutput::empty()));

        let matcher = LogMatcher::new(&fake);
        let cursor = Cursor::start(node.clone(), &file);
        let found = matcher.find(&cursor, &pattern).await.unwrap();
        assert_eq!(found.map(|m| m.line), Some(2));
        assert_eq!(fake.times_executed(&node, &command), 2);
    }

    #[tokio::test]
    async fn test_find_not_found_is_a_value() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/driver.log");
        let fake = cluster(&node, &file, &["nothing relevant"]);

        let matcher = LogMatcher::new(&fake);
        let cursor = Cursor::start(node.clone(), &file);
        let found = matcher
            .find(&cursor, &LogPattern::literal("absent").retry(fast(2)))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_either_reports_which_pattern() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/driver.log");
        let fake = cluster(&node, &file, &["packages already up to date"]);

        let matcher = LogMatcher::new(&fake);
        let cursor = Cursor::start(node.clone(), &file);
        let hit = matcher
            .find_either(
                &cursor,
                &[
                    LogPattern::literal("upgrade succeeded").retry(fast(2)),
                    LogPattern::literal("already up to date").retry(fast(2)),
                ],
            )
            .await
            .unwrap();
        let (index, found) = hit.expect("should match an alternative");
        assert_eq!(index, 1);
        assert_eq!(found.line, 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_fatal() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/driver.log");
        let fake = FakeCluster::new();
        fake.add_node(&node);

        let pattern = LogPattern::literal("x").retry(fast(1));
        let command = LogSearchRequest {
            file: file.clone(),
            from_line: 1,
            text: "x".to_string(),
            mode: pattern.mode,
            occurrence: pattern.occurrence,
        }
        .to_command();
        fake.script_reply(&node, &command, Ok(CommandOutput::text("no line number")));

        let matcher = LogMatcher::new(&fake);
        let cursor = Cursor::start(node.clone(), &file);
        let err = matcher.find(&cursor, &pattern).await.unwrap_err();
        assert!(matches!(err, VerifyError::MalformedSearchReply { .. }));
    }

    #[tokio::test]
    async fn test_line_count() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/driver.log");
        let fake = cluster(&node, &file, &["a", "b", "c"]);

        let matcher = LogMatcher::new(&fake);
        assert_eq!(matcher.line_count(&node, &file).await.unwrap(), 3);
    }
}
