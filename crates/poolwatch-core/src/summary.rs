//! Action summary verification.
//!
//! Batch actions report per-host failure counts in a summary block:
//!
//! ```text
//! ACTION RECAP ********
//! host1.pool.local : ok=5 changed=2 failed=1
//! host2.pool.local : ok=5 changed=2 failed=0
//! localhost failed=0
//! ```
//!
//! A phase only counts as clean when every host reports `failed=0`.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use poolwatch_exec::{LogSliceRequest, RemoteShell};

use crate::error::Result;
use crate::matcher::LogMatcher;
use crate::pattern::{Cursor, LogPattern};
use crate::retry::RetryPolicy;

/// How many lines below the marker the summary block may span.
const SUMMARY_BLOCK_LINES: u64 = 12;

fn failure_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^:\s]+).*?failed=(\d+)").unwrap())
}

/// Locate the summary marker at or after the cursor and require a zero
/// failure count for every host listed below it.
///
/// Returns the marker's absolute line for cursor advancement, or `None`
/// when the marker never appeared, no per-host counts could be parsed, or
/// any host reported failures.
pub async fn verify_action_summary(
    shell: &dyn RemoteShell,
    cursor: &Cursor,
    marker: &str,
    retry: &RetryPolicy,
) -> Result<Option<u64>> {
    let matcher = LogMatcher::new(shell);
    let pattern = LogPattern::literal(marker).retry(retry.clone());
    let Some(found) = matcher.find(cursor, &pattern).await? else {
        warn!(node = %cursor.node, marker = %marker, "summary marker not found");
        return Ok(None);
    };

    let slice = LogSliceRequest {
        file: cursor.file.clone(),
        from_line: found.line,
        lines: SUMMARY_BLOCK_LINES,
    };
    let block = shell.execute(&cursor.node, &slice.to_command()).await?;

    let mut hosts = 0u32;
    for caps in failure_regex().captures_iter(&block.output) {
        let host = &caps[1];
        let failed: u64 = caps[2].parse().unwrap_or(u64::MAX);
        hosts += 1;
        if failed > 0 {
            warn!(node = %cursor.node, host = %host, failed, "host reported failures");
            return Ok(None);
        }
    }
    if hosts == 0 {
        warn!(node = %cursor.node, marker = %marker, "could not parse per-host failure counts");
        return Ok(None);
    }
    info!(node = %cursor.node, hosts, line = found.line, "no failures reported");
    Ok(Some(found.line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolwatch_exec::fakes::FakeCluster;
    use poolwatch_exec::NodeId;
    use std::path::PathBuf;
    use std::time::Duration;

    fn fast() -> RetryPolicy {
        RetryPolicy::attempts(1).with_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_zero_failures_pass() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/service.log");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.load_log(
            &node,
            &file,
            &[
                "RUNNING: stop_node",
                "ACTION RECAP ********",
                "host1.pool.local : ok=5 changed=2 failed=0",
                "host2.pool.local : ok=5 changed=2 failed=0",
                "localhost failed=0",
            ],
        );

        let cursor = Cursor::start(node.clone(), &file);
        let line = verify_action_summary(&fake, &cursor, "ACTION RECAP", &fast())
            .await
            .unwrap();
        assert_eq!(line, Some(2));
    }

    #[tokio::test]
    async fn test_single_failure_fails_the_check() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/service.log");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.load_log(
            &node,
            &file,
            &[
                "ACTION RECAP ********",
                "host1.pool.local : ok=5 changed=2 failed=1",
                "host2.pool.local : ok=5 changed=2 failed=0",
            ],
        );

        let cursor = Cursor::start(node.clone(), &file);
        let line = verify_action_summary(&fake, &cursor, "ACTION RECAP", &fast())
            .await
            .unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn test_missing_marker_fails() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/service.log");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.load_log(&node, &file, &["nothing to see"]);

        let cursor = Cursor::start(node.clone(), &file);
        let line = verify_action_summary(&fake, &cursor, "ACTION RECAP", &fast())
            .await
            .unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn test_unparsable_block_fails() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/service.log");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.load_log(&node, &file, &["ACTION RECAP ********", "garbage with no counts"]);

        let cursor = Cursor::start(node.clone(), &file);
        let line = verify_action_summary(&fake, &cursor, "ACTION RECAP", &fast())
            .await
            .unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn test_search_starts_at_cursor() {
        let node = NodeId::new("ma1");
        let file = PathBuf::from("/var/log/service.log");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        // An earlier recap with failures must be skipped by the cursor.
        fake.load_log(
            &node,
            &file,
            &[
                "ACTION RECAP ********",
                "host1 failed=3",
                "RUNNING: start_node",
                "ACTION RECAP ********",
                "host1 failed=0",
            ],
        );

        let cursor = Cursor::at(node.clone(), &file, 3);
        let line = verify_action_summary(&fake, &cursor, "ACTION RECAP", &fast())
            .await
            .unwrap();
        assert_eq!(line, Some(4));
    }
}
