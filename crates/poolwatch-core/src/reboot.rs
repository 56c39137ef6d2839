//! Reachability and reboot observation.
//!
//! A node going through a reboot is first seen unreachable, then reachable
//! again. An unreachable probe is a negative result, not an error; only
//! non-connectivity failures from the prober are fatal.

use tracing::{info, warn};

use poolwatch_exec::{ExecError, NodeId, Pinger};

use crate::error::Result;
use crate::retry::{wait_until, RetryPolicy};

/// Wait until the node's reachability matches `want`.
///
/// Returns `Ok(true)` once a probe observes the wanted state, `Ok(false)`
/// if the retry budget runs out first.
pub async fn wait_for_reachability(
    pinger: &dyn Pinger,
    node: &NodeId,
    want: bool,
    policy: &RetryPolicy,
    silent: bool,
) -> Result<bool> {
    let probe = || async move {
        match pinger.ping(node).await {
            Ok(reachable) => Ok(reachable),
            Err(ExecError::HostUnreachable(_)) => Ok(false),
            Err(err) => Err(err),
        }
    };
    let accept = |probed: &std::result::Result<bool, ExecError>| !matches!(probed, Ok(r) if *r != want);
    let waited = wait_until(probe, accept, policy, silent).await;
    match waited.last {
        Some(Ok(reachable)) => Ok(reachable == want),
        Some(Err(err)) => Err(err.into()),
        None => Ok(false),
    }
}

/// Observe a full reboot: the node drops off the network, then answers
/// again.
///
/// When `ignore_shutdown_failure` is set, a node that never went down is
/// accepted as already rebooted; some platforms come back faster than the
/// probe interval.
pub async fn wait_for_reboot(
    pinger: &dyn Pinger,
    node: &NodeId,
    down_policy: &RetryPolicy,
    up_policy: &RetryPolicy,
    ignore_shutdown_failure: bool,
) -> Result<bool> {
    info!(node = %node, "waiting for node to go down");
    let went_down = wait_for_reachability(pinger, node, false, down_policy, true).await?;
    if !went_down {
        if ignore_shutdown_failure {
            warn!(node = %node, "node never went down, assuming it already rebooted");
            return Ok(true);
        }
        warn!(node = %node, "node never went down");
        return Ok(false);
    }

    info!(node = %node, "node is down, waiting for it to come back");
    let came_back = wait_for_reachability(pinger, node, true, up_policy, true).await?;
    if !came_back {
        warn!(node = %node, "node did not come back up");
        return Ok(false);
    }
    info!(node = %node, "node rebooted");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolwatch_exec::fakes::FakeCluster;
    use std::time::Duration;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::attempts(attempts).with_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_wait_until_reachable() {
        let node = NodeId::new("ma1");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.script_ping(&node, Ok(false));
        fake.script_ping(&node, Ok(false));
        fake.script_ping(&node, Ok(true));

        let up = wait_for_reachability(&fake, &node, true, &fast(5), false)
            .await
            .unwrap();
        assert!(up);
    }

    #[tokio::test]
    async fn test_unreachable_error_is_a_negative_probe() {
        let node = NodeId::new("ma1");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.script_ping(&node, Err(ExecError::HostUnreachable(node.clone())));
        fake.script_ping(&node, Ok(true));

        let up = wait_for_reachability(&fake, &node, true, &fast(3), false)
            .await
            .unwrap();
        assert!(up);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_a_negative_result() {
        let node = NodeId::new("ma1");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.set_reachable(&node, false);

        let up = wait_for_reachability(&fake, &node, true, &fast(2), false)
            .await
            .unwrap();
        assert!(!up);
    }

    #[tokio::test]
    async fn test_reboot_down_then_up() {
        let node = NodeId::new("ma1");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.script_ping(&node, Ok(true));
        fake.script_ping(&node, Ok(false));
        fake.script_ping(&node, Ok(true));

        let rebooted = wait_for_reboot(&fake, &node, &fast(5), &fast(5), false)
            .await
            .unwrap();
        assert!(rebooted);
    }

    #[tokio::test]
    async fn test_missed_shutdown_rejected_by_default() {
        let node = NodeId::new("ma1");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.set_reachable(&node, true);

        let rebooted = wait_for_reboot(&fake, &node, &fast(2), &fast(2), false)
            .await
            .unwrap();
        assert!(!rebooted);
    }

    #[tokio::test]
    async fn test_missed_shutdown_tolerated_when_configured() {
        let node = NodeId::new("ma1");
        let fake = FakeCluster::new();
        fake.add_node(&node);
        fake.set_reachable(&node, true);

        let rebooted = wait_for_reboot(&fake, &node, &fast(2), &fast(2), true)
            .await
            .unwrap();
        assert!(rebooted);
    }
}
