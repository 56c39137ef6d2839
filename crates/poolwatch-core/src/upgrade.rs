//! Cluster upgrade orchestration verification.
//!
//! A rolling upgrade is driven by one coordinator node, which upgrades
//! every peer remotely and itself last. The verifier never drives the
//! upgrade; it infers the per-node order from the coordinator's driver
//! log and then walks the expected phase evidence for each node:
//!
//! 1. pre-check: services stopped on every peer, then locally
//! 2. per node: stop, apply (package install), start, each backed by an
//!    action summary with zero failures
//! 3. coordinator last, optionally observed rebooting first
//! 4. finalize: cluster-wide completion marker

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use poolwatch_exec::{NodeId, Pinger, RemoteShell};

use crate::error::{Result, VerifyError};
use crate::matcher::LogMatcher;
use crate::pattern::{Cursor, LogPattern};
use crate::reboot::wait_for_reboot;
use crate::retry::RetryPolicy;
use crate::sequence::{SequenceOutcome, SequenceVerifier};
use crate::summary::verify_action_summary;

/// Service-log task line marking the stop action on a node.
const STOP_TASK: &str = "RUNNING: stop_node";

/// Service-log task line marking the start action on a node.
const START_TASK: &str = "RUNNING: start_node";

/// Inferred per-node upgrade order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSequence {
    /// Participants sorted by first mention below the order marker.
    pub order: Vec<NodeId>,

    /// Line of the latest mention; phase verification starts here.
    pub last_line: u64,
}

/// Infer the order in which the driver will upgrade the participants.
///
/// The driver prints a summary block headed by `marker` and names each
/// node in upgrade order below it. Participants are sorted by the line of
/// their first mention at or after the marker. Any participant missing
/// from the block makes the whole inference untrustworthy, so the result
/// is `None` rather than a partial order.
pub async fn infer_order(
    shell: &dyn RemoteShell,
    coordinator: &NodeId,
    log: &Path,
    marker: &str,
    participants: &[NodeId],
    retry: &RetryPolicy,
) -> Result<Option<UpgradeSequence>> {
    let matcher = LogMatcher::new(shell);
    let top = Cursor::start(coordinator.clone(), log);
    let pattern = LogPattern::literal(marker).retry(retry.clone());
    let Some(marker_hit) = matcher.find(&top, &pattern).await? else {
        warn!(node = %coordinator, marker = %marker, "order marker not found");
        return Ok(None);
    };

    let from = top.advanced_to(marker_hit.line);
    let mut mentions: Vec<(u64, NodeId)> = Vec::with_capacity(participants.len());
    for participant in participants {
        let pattern = LogPattern::literal(participant.as_str()).retry(retry.clone());
        let Some(found) = matcher.find(&from, &pattern).await? else {
            warn!(
                node = %coordinator,
                participant = %participant,
                "participant not mentioned below the order marker"
            );
            return Ok(None);
        };
        mentions.push((found.line, participant.clone()));
    }
    mentions.sort_by_key(|(line, _)| *line);

    let last_line = mentions
        .last()
        .map(|(line, _)| *line)
        .unwrap_or(marker_hit.line);
    let order: Vec<NodeId> = mentions.into_iter().map(|(_, node)| node).collect();
    info!(node = %coordinator, order = ?order, last_line, "inferred upgrade order");
    Ok(Some(UpgradeSequence { order, last_line }))
}

/// Where the service-log cursor starts for the start-phase search of a
/// node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorResetPolicy {
    /// Search from the top of the service log again. The default: the
    /// service log is rotated per action on most platforms.
    Restart,

    /// Continue from the stop phase's summary line. For platforms that
    /// append all actions to one log.
    Cumulative,
}

/// Everything the verifier needs to know about one planned upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradePlan {
    /// Node driving the upgrade. Must be last in the inferred order.
    pub coordinator: NodeId,

    /// Every node taking part, coordinator included.
    pub participants: Vec<NodeId>,

    /// Driver log on the coordinator.
    pub coordinator_log: PathBuf,

    /// Per-node upgrade log, same path on every node.
    pub node_log: PathBuf,

    /// Service action log, same path on every node.
    pub service_log: PathBuf,

    /// Heading of the driver's order summary block.
    pub order_marker: String,

    /// Heading of a service action's per-host failure summary.
    pub summary_marker: String,

    /// Final line proving the cluster-wide upgrade finished.
    pub completion_marker: String,

    /// Retry budget for every phase pattern.
    pub retry: RetryPolicy,

    pub service_log_cursor: CursorResetPolicy,

    /// Whether the coordinator reboots before upgrading itself.
    pub await_coordinator_reboot: bool,

    /// Accept a coordinator that never went down; some platforms reboot
    /// faster than the probe interval.
    pub ignore_shutdown_failure: bool,

    pub reboot_down: RetryPolicy,
    pub reboot_up: RetryPolicy,
}

impl UpgradePlan {
    pub fn new(coordinator: NodeId, participants: Vec<NodeId>) -> Self {
        Self {
            coordinator,
            participants,
            coordinator_log: PathBuf::from("/var/log/pool/upgrade-driver.log"),
            node_log: PathBuf::from("/var/log/pool/node-upgrade.log"),
            service_log: PathBuf::from("/var/log/pool/service-actions.log"),
            order_marker: "Upgrade Summary".to_string(),
            summary_marker: "ACTION RECAP".to_string(),
            completion_marker: "Successfully completed the cluster upgrade".to_string(),
            retry: RetryPolicy::default(),
            service_log_cursor: CursorResetPolicy::Restart,
            await_coordinator_reboot: false,
            ignore_shutdown_failure: false,
            reboot_down: RetryPolicy::attempts(300).with_interval(Duration::from_secs(1)),
            reboot_up: RetryPolicy::duration(Duration::from_secs(600))
                .with_interval(Duration::from_secs(2)),
        }
    }

    /// Apply one retry policy to every phase pattern.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// One verified phase, for the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: String,

    /// Subject node; `None` for cluster-wide phases.
    pub node: Option<NodeId>,

    /// Log line the phase's last evidence was found at.
    pub line: u64,
}

/// Full account of a verified upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeReport {
    pub order: Vec<NodeId>,
    pub phases: Vec<PhaseRecord>,
}

/// Walks a running or completed upgrade and verifies each phase left the
/// expected evidence.
pub struct UpgradeVerifier<'a> {
    shell: &'a dyn RemoteShell,
    pinger: &'a dyn Pinger,
}

impl<'a> UpgradeVerifier<'a> {
    pub fn new(shell: &'a dyn RemoteShell, pinger: &'a dyn Pinger) -> Self {
        Self { shell, pinger }
    }

    /// Infer the upgrade order and verify the entry criteria: the
    /// coordinator is last, and services were stopped on every peer and
    /// then locally.
    ///
    /// Returns the sequence plus the driver-log cursor positioned after
    /// the pre-check evidence.
    pub async fn infer_and_precheck(
        &self,
        plan: &UpgradePlan,
    ) -> Result<(UpgradeSequence, Cursor)> {
        let sequence = infer_order(
            self.shell,
            &plan.coordinator,
            &plan.coordinator_log,
            &plan.order_marker,
            &plan.participants,
            &plan.retry,
        )
        .await?
        .ok_or_else(|| VerifyError::InferenceFailed {
            reason: format!(
                "order marker or participant missing in {}",
                plan.coordinator_log.display()
            ),
        })?;

        let last = sequence
            .order
            .last()
            .ok_or_else(|| VerifyError::InferenceFailed {
                reason: "no participants".to_string(),
            })?;
        if last != &plan.coordinator {
            return Err(VerifyError::CoordinatorNotLast {
                coordinator: plan.coordinator.clone(),
                actual: last.clone(),
            });
        }

        let mut patterns = Vec::with_capacity(sequence.order.len());
        for peer in &sequence.order[..sequence.order.len() - 1] {
            patterns.push(self.pat(plan, &format!("Stopping services on remote node: {peer}")));
        }
        patterns.push(self.pat(
            plan,
            &format!("Stopping services on local node: {}", plan.coordinator),
        ));

        let cursor = Cursor::at(
            plan.coordinator.clone(),
            &plan.coordinator_log,
            sequence.last_line,
        );
        let cursor = self
            .run_phase("pre-check", &plan.coordinator, cursor, &patterns)
            .await?;
        Ok((sequence, cursor))
    }

    /// Verify the whole upgrade end to end and report every phase.
    pub async fn verify(&self, plan: &UpgradePlan) -> Result<UpgradeReport> {
        let (sequence, mut cursor) = self.infer_and_precheck(plan).await?;
        let mut phases = vec![PhaseRecord {
            phase: "pre-check".to_string(),
            node: Some(plan.coordinator.clone()),
            line: cursor.line,
        }];

        for node in &sequence.order {
            if node == &plan.coordinator {
                if plan.await_coordinator_reboot {
                    let rebooted = wait_for_reboot(
                        self.pinger,
                        node,
                        &plan.reboot_down,
                        &plan.reboot_up,
                        plan.ignore_shutdown_failure,
                    )
                    .await?;
                    if !rebooted {
                        return Err(VerifyError::RebootNotObserved { node: node.clone() });
                    }
                    phases.push(PhaseRecord {
                        phase: "reboot".to_string(),
                        node: Some(node.clone()),
                        line: cursor.line,
                    });
                }
                cursor = self.coordinator_cycle(plan, cursor, &mut phases).await?;
            } else {
                cursor = self.node_cycle(plan, node, cursor, &mut phases).await?;
            }
        }

        let patterns = [
            self.pat(plan, "Started commvault services..."),
            self.pat(plan, &plan.completion_marker),
        ];
        cursor = self
            .run_phase("finalize", &plan.coordinator, cursor, &patterns)
            .await?;
        phases.push(PhaseRecord {
            phase: "finalize".to_string(),
            node: None,
            line: cursor.line,
        });

        info!(
            nodes = sequence.order.len(),
            phases = phases.len(),
            "upgrade verified"
        );
        Ok(UpgradeReport {
            order: sequence.order,
            phases,
        })
    }

    /// Stop/apply/start cycle for a peer node, driven remotely by the
    /// coordinator.
    async fn node_cycle(
        &self,
        plan: &UpgradePlan,
        node: &NodeId,
        mut cursor: Cursor,
        phases: &mut Vec<PhaseRecord>,
    ) -> Result<Cursor> {
        cursor = self
            .run_phase(
                "stop",
                node,
                cursor,
                &[self.pat(plan, &format!("Starting to upgrade node... {node}"))],
            )
            .await?;
        let stop_line = self.service_task(plan, node, "stop", STOP_TASK, 1, true).await?;
        phases.push(PhaseRecord {
            phase: "stop".to_string(),
            node: Some(node.clone()),
            line: stop_line,
        });

        // The node's own log covers the package swap; the driver log
        // confirms it from the coordinator's side.
        let node_patterns = [
            self.pat(plan, "Starting to upgrade the machine").last(),
            self.pat(plan, "Stopped commvault services..."),
            self.pat(
                plan,
                "Installing rpms...this will take several minutes...Please wait",
            ),
        ];
        self.run_phase(
            "apply",
            node,
            Cursor::start(node.clone(), &plan.node_log),
            &node_patterns,
        )
        .await?;
        cursor = self
            .run_phase(
                "apply",
                node,
                cursor,
                &[self.pat(plan, "Successfully installed required RPMs")],
            )
            .await?;
        phases.push(PhaseRecord {
            phase: "apply".to_string(),
            node: Some(node.clone()),
            line: cursor.line,
        });

        let start_from = self.start_cursor(plan, stop_line);
        self.service_task(plan, node, "start", START_TASK, start_from, false)
            .await?;
        cursor = self
            .run_phase(
                "start",
                node,
                cursor,
                &[self.pat(
                    plan,
                    &format!("Upgrade completed successfully for node...{node}"),
                )],
            )
            .await?;
        phases.push(PhaseRecord {
            phase: "start".to_string(),
            node: Some(node.clone()),
            line: cursor.line,
        });
        Ok(cursor)
    }

    /// The coordinator's own cycle; it upgrades itself in place, so the
    /// apply evidence lives in the driver log.
    async fn coordinator_cycle(
        &self,
        plan: &UpgradePlan,
        mut cursor: Cursor,
        phases: &mut Vec<PhaseRecord>,
    ) -> Result<Cursor> {
        let node = &plan.coordinator;
        cursor = self
            .run_phase(
                "stop",
                node,
                cursor,
                &[self.pat(plan, &format!("Starting to upgrade node... {node}"))],
            )
            .await?;
        let stop_line = self.service_task(plan, node, "stop", STOP_TASK, 1, true).await?;
        phases.push(PhaseRecord {
            phase: "stop".to_string(),
            node: Some(node.clone()),
            line: stop_line,
        });

        let patterns = [
            self.pat(plan, "Running command [yum -y update]"),
            self.pat(plan, "yum command [yum -y update] successful"),
        ];
        cursor = self.run_phase("apply", node, cursor, &patterns).await?;
        phases.push(PhaseRecord {
            phase: "apply".to_string(),
            node: Some(node.clone()),
            line: cursor.line,
        });

        let start_from = self.start_cursor(plan, stop_line);
        self.service_task(plan, node, "start", START_TASK, start_from, false)
            .await?;
        cursor = self
            .run_phase(
                "start",
                node,
                cursor,
                &[self.pat(
                    plan,
                    &format!("Upgrade completed successfully for node...{node}"),
                )],
            )
            .await?;
        phases.push(PhaseRecord {
            phase: "start".to_string(),
            node: Some(node.clone()),
            line: cursor.line,
        });
        Ok(cursor)
    }

    /// Verify an ordered pattern list, turning a sequence miss into a
    /// phase failure.
    async fn run_phase(
        &self,
        phase: &str,
        node: &NodeId,
        cursor: Cursor,
        patterns: &[LogPattern],
    ) -> Result<Cursor> {
        debug!(phase, node = %node, patterns = patterns.len(), "verifying phase");
        let verifier = SequenceVerifier::new(self.shell);
        match verifier.verify_all(cursor, patterns).await? {
            SequenceOutcome::Verified(cursor) => Ok(cursor),
            SequenceOutcome::Failed { index, pattern } => Err(VerifyError::PhaseFailed {
                phase: phase.to_string(),
                node: node.clone(),
                index,
                pattern,
            }),
        }
    }

    /// Find a service-log task line on the node and require its action
    /// summary to be clean. Returns the summary line.
    async fn service_task(
        &self,
        plan: &UpgradePlan,
        node: &NodeId,
        phase: &str,
        task: &str,
        from_line: u64,
        last: bool,
    ) -> Result<u64> {
        let cursor = Cursor::at(node.clone(), &plan.service_log, from_line);
        let mut pattern = LogPattern::literal(task).retry(plan.retry.clone());
        if last {
            pattern = pattern.last();
        }
        let matcher = LogMatcher::new(self.shell);
        let Some(found) = matcher.find(&cursor, &pattern).await? else {
            return Err(VerifyError::PhaseFailed {
                phase: phase.to_string(),
                node: node.clone(),
                index: 0,
                pattern: task.to_string(),
            });
        };

        let summary_cursor = cursor.advanced_to(found.line);
        match verify_action_summary(self.shell, &summary_cursor, &plan.summary_marker, &plan.retry)
            .await?
        {
            Some(line) => Ok(line.max(found.line)),
            None => Err(VerifyError::PhaseFailed {
                phase: format!("{phase} summary"),
                node: node.clone(),
                index: 0,
                pattern: plan.summary_marker.clone(),
            }),
        }
    }

    fn start_cursor(&self, plan: &UpgradePlan, stop_line: u64) -> u64 {
        match plan.service_log_cursor {
            CursorResetPolicy::Restart => 1,
            CursorResetPolicy::Cumulative => stop_line,
        }
    }

    fn pat(&self, plan: &UpgradePlan, text: &str) -> LogPattern {
        LogPattern::literal(text).retry(plan.retry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolwatch_exec::fakes::FakeCluster;

    fn fast() -> RetryPolicy {
        RetryPolicy::attempts(1).with_interval(Duration::ZERO)
    }

    fn nodes(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    #[tokio::test]
    async fn test_infer_order_sorts_by_first_mention() {
        let coordinator = NodeId::new("ma1");
        let log = PathBuf::from("/var/log/pool/upgrade-driver.log");
        let fake = FakeCluster::new();
        fake.add_node(&coordinator);
        fake.load_log(
            &coordinator,
            &log,
            &[
                "preamble",
                "Upgrade Summary",
                "will upgrade node: ma3",
                "will upgrade node: ma2",
                "will upgrade node: ma1",
            ],
        );

        let sequence = infer_order(
            &fake,
            &coordinator,
            &log,
            "Upgrade Summary",
            &nodes(&["ma1", "ma2", "ma3"]),
            &fast(),
        )
        .await
        .unwrap()
        .expect("order should be inferred");
        assert_eq!(sequence.order, nodes(&["ma3", "ma2", "ma1"]));
        assert_eq!(sequence.last_line, 5);
    }

    #[tokio::test]
    async fn test_infer_order_missing_marker() {
        let coordinator = NodeId::new("ma1");
        let log = PathBuf::from("/var/log/pool/upgrade-driver.log");
        let fake = FakeCluster::new();
        fake.add_node(&coordinator);
        fake.load_log(&coordinator, &log, &["no summary block here"]);

        let sequence = infer_order(
            &fake,
            &coordinator,
            &log,
            "Upgrade Summary",
            &nodes(&["ma1"]),
            &fast(),
        )
        .await
        .unwrap();
        assert!(sequence.is_none());
    }

    #[tokio::test]
    async fn test_infer_order_rejects_partial_mention() {
        let coordinator = NodeId::new("ma1");
        let log = PathBuf::from("/var/log/pool/upgrade-driver.log");
        let fake = FakeCluster::new();
        fake.add_node(&coordinator);
        fake.load_log(
            &coordinator,
            &log,
            &["Upgrade Summary", "will upgrade node: ma1"],
        );

        let sequence = infer_order(
            &fake,
            &coordinator,
            &log,
            "Upgrade Summary",
            &nodes(&["ma1", "ma2"]),
            &fast(),
        )
        .await
        .unwrap();
        assert!(sequence.is_none());
    }

    #[tokio::test]
    async fn test_mention_before_marker_is_ignored() {
        let coordinator = NodeId::new("ma1");
        let log = PathBuf::from("/var/log/pool/upgrade-driver.log");
        let fake = FakeCluster::new();
        fake.add_node(&coordinator);
        // ma2 appears in the preamble; only the mention below the marker
        // counts for ordering.
        fake.load_log(
            &coordinator,
            &log,
            &[
                "connecting to ma2",
                "Upgrade Summary",
                "will upgrade node: ma1",
                "will upgrade node: ma2",
            ],
        );

        let sequence = infer_order(
            &fake,
            &coordinator,
            &log,
            "Upgrade Summary",
            &nodes(&["ma1", "ma2"]),
            &fast(),
        )
        .await
        .unwrap()
        .expect("order should be inferred");
        assert_eq!(sequence.order, nodes(&["ma1", "ma2"]));
    }

    #[tokio::test]
    async fn test_coordinator_must_be_last() {
        let coordinator = NodeId::new("ma1");
        let log = PathBuf::from("/var/log/pool/upgrade-driver.log");
        let fake = FakeCluster::new();
        fake.add_node(&coordinator);
        fake.load_log(
            &coordinator,
            &log,
            &[
                "Upgrade Summary",
                "will upgrade node: ma1",
                "will upgrade node: ma2",
            ],
        );

        let plan =
            UpgradePlan::new(coordinator.clone(), nodes(&["ma1", "ma2"])).with_retry(fast());
        let verifier = UpgradeVerifier::new(&fake, &fake);
        let err = verifier.infer_and_precheck(&plan).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::CoordinatorNotLast { actual, .. } if actual == NodeId::new("ma2")
        ));
    }

    #[test]
    fn test_start_cursor_policies() {
        let fake_coordinator = NodeId::new("ma1");
        let mut plan = UpgradePlan::new(fake_coordinator, nodes(&["ma1"]));
        let cluster = FakeCluster::new();
        let verifier = UpgradeVerifier::new(&cluster, &cluster);

        plan.service_log_cursor = CursorResetPolicy::Restart;
        assert_eq!(verifier.start_cursor(&plan, 42), 1);
        plan.service_log_cursor = CursorResetPolicy::Cumulative;
        assert_eq!(verifier.start_cursor(&plan, 42), 42);
    }
}
