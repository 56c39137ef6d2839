//! Fleet-wide consistency checking.
//!
//! The same operation runs against every node, strictly one node at a
//! time, and the results must agree. Disagreement is reported with the
//! full per-node map, never silently resolved.

use std::collections::BTreeMap;
use std::future::Future;

use tracing::{info, warn};

use poolwatch_exec::{ConfigRegistry, NodeId, RemoteShell};

use crate::error::Result;
use crate::retry::{wait_until, RetryPolicy};

/// Per-node results of one fleet operation, plus whether they all agree.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetResult<T> {
    pub values: BTreeMap<NodeId, T>,
    pub all_equal: bool,
}

impl<T: PartialEq> FleetResult<T> {
    fn collect(values: BTreeMap<NodeId, T>) -> Self {
        let mut iter = values.values();
        let all_equal = match iter.next() {
            Some(first) => iter.all(|v| v == first),
            None => true,
        };
        Self { values, all_equal }
    }
}

/// Consistency checker over a fleet of nodes.
pub struct FleetChecker;

impl FleetChecker {
    /// Run `op` once per node, sequentially, and compare the results for
    /// equality. Node visitation order is the input order but carries no
    /// semantic meaning.
    pub async fn run_same<T, F, Fut>(nodes: &[NodeId], mut op: F) -> Result<FleetResult<T>>
    where
        T: PartialEq + std::fmt::Debug,
        F: FnMut(&NodeId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut values = BTreeMap::new();
        for node in nodes {
            let value = op(node).await?;
            info!(node = %node, value = ?value, "fleet operation result");
            values.insert(node.clone(), value);
        }
        let result = FleetResult::collect(values);
        if result.all_equal {
            info!("outputs match amongst the nodes");
        } else {
            warn!("outputs do not match amongst the nodes");
        }
        Ok(result)
    }

    /// Run the same command on every node and compare the trimmed output.
    pub async fn run_same_command(
        shell: &dyn RemoteShell,
        nodes: &[NodeId],
        command: &str,
    ) -> Result<FleetResult<String>> {
        info!(command = %command, "checking for identical output");
        Self::run_same(nodes, |node| {
            let node = node.clone();
            async move {
                let output = shell.execute(&node, command).await?;
                Ok(output.output.trim().to_string())
            }
        })
        .await
    }

    /// Read each config key from every node and report per-key agreement.
    ///
    /// A key absent on a node reads as `None`; uniform absence counts as
    /// agreement. Keys listed in `normalize_sorted` hold comma-separated
    /// multi-value fields and are sorted before comparison, so `"b,a"`
    /// and `"a,b"` are treated equal.
    pub async fn read_config_keys(
        registry: &dyn ConfigRegistry,
        nodes: &[NodeId],
        keys: &[&str],
        kind: &str,
        normalize_sorted: &[&str],
    ) -> Result<Vec<ConfigKeyReport>> {
        let mut reports = Vec::with_capacity(keys.len());
        for key in keys {
            let mut values = BTreeMap::new();
            for node in nodes {
                let value = if registry.exists(node, kind, key).await? {
                    let mut value = registry.read(node, kind, key).await?;
                    if normalize_sorted.contains(key) {
                        let mut fields: Vec<&str> = value.split(',').collect();
                        fields.sort_unstable();
                        value = fields.join(",");
                    }
                    Some(value)
                } else {
                    None
                };
                values.insert(node.clone(), value);
            }
            let values = FleetResult::collect(values);
            if values.all_equal {
                info!(key = %key, "key has same value on all nodes");
            } else {
                warn!(key = %key, values = ?values.values, "key has different values");
            }
            reports.push(ConfigKeyReport {
                key: key.to_string(),
                values,
            });
        }
        Ok(reports)
    }

    /// Wait until a config key exists on a node with the expected value.
    ///
    /// Probes silently since many negative rounds are expected while the
    /// key initializes; transient collaborator errors count as negative
    /// probes.
    pub async fn wait_for_config_key(
        registry: &dyn ConfigRegistry,
        node: &NodeId,
        kind: &str,
        key: &str,
        expected: &str,
        policy: &RetryPolicy,
    ) -> Result<bool> {
        info!(node = %node, kind = %kind, key = %key, expected = %expected, "waiting for config key");
        let probe = || async move {
            let settled = async {
                Ok::<bool, poolwatch_exec::ExecError>(
                    registry.exists(node, kind, key).await?
                        && registry.read(node, kind, key).await? == expected,
                )
            }
            .await;
            match settled {
                Ok(hit) => Ok(hit),
                Err(e) if e.is_transient() => {
                    warn!(node = %node, error = %e, "ignoring transient error while probing key");
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        };
        let waited = wait_until(probe, |r| !matches!(r, Ok(false)), policy, true).await;
        match waited.last {
            Some(Ok(true)) => Ok(true),
            Some(Err(e)) => Err(e.into()),
            _ => Ok(false),
        }
    }

    /// Check that a systemd service is in one of the desired states on
    /// every node.
    pub async fn service_state_uniform(
        shell: &dyn RemoteShell,
        nodes: &[NodeId],
        service: &str,
        active_states: &[&str],
        substates: &[&str],
    ) -> Result<bool> {
        let command = format!("systemctl show -p ActiveState -p SubState {service}");
        let result = Self::run_same_command(shell, nodes, &command).await?;
        for (node, output) in &result.values {
            let lines: Vec<&str> = output.lines().collect();
            if lines.len() != 2 {
                warn!(node = %node, service = %service, "unexpected service status output");
                return Ok(false);
            }
            let active = lines[0].rsplit('=').next().unwrap_or("").to_lowercase();
            if !active_states.contains(&active.as_str()) {
                warn!(node = %node, service = %service, active_state = %active, "service not active");
                return Ok(false);
            }
            let sub = lines[1].rsplit('=').next().unwrap_or("").to_lowercase();
            if !substates.contains(&sub.as_str()) {
                warn!(node = %node, service = %service, substate = %sub, "service in wrong substate");
                return Ok(false);
            }
            info!(node = %node, service = %service, active_state = %active, substate = %sub, "service running");
        }
        Ok(true)
    }
}

/// Per-node values of one config key across the fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigKeyReport {
    pub key: String,
    pub values: FleetResult<Option<String>>,
}
