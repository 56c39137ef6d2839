//! In-memory fakes for the collaborator traits (testing only)
//!
//! `FakeCluster` satisfies `RemoteShell`, `Pinger`, and `ConfigRegistry`
//! without any network. Log files are plain line vectors per node; search
//! and slice commands are answered by parsing the rendered wire requests
//! back through the same adapter the engine renders them with, so tests
//! exercise the real contract end to end.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{ExecError, ExecResult};
use crate::node::{CommandOutput, NodeId};
use crate::search::{LogSearchRequest, LogSliceRequest, MatchMode, Occurrence};
use crate::traits::{ConfigRegistry, Pinger, RemoteShell};

#[derive(Default)]
struct Inner {
    nodes: BTreeSet<NodeId>,
    logs: HashMap<(NodeId, PathBuf), Vec<String>>,
    /// One-shot replies, consumed FIFO per (node, command).
    scripted: HashMap<(NodeId, String), VecDeque<ExecResult<CommandOutput>>>,
    /// Standing replies, returned whenever no one-shot reply is queued.
    canned: HashMap<(NodeId, String), CommandOutput>,
    registry: HashMap<(NodeId, String, String), String>,
    /// One-shot ping results, consumed FIFO per node.
    pings: HashMap<NodeId, VecDeque<ExecResult<bool>>>,
    reachable: HashMap<NodeId, bool>,
    executed: Vec<(NodeId, String)>,
}

/// In-memory cluster of nodes with per-node log files, scripted command
/// replies, config keys, and reachability.
#[derive(Default)]
pub struct FakeCluster {
    inner: Mutex<Inner>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Commands against unregistered nodes fail with
    /// `ExecError::UnknownNode`.
    pub fn add_node(&self, node: &NodeId) {
        self.inner.lock().unwrap().nodes.insert(node.clone());
    }

    /// Append one line to a node's log file.
    pub fn append_log(&self, node: &NodeId, file: &Path, line: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .logs
            .entry((node.clone(), file.to_path_buf()))
            .or_default()
            .push(line.to_string());
    }

    /// Replace a node's log file with the given lines.
    pub fn load_log(&self, node: &NodeId, file: &Path, lines: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.logs.insert(
            (node.clone(), file.to_path_buf()),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    /// Queue a one-shot reply for an exact command on a node. Replies are
    /// consumed in the order they were queued.
    pub fn script_reply(&self, node: &NodeId, command: &str, reply: ExecResult<CommandOutput>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .scripted
            .entry((node.clone(), command.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Set a standing reply for an exact command on a node.
    pub fn set_canned(&self, node: &NodeId, command: &str, output: CommandOutput) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .canned
            .insert((node.clone(), command.to_string()), output);
    }

    /// Set a config/registry key on a node.
    pub fn set_config_key(&self, node: &NodeId, kind: &str, key: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.registry.insert(
            (node.clone(), kind.to_string(), key.to_string()),
            value.to_string(),
        );
    }

    /// Queue a one-shot ping result for a node.
    pub fn script_ping(&self, node: &NodeId, reply: ExecResult<bool>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .pings
            .entry(node.clone())
            .or_default()
            .push_back(reply);
    }

    /// Set the standing reachability of a node (default: reachable).
    pub fn set_reachable(&self, node: &NodeId, reachable: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.reachable.insert(node.clone(), reachable);
    }

    /// How many times an exact command was executed on a node.
    pub fn times_executed(&self, node: &NodeId, command: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .executed
            .iter()
            .filter(|(n, c)| n == node && c == command)
            .count()
    }

    fn answer_search(inner: &Inner, node: &NodeId, req: &LogSearchRequest) -> ExecResult<String> {
        let lines = match inner.logs.get(&(node.clone(), req.file.clone())) {
            Some(lines) => lines,
            // Missing file: the remote pipeline produces no stdout, which
            // the engine reads as "not found this round".
            None => return Ok(String::new()),
        };
        let matcher: Box<dyn Fn(&str) -> bool> = match req.mode {
            MatchMode::Literal => {
                let text = req.text.clone();
                Box::new(move |line: &str| line.contains(&text))
            }
            MatchMode::Regex => {
                let re = Regex::new(&req.text).map_err(|e| ExecError::CommandFailed {
                    node: node.clone(),
                    reason: format!("bad pattern |{}|: {e}", req.text),
                })?;
                Box::new(move |line: &str| re.is_match(line))
            }
        };
        let skip = (req.from_line.max(1) - 1) as usize;
        let mut found: Vec<String> = lines
            .iter()
            .enumerate()
            .skip(skip)
            .filter(|(_, line)| matcher(line))
            .map(|(idx, line)| format!("{}:{}", idx - skip + 1, line))
            .collect();
        if req.occurrence == Occurrence::Last && found.len() > 1 {
            found = vec![found.pop().unwrap()];
        }
        Ok(found.join("\n"))
    }

    fn answer_slice(inner: &Inner, node: &NodeId, req: &LogSliceRequest) -> String {
        let lines = match inner.logs.get(&(node.clone(), req.file.clone())) {
            Some(lines) => lines,
            None => return String::new(),
        };
        let skip = (req.from_line.max(1) - 1) as usize;
        lines
            .iter()
            .skip(skip)
            .take(req.lines as usize)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn answer_line_count(inner: &Inner, node: &NodeId, command: &str) -> Option<String> {
        let file = command
            .strip_prefix("cat '")?
            .strip_suffix("' | wc -l")?
            .to_string();
        let count = inner
            .logs
            .get(&(node.clone(), PathBuf::from(file)))
            .map(|lines| lines.len())
            .unwrap_or(0);
        Some(count.to_string())
    }
}

#[async_trait]
impl RemoteShell for FakeCluster {
    async fn execute(&self, node: &NodeId, command: &str) -> ExecResult<CommandOutput> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.nodes.contains(node) {
            return Err(ExecError::UnknownNode(node.clone()));
        }
        inner.executed.push((node.clone(), command.to_string()));

        if let Some(queue) = inner
            .scripted
            .get_mut(&(node.clone(), command.to_string()))
        {
            if let Some(reply) = queue.pop_front() {
                return reply;
            }
        }
        if let Some(output) = inner.canned.get(&(node.clone(), command.to_string())) {
            return Ok(output.clone());
        }
        if let Some(req) = LogSearchRequest::parse(command) {
            let text = Self::answer_search(&inner, node, &req)?;
            return Ok(CommandOutput::text(text));
        }
        if let Some(req) = LogSliceRequest::parse(command) {
            return Ok(CommandOutput::text(Self::answer_slice(&inner, node, &req)));
        }
        if let Some(count) = Self::answer_line_count(&inner, node, command) {
            return Ok(CommandOutput::text(count));
        }
        Err(ExecError::CommandFailed {
            node: node.clone(),
            reason: format!("no scripted reply for |{command}|"),
        })
    }
}

#[async_trait]
impl Pinger for FakeCluster {
    async fn ping(&self, node: &NodeId) -> ExecResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(queue) = inner.pings.get_mut(node) {
            if let Some(reply) = queue.pop_front() {
                return reply;
            }
        }
        if !inner.nodes.contains(node) {
            return Err(ExecError::UnknownNode(node.clone()));
        }
        Ok(*inner.reachable.get(node).unwrap_or(&true))
    }
}

#[async_trait]
impl ConfigRegistry for FakeCluster {
    async fn exists(&self, node: &NodeId, kind: &str, key: &str) -> ExecResult<bool> {
        let inner = self.inner.lock().unwrap();
        if !inner.nodes.contains(node) {
            return Err(ExecError::UnknownNode(node.clone()));
        }
        Ok(inner
            .registry
            .contains_key(&(node.clone(), kind.to_string(), key.to_string())))
    }

    async fn read(&self, node: &NodeId, kind: &str, key: &str) -> ExecResult<String> {
        let inner = self.inner.lock().unwrap();
        if !inner.nodes.contains(node) {
            return Err(ExecError::UnknownNode(node.clone()));
        }
        inner
            .registry
            .get(&(node.clone(), kind.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ExecError::KeyNotFound {
                node: node.clone(),
                kind: kind.to_string(),
                key: key.to_string(),
            })
    }
}
