//! Scripted collaborators with call recording.

use crate::error::{Error, Result};
use crate::scan::RequestExecutor;
use crate::topology::{ShardDescriptor, TopologySource};
use crate::types::{NodeAddress, ScanCommand, ScanReply, SLOT_COUNT};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Split the slot space evenly across `owners`, in order.
pub fn even_shards(owners: &[&str]) -> Vec<ShardDescriptor> {
    let count = owners.len().max(1) as u32;
    let per_shard = u32::from(SLOT_COUNT) / count;
    owners
        .iter()
        .enumerate()
        .map(|(i, owner)| {
            let start = i as u32 * per_shard;
            let end = if i as u32 + 1 == count {
                u32::from(SLOT_COUNT) - 1
            } else {
                start + per_shard - 1
            };
            ShardDescriptor::new(start as u16, end as u16, *owner)
        })
        .collect()
}

/// A request seen by [`MockExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Target node.
    pub node: NodeAddress,
    /// Command sent.
    pub command: ScanCommand,
    /// Arguments after the command name.
    pub args: Vec<Bytes>,
}

impl RecordedCall {
    /// Arguments rendered as UTF-8 strings.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect()
    }
}

/// Executor that replays scripted replies per node, in order.
///
/// A node with nothing left to replay answers with an error, so a test
/// that issues more requests than it scripted fails loudly.
#[derive(Debug, Default)]
pub struct MockExecutor {
    replies: Mutex<HashMap<NodeAddress, VecDeque<Result<ScanReply>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockExecutor {
    /// Create an executor with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply from `node`.
    pub fn push_reply(&self, node: &str, cursor: &str, items: &[&str]) {
        let items = items
            .iter()
            .map(|i| Bytes::copy_from_slice(i.as_bytes()))
            .collect();
        let cursor = Bytes::copy_from_slice(cursor.as_bytes());
        self.push_result(node, Ok(ScanReply::new(cursor, items)));
    }

    /// Queue an error from `node`.
    pub fn push_error(&self, node: &str, error: Error) {
        self.push_result(node, Err(error));
    }

    /// Queue a `MOVED`-style routing failure from `node`.
    pub fn push_moved(&self, node: &str) {
        self.push_error(node, Error::routing_stale(node, "MOVED"));
    }

    fn push_result(&self, node: &str, result: Result<ScanReply>) {
        self.replies
            .lock()
            .entry(NodeAddress::from(node))
            .or_default()
            .push_back(result);
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls made to `node`.
    pub fn calls_to(&self, node: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.node.as_str() == node)
            .count()
    }

    /// Number of scripted replies not consumed yet.
    pub fn pending(&self) -> usize {
        self.replies.lock().values().map(VecDeque::len).sum()
    }
}

#[async_trait::async_trait]
impl RequestExecutor for MockExecutor {
    async fn execute(
        &self,
        node: &NodeAddress,
        command: ScanCommand,
        args: Vec<Bytes>,
    ) -> Result<ScanReply> {
        self.calls.lock().push(RecordedCall {
            node: node.clone(),
            command,
            args,
        });

        self.replies
            .lock()
            .get_mut(node)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(Error::Remote(format!("no scripted reply for {}", node))))
    }
}

/// Topology source replaying a sequence of shard lists.
///
/// Each fetch takes the next queued topology; the last one is repeated
/// forever.
#[derive(Debug)]
pub struct MockTopologySource {
    topologies: Mutex<VecDeque<Vec<ShardDescriptor>>>,
    failures_left: AtomicUsize,
    fetches: AtomicU64,
}

impl MockTopologySource {
    /// Create a source returning `shards`.
    pub fn new(shards: Vec<ShardDescriptor>) -> Self {
        Self {
            topologies: Mutex::new(VecDeque::from([shards])),
            failures_left: AtomicUsize::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    /// Queue the topology returned after the ones already queued.
    pub fn push_topology(&self, shards: Vec<ShardDescriptor>) {
        self.topologies.lock().push_back(shards);
    }

    /// Make the next `n` fetches fail.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Number of fetch attempts, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TopologySource for MockTopologySource {
    async fn fetch_topology(&self) -> Result<Vec<ShardDescriptor>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Remote("connection refused".into()));
        }

        let mut topologies = self.topologies.lock();
        if topologies.len() > 1 {
            Ok(topologies.pop_front().unwrap_or_default())
        } else {
            Ok(topologies.front().cloned().unwrap_or_default())
        }
    }
}
