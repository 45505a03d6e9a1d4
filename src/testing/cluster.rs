//! In-memory slot-sharded store for end-to-end scan tests.
//!
//! [`MockCluster`] is both the topology source and the request executor.
//! Keys live in one ordered map; a node serves the keys whose slot it owns
//! under the current shard list, so replacing the shard list mid-scan
//! behaves like a resharding or failover. Native cursors are offsets into a
//! node's ordered key list, and `COUNT` elements are examined per call
//! before `MATCH`/`TYPE` filtering, so pages can legitimately be empty.

use crate::error::{Error, Result};
use crate::options::{
    COUNT_KEYWORD, MATCH_KEYWORD, NO_SCORES_KEYWORD, NO_VALUES_KEYWORD, TYPE_KEYWORD,
};
use crate::scan::RequestExecutor;
use crate::topology::{ShardDescriptor, ShardTopology, TopologySource};
use crate::types::{NodeAddress, ObjectType, ScanCommand, ScanReply};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;

const DEFAULT_COUNT: usize = 10;

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    String(Bytes),
    Hash(Vec<(Bytes, Bytes)>),
    Set(Vec<Bytes>),
    ZSet(Vec<(Bytes, f64)>),
}

impl MockValue {
    fn object_type(&self) -> ObjectType {
        match self {
            MockValue::String(_) => ObjectType::String,
            MockValue::Hash(_) => ObjectType::Hash,
            MockValue::Set(_) => ObjectType::Set,
            MockValue::ZSet(_) => ObjectType::ZSet,
        }
    }
}

#[derive(Debug)]
struct ClusterState {
    shards: Vec<ShardDescriptor>,
    data: BTreeMap<Bytes, MockValue>,
}

/// In-memory cluster.
#[derive(Debug)]
pub struct MockCluster {
    state: Mutex<ClusterState>,
}

impl MockCluster {
    /// Create an empty cluster with the given shard layout.
    pub fn new(shards: Vec<ShardDescriptor>) -> Self {
        Self {
            state: Mutex::new(ClusterState {
                shards,
                data: BTreeMap::new(),
            }),
        }
    }

    /// Replace the shard layout.
    pub fn set_shards(&self, shards: Vec<ShardDescriptor>) {
        self.state.lock().shards = shards;
    }

    /// Store a value.
    pub fn insert(&self, key: impl Into<Bytes>, value: MockValue) {
        self.state.lock().data.insert(key.into(), value);
    }

    /// Store a string value.
    pub fn insert_string(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.insert(key, MockValue::String(value.into()));
    }

    /// Remove a key.
    pub fn remove(&self, key: &[u8]) {
        self.state.lock().data.remove(key);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Whether the cluster stores nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct ParsedOptions {
    pattern: Option<Bytes>,
    count: usize,
    object_type: Option<String>,
    no_scores: bool,
    no_values: bool,
}

fn parse_options(args: &[Bytes]) -> Result<ParsedOptions> {
    let mut parsed = ParsedOptions {
        pattern: None,
        count: DEFAULT_COUNT,
        object_type: None,
        no_scores: false,
        no_values: false,
    };
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        let keyword = String::from_utf8_lossy(arg).to_ascii_uppercase();
        let mut value = || {
            args.next()
                .cloned()
                .ok_or_else(|| Error::Remote(format!("ERR syntax error near {}", keyword)))
        };
        match keyword.as_str() {
            MATCH_KEYWORD => parsed.pattern = Some(value()?),
            COUNT_KEYWORD => {
                let raw = value()?;
                parsed.count = String::from_utf8_lossy(&raw)
                    .parse()
                    .map_err(|_| Error::Remote("ERR value is not an integer".into()))?;
            }
            TYPE_KEYWORD => {
                parsed.object_type = Some(String::from_utf8_lossy(&value()?).into_owned())
            }
            NO_SCORES_KEYWORD => parsed.no_scores = true,
            NO_VALUES_KEYWORD => parsed.no_values = true,
            other => return Err(Error::Remote(format!("ERR unknown option {}", other))),
        }
    }
    Ok(parsed)
}

fn parse_cursor(raw: Option<&Bytes>) -> Result<usize> {
    raw.and_then(|c| String::from_utf8_lossy(c).parse().ok())
        .ok_or_else(|| Error::Remote("ERR invalid cursor".into()))
}

/// `*` and `?` glob matching.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

/// Examine `count` elements from `cursor`; return the next cursor and the
/// examined window.
fn window<T>(elements: &[T], cursor: usize, count: usize) -> (usize, &[T]) {
    let start = cursor.min(elements.len());
    let end = start.saturating_add(count.max(1)).min(elements.len());
    let next = if end >= elements.len() { 0 } else { end };
    (next, &elements[start..end])
}

impl MockCluster {
    fn scan_keyspace(&self, node: &NodeAddress, args: &[Bytes]) -> Result<ScanReply> {
        let state = self.state.lock();
        if !state.shards.iter().any(|s| &s.owner == node) {
            return Err(Error::routing_stale(node.as_str(), "node owns no slots"));
        }
        let cursor = parse_cursor(args.first())?;
        let options = parse_options(&args[1..])?;

        let topology = ShardTopology::new(0, state.shards.clone(), false)?;
        let owned: Vec<(&Bytes, &MockValue)> = state
            .data
            .iter()
            .filter(|(key, _)| {
                topology
                    .shard_for_key(key)
                    .map(|(_, shard)| &shard.owner == node)
                    .unwrap_or(false)
            })
            .collect();

        let (next, examined) = window(&owned, cursor, options.count);
        let items = examined
            .iter()
            .filter(|(key, _)| {
                options
                    .pattern
                    .as_ref()
                    .map_or(true, |p| glob_match(p, key))
            })
            .filter(|(_, value)| {
                options
                    .object_type
                    .as_ref()
                    .map_or(true, |t| value.object_type().as_str() == t)
            })
            .map(|(key, _)| (*key).clone())
            .collect();

        Ok(ScanReply::new(next.to_string(), items))
    }

    fn scan_collection(
        &self,
        node: &NodeAddress,
        command: ScanCommand,
        args: &[Bytes],
    ) -> Result<ScanReply> {
        let state = self.state.lock();
        let key = args
            .first()
            .ok_or_else(|| Error::Remote("ERR wrong number of arguments".into()))?;

        let topology = ShardTopology::new(0, state.shards.clone(), false)?;
        match topology.shard_for_key(key) {
            Some((_, shard)) if &shard.owner == node => {}
            Some((_, shard)) => {
                return Err(Error::routing_stale(
                    node.as_str(),
                    format!("MOVED {}", shard.owner),
                ))
            }
            None => return Err(Error::Remote("CLUSTERDOWN slot not served".into())),
        }

        let cursor = parse_cursor(args.get(1))?;
        let options = parse_options(&args[2..])?;

        let members: Vec<(Bytes, Option<Bytes>)> = match (command, state.data.get(key)) {
            (_, None) => Vec::new(),
            (ScanCommand::HScan, Some(MockValue::Hash(fields))) => fields
                .iter()
                .map(|(f, v)| (f.clone(), (!options.no_values).then(|| v.clone())))
                .collect(),
            (ScanCommand::SScan, Some(MockValue::Set(members))) => {
                members.iter().map(|m| (m.clone(), None)).collect()
            }
            (ScanCommand::ZScan, Some(MockValue::ZSet(members))) => members
                .iter()
                .map(|(m, score)| {
                    let score = Bytes::from(score.to_string());
                    (m.clone(), (!options.no_scores).then_some(score))
                })
                .collect(),
            _ => {
                return Err(Error::Remote(
                    "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
                ))
            }
        };

        let (next, examined) = window(&members, cursor, options.count);
        let mut items = Vec::new();
        for (member, value) in examined {
            if let Some(ref pattern) = options.pattern {
                if !glob_match(pattern, member) {
                    continue;
                }
            }
            items.push(member.clone());
            if let Some(value) = value {
                items.push(value.clone());
            }
        }

        Ok(ScanReply::new(next.to_string(), items))
    }
}

#[async_trait::async_trait]
impl RequestExecutor for MockCluster {
    async fn execute(
        &self,
        node: &NodeAddress,
        command: ScanCommand,
        args: Vec<Bytes>,
    ) -> Result<ScanReply> {
        match command {
            ScanCommand::Scan => self.scan_keyspace(node, &args),
            _ => self.scan_collection(node, command, &args),
        }
    }
}

#[async_trait::async_trait]
impl TopologySource for MockCluster {
    async fn fetch_topology(&self) -> Result<Vec<ShardDescriptor>> {
        Ok(self.state.lock().shards.clone())
    }
}
