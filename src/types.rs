//! Core types used throughout the scan engine.

use crate::cursor::ScanCursor;
use bytes::Bytes;
use crc::{Crc, CRC_16_XMODEM};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hash slots the keyspace is partitioned into.
pub const SLOT_COUNT: u16 = 16384;

/// Slot hashing used by the store: CRC16/XMODEM modulo [`SLOT_COUNT`].
const SLOT_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Compute the slot owning `key`.
///
/// If the key contains a non-empty `{...}` hash tag, only the tag is hashed,
/// so `{user:1}.name` and `{user:1}.email` land in the same slot.
pub fn key_slot(key: &[u8]) -> u16 {
    SLOT_CRC.checksum(hash_tag(key)) % SLOT_COUNT
}

fn hash_tag(key: &[u8]) -> &[u8] {
    let Some(open) = key.iter().position(|&b| b == b'{') else {
        return key;
    };
    match key[open + 1..].iter().position(|&b| b == b'}') {
        Some(0) | None => key,
        Some(len) => &key[open + 1..open + 1 + len],
    }
}

/// Address of a node as understood by the request executor (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Create a new node address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Borrow the address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for NodeAddress {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

/// Value type accepted by the `TYPE` filter of a keyspace scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    String,
    List,
    Set,
    ZSet,
    Hash,
    Stream,
}

impl ObjectType {
    /// Name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::String => "string",
            ObjectType::List => "list",
            ObjectType::Set => "set",
            ObjectType::ZSet => "zset",
            ObjectType::Hash => "hash",
            ObjectType::Stream => "stream",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The scan primitive a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanCommand {
    /// Whole-keyspace scan, one node at a time.
    Scan,
    /// Fields (and values) of one hash.
    HScan,
    /// Members of one set.
    SScan,
    /// Members (and scores) of one sorted set.
    ZScan,
}

impl ScanCommand {
    /// Command name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ScanCommand::Scan => "SCAN",
            ScanCommand::HScan => "HSCAN",
            ScanCommand::SScan => "SSCAN",
            ScanCommand::ZScan => "ZSCAN",
        }
    }

    /// Whether the command scans the members of a single key.
    pub fn is_collection(&self) -> bool {
        !matches!(self, ScanCommand::Scan)
    }
}

impl fmt::Display for ScanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One element of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEntry {
    /// A key name from a keyspace scan.
    Key(Bytes),
    /// A set member, or a hash field / sorted set member when values or
    /// scores were suppressed.
    Member(Bytes),
    /// A hash field with its value, or a sorted set member with its score.
    Pair { member: Bytes, value: Bytes },
}

impl ScanEntry {
    /// The key, member or field name of this entry.
    pub fn name(&self) -> &Bytes {
        match self {
            ScanEntry::Key(name) | ScanEntry::Member(name) => name,
            ScanEntry::Pair { member, .. } => member,
        }
    }

    /// The associated value or score, if the reply carried one.
    pub fn value(&self) -> Option<&Bytes> {
        match self {
            ScanEntry::Pair { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Raw reply of one scan primitive call: the native cursor followed by the
/// flat element array, exactly as the store returned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReply {
    /// Native cursor to pass on the next call; `"0"` once exhausted.
    pub cursor: Bytes,
    /// Returned elements.
    pub items: Vec<Bytes>,
}

impl ScanReply {
    /// Create a new reply.
    pub fn new(cursor: impl Into<Bytes>, items: Vec<Bytes>) -> Self {
        Self {
            cursor: cursor.into(),
            items,
        }
    }
}

/// One bounded batch of scan results plus the cursor to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Entries in the order the store returned them.
    pub entries: Vec<ScanEntry>,
    /// Token to resume from; terminal once `done` is set.
    pub cursor: ScanCursor,
    /// Whether every shard has reported completion.
    pub done: bool,
}

impl Page {
    /// The empty terminal page.
    pub fn finished() -> Self {
        Self {
            entries: Vec::new(),
            cursor: ScanCursor::finished(),
            done: true,
        }
    }

    /// Number of entries in the page.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the page carries no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
