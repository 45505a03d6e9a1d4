//! Shard descriptors and immutable topology snapshots.

use crate::error::TopologyError;
use crate::types::{key_slot, NodeAddress, SLOT_COUNT};
use serde::{Deserialize, Serialize};

/// A contiguous slot range and the node currently owning it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardDescriptor {
    /// First slot of the range.
    pub slot_start: u16,
    /// Last slot of the range, inclusive.
    pub slot_end: u16,
    /// Node serving the range.
    pub owner: NodeAddress,
}

impl ShardDescriptor {
    /// Create a new descriptor.
    pub fn new(slot_start: u16, slot_end: u16, owner: impl Into<NodeAddress>) -> Self {
        Self {
            slot_start,
            slot_end,
            owner: owner.into(),
        }
    }

    /// Whether `slot` falls in this range.
    pub fn contains(&self, slot: u16) -> bool {
        self.slot_start <= slot && slot <= self.slot_end
    }

    /// Number of slots in the range.
    pub fn slot_count(&self) -> u32 {
        u32::from(self.slot_end.saturating_sub(self.slot_start)) + 1
    }
}

/// Immutable, ordered view of the cluster's shards.
///
/// Descriptors are ordered by `slot_start`. A keyspace scan walks the
/// distinct owners in the order they first appear in that list: a node-level
/// `SCAN` returns every key the node holds, so a node owning several slot
/// ranges is still visited once. A scan's shard index is an ordinal into
/// [`scan_targets`](Self::scan_targets).
///
/// Snapshots are never modified; a refresh installs a new snapshot with a
/// higher generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTopology {
    generation: u64,
    shards: Vec<ShardDescriptor>,
    scan_targets: Vec<NodeAddress>,
}

impl ShardTopology {
    /// Build a snapshot, checking the slot partition invariant when
    /// `validate` is set. An empty shard list is always rejected.
    pub fn new(
        generation: u64,
        mut shards: Vec<ShardDescriptor>,
        validate: bool,
    ) -> Result<Self, TopologyError> {
        if shards.is_empty() {
            return Err(TopologyError::Empty);
        }
        shards.sort_by_key(|s| (s.slot_start, s.slot_end));

        if validate {
            validate_partition(&shards)?;
        }

        let mut scan_targets: Vec<NodeAddress> = Vec::with_capacity(shards.len());
        for shard in &shards {
            if !scan_targets.contains(&shard.owner) {
                scan_targets.push(shard.owner.clone());
            }
        }

        Ok(Self {
            generation,
            shards,
            scan_targets,
        })
    }

    /// Generation number of this snapshot; strictly increasing per view.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// All shards, in slot order.
    pub fn shards(&self) -> &[ShardDescriptor] {
        &self.shards
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Get a shard by index.
    pub fn shard(&self, index: usize) -> Option<&ShardDescriptor> {
        self.shards.get(index)
    }

    /// Distinct owners in keyspace scan order.
    pub fn scan_targets(&self) -> &[NodeAddress] {
        &self.scan_targets
    }

    /// Number of nodes a keyspace scan visits.
    pub fn scan_target_count(&self) -> usize {
        self.scan_targets.len()
    }

    /// The node visited at position `index` of a keyspace scan.
    pub fn scan_target(&self, index: usize) -> Option<&NodeAddress> {
        self.scan_targets.get(index)
    }

    /// Find the shard owning `slot`.
    pub fn shard_for_slot(&self, slot: u16) -> Option<(usize, &ShardDescriptor)> {
        let idx = self.shards.partition_point(|s| s.slot_start <= slot);
        let index = idx.checked_sub(1)?;
        let shard = &self.shards[index];
        shard.contains(slot).then_some((index, shard))
    }

    /// Find the shard owning `key`.
    pub fn shard_for_key(&self, key: &[u8]) -> Option<(usize, &ShardDescriptor)> {
        self.shard_for_slot(key_slot(key))
    }
}

fn validate_partition(shards: &[ShardDescriptor]) -> Result<(), TopologyError> {
    let mut next_slot: u32 = 0;
    for (index, shard) in shards.iter().enumerate() {
        if shard.slot_start > shard.slot_end || shard.slot_end >= SLOT_COUNT {
            return Err(TopologyError::InvalidRange {
                index,
                start: shard.slot_start,
                end: shard.slot_end,
            });
        }
        if shard.owner.as_str().is_empty() {
            return Err(TopologyError::MissingOwner(index));
        }

        let start = u32::from(shard.slot_start);
        if start > next_slot {
            return Err(TopologyError::Gap {
                start: next_slot as u16,
                end: shard.slot_start - 1,
            });
        }
        if start < next_slot {
            return Err(TopologyError::Overlap {
                first: index - 1,
                second: index,
                slot: shard.slot_start,
            });
        }
        next_slot = u32::from(shard.slot_end) + 1;
    }

    if next_slot < u32::from(SLOT_COUNT) {
        return Err(TopologyError::Gap {
            start: next_slot as u16,
            end: SLOT_COUNT - 1,
        });
    }
    Ok(())
}
