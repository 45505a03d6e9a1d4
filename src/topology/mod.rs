//! Cluster topology: which shards exist and which node owns each.
//!
//! Topology discovery itself is not done here. A [`TopologySource`] supplied
//! by the caller returns the shard list; [`ShardTopologyView`] caches it as
//! an immutable [`ShardTopology`] snapshot and replaces it when a session
//! reports that routing went stale.

mod shard;
mod view;

pub use shard::{ShardDescriptor, ShardTopology};
pub use view::ShardTopologyView;

use crate::error::Result;

/// Supplier of the cluster's shard list (e.g. `CLUSTER SHARDS`).
#[async_trait::async_trait]
pub trait TopologySource: Send + Sync + std::fmt::Debug {
    /// Fetch the current shard list. Order does not matter; the view sorts
    /// shards by slot range.
    async fn fetch_topology(&self) -> Result<Vec<ShardDescriptor>>;
}
