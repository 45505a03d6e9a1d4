//! Shared, lazily fetched topology snapshot.

use super::shard::{ShardDescriptor, ShardTopology};
use super::TopologySource;
use crate::error::{Error, Result};
use crate::metrics::ScanMetrics;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Read-mostly view of the cluster topology, shared by every session.
///
/// # Locking
///
/// - `snapshot` is only ever replaced wholesale: readers clone the `Arc`
///   under a short read lock and never observe a half-updated topology.
/// - `refresh_lock` serializes fetches. It is a `tokio` mutex because it is
///   held across the fetch `.await`; `snapshot` is never held across one.
/// - A caller asking for a refresh names the generation it found stale. If a
///   newer generation was installed while it waited, that one is returned
///   without fetching again, so a burst of routing failures costs one fetch.
#[derive(Debug)]
pub struct ShardTopologyView {
    source: Arc<dyn TopologySource>,
    snapshot: RwLock<Option<Arc<ShardTopology>>>,
    refresh_lock: Mutex<()>,
    validate: bool,
    metrics: Arc<ScanMetrics>,
}

impl ShardTopologyView {
    /// Create a view over `source`. Nothing is fetched until first use.
    pub fn new(source: Arc<dyn TopologySource>) -> Self {
        Self::with_options(source, true, Arc::new(ScanMetrics::new()))
    }

    /// Create a view with explicit validation and metrics.
    pub fn with_options(
        source: Arc<dyn TopologySource>,
        validate: bool,
        metrics: Arc<ScanMetrics>,
    ) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            validate,
            metrics,
        }
    }

    /// The installed snapshot, if one was fetched already.
    pub fn cached(&self) -> Option<Arc<ShardTopology>> {
        self.snapshot.read().clone()
    }

    /// Generation of the installed snapshot; 0 before the first fetch.
    pub fn generation(&self) -> u64 {
        self.cached().map(|t| t.generation()).unwrap_or(0)
    }

    /// The current snapshot, fetching it on first use.
    pub async fn current(&self) -> Result<Arc<ShardTopology>> {
        if let Some(topology) = self.cached() {
            return Ok(topology);
        }
        self.refresh(0).await
    }

    /// Shards of the current snapshot, in scan order.
    pub async fn current_shards(&self) -> Result<Vec<ShardDescriptor>> {
        Ok(self.current().await?.shards().to_vec())
    }

    /// Replace a snapshot the caller found stale.
    ///
    /// `stale_generation` is the generation the caller was using. If a newer
    /// snapshot is already installed it is returned as is.
    ///
    /// On failure the installed snapshot is left untouched and the error is
    /// reported as [`Error::TopologyUnavailable`] (or
    /// [`Error::InvalidTopology`] for a fetched topology that fails
    /// validation); both are retryable.
    pub async fn refresh(&self, stale_generation: u64) -> Result<Arc<ShardTopology>> {
        let _guard = self.refresh_lock.lock().await;

        let previous = self.cached();
        if let Some(ref topology) = previous {
            if topology.generation() > stale_generation {
                tracing::debug!(
                    generation = topology.generation(),
                    stale_generation,
                    "Topology already refreshed by another session"
                );
                return Ok(topology.clone());
            }
        }

        let shards = match self.source.fetch_topology().await {
            Ok(shards) => shards,
            Err(e) => {
                self.metrics.topology_refresh_failures.inc();
                tracing::warn!(error = %e, "Topology fetch failed");
                return Err(match e {
                    Error::TopologyUnavailable(_) | Error::InvalidTopology(_) => e,
                    other => Error::TopologyUnavailable(other.to_string()),
                });
            }
        };

        let generation = previous.map(|t| t.generation()).unwrap_or(0) + 1;
        let topology = match ShardTopology::new(generation, shards, self.validate) {
            Ok(topology) => Arc::new(topology),
            Err(e) => {
                self.metrics.topology_refresh_failures.inc();
                tracing::warn!(error = %e, "Rejected fetched topology");
                return Err(e.into());
            }
        };

        *self.snapshot.write() = Some(topology.clone());
        self.metrics.topology_refreshes.inc();

        tracing::info!(
            generation,
            shards = topology.shard_count(),
            "Installed topology snapshot"
        );

        Ok(topology)
    }
}
