//! Issuing scan requests with the single routing retry.

use super::RequestExecutor;
use crate::error::{Error, Result};
use crate::metrics::ScanMetrics;
use crate::topology::{ShardTopology, ShardTopologyView};
use crate::types::{NodeAddress, ScanCommand, ScanReply};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

/// Collaborators shared by a scanner and all of its sessions.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    pub(crate) executor: Arc<dyn RequestExecutor>,
    pub(crate) view: Arc<ShardTopologyView>,
    pub(crate) metrics: Arc<ScanMetrics>,
}

impl Dispatcher {
    /// Send one request to `node` and time it.
    async fn execute(
        &self,
        node: &NodeAddress,
        command: ScanCommand,
        args: Vec<Bytes>,
    ) -> Result<ScanReply> {
        let start = Instant::now();
        let result = self.executor.execute(node, command, args).await;
        self.metrics.record_request(start.elapsed());
        result
    }

    /// Send a request to the node `resolve` picks from `topology`.
    ///
    /// If the node answers that it no longer owns the slots, the topology is
    /// refreshed once, the target is resolved again against the new
    /// snapshot, and the same request is sent once more. A second routing
    /// failure is returned to the caller. Any other error is returned as is.
    pub(crate) async fn execute_routed<F>(
        &self,
        topology: &ShardTopology,
        resolve: F,
        command: ScanCommand,
        args: Vec<Bytes>,
    ) -> Result<ScanReply>
    where
        F: Fn(&ShardTopology) -> Result<NodeAddress>,
    {
        let node = resolve(topology)?;

        let stale = match self.execute(&node, command, args.clone()).await {
            Err(e @ Error::RoutingStale { .. }) => e,
            other => return other,
        };

        tracing::warn!(
            node = %node,
            command = %command,
            generation = topology.generation(),
            error = %stale,
            "Routing stale, refreshing topology and retrying once"
        );
        self.metrics.routing_retries.inc();

        let refreshed = self.view.refresh(topology.generation()).await?;
        let retry_node = resolve(&refreshed)?;

        tracing::debug!(
            node = %retry_node,
            previous = %node,
            generation = refreshed.generation(),
            "Retrying scan request"
        );

        self.execute(&retry_node, command, args).await
    }
}
