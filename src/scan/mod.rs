//! Scan sessions and the scanner that starts them.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        ClusterScanner                         │
//! │   start_scan / resume_scan / start_single_key_scan            │
//! └───────────────────────────────────────────────────────────────┘
//!          │                                      │
//!          ▼                                      ▼
//! ┌──────────────────────┐              ┌──────────────────────────┐
//! │     ScanSession      │              │   SingleKeyScanSession   │
//! │  NotStarted          │              │  HSCAN / SSCAN / ZSCAN   │
//! │  → InShard(0..n)     │              │  on the key's owner      │
//! │  → Completed         │              │                          │
//! └──────────────────────┘              └──────────────────────────┘
//!          │                                      │
//!          └──────────────┬───────────────────────┘
//!                         ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  RequestExecutor (caller)      ShardTopologyView (shared)     │
//! │  one request in flight         refreshed on RoutingStale      │
//! │  per session                   then one retry                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Cancellation
//!
//! The engine has no timers or background tasks of its own. Dropping a
//! `next_page` future cancels the in-flight request in whatever way the
//! executor supports; the session is left where it was, since state only
//! moves once a reply has been decoded.
//!
//! # Example
//!
//! ```rust,ignore
//! use slotscan::{ClusterScanner, ScanConfig, ScanOptions};
//!
//! let scanner = ClusterScanner::new(executor, topology_source, ScanConfig::default());
//! let mut session = scanner.start_scan(ScanOptions::new().with_match("user:*"))?;
//!
//! loop {
//!     let page = session.next_page().await?;
//!     for entry in &page.entries {
//!         println!("{:?}", entry.name());
//!     }
//!     // page.cursor can be persisted and handed to resume_scan later.
//!     if page.done {
//!         break;
//!     }
//! }
//! ```

mod dispatch;
mod reply;
mod session;
mod single_key;

pub use session::{ScanSession, SessionState};
pub use single_key::SingleKeyScanSession;

use crate::config::ScanConfig;
use crate::cursor::{ScanCursor, ShardCursorCodec};
use crate::error::Result;
use crate::metrics::ScanMetrics;
use crate::options::ScanOptions;
use crate::topology::{ShardTopologyView, TopologySource};
use crate::types::{NodeAddress, ScanCommand, ScanReply};
use bytes::Bytes;
use dispatch::Dispatcher;
use std::sync::Arc;

/// Sends one scan primitive call to one node.
///
/// Implementations own connections, authentication and retries for
/// transient network errors. They report a redirect (`MOVED`, or a node
/// that no longer serves the slot) as [`Error::RoutingStale`]; every other
/// error is surfaced to the caller unchanged.
///
/// `args` holds everything after the command name: the key for collection
/// scans, the native cursor, then the encoded options.
///
/// [`Error::RoutingStale`]: crate::Error::RoutingStale
#[async_trait::async_trait]
pub trait RequestExecutor: Send + Sync + std::fmt::Debug {
    /// Execute `command` with `args` on `node`.
    async fn execute(
        &self,
        node: &NodeAddress,
        command: ScanCommand,
        args: Vec<Bytes>,
    ) -> Result<ScanReply>;
}

/// Entry point: starts and resumes scans against one cluster.
#[derive(Debug, Clone)]
pub struct ClusterScanner {
    config: ScanConfig,
    dispatcher: Dispatcher,
}

impl ClusterScanner {
    /// Create a scanner with its own topology view.
    pub fn new(
        executor: Arc<dyn RequestExecutor>,
        source: Arc<dyn TopologySource>,
        config: ScanConfig,
    ) -> Self {
        let metrics = Arc::new(ScanMetrics::new());
        let view = Arc::new(ShardTopologyView::with_options(
            source,
            config.validate_topology,
            metrics.clone(),
        ));
        Self::with_view(executor, view, metrics, config)
    }

    /// Create a scanner sharing an existing topology view.
    pub fn with_view(
        executor: Arc<dyn RequestExecutor>,
        view: Arc<ShardTopologyView>,
        metrics: Arc<ScanMetrics>,
        config: ScanConfig,
    ) -> Self {
        Self {
            config,
            dispatcher: Dispatcher {
                executor,
                view,
                metrics,
            },
        }
    }

    /// Scanner configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// The shared topology view.
    pub fn topology(&self) -> &Arc<ShardTopologyView> {
        &self.dispatcher.view
    }

    /// Metrics shared by all sessions of this scanner.
    pub fn metrics(&self) -> &Arc<ScanMetrics> {
        &self.dispatcher.metrics
    }

    fn with_defaults(&self, options: ScanOptions) -> ScanOptions {
        options.or_default_count(self.config.default_count)
    }

    /// Start a scan of the whole keyspace.
    ///
    /// Fails with `InvalidArgument` if the options are not valid for `SCAN`.
    pub fn start_scan(&self, options: ScanOptions) -> Result<ScanSession> {
        ScanSession::new(
            self.dispatcher.clone(),
            self.with_defaults(options),
            SessionState::NotStarted,
        )
    }

    /// Resume a keyspace scan from a cursor returned by an earlier page.
    ///
    /// The terminal cursor yields an already completed session. A cursor
    /// naming a shard the current topology does not have is rejected with
    /// `MalformedCursor`, after one topology refresh if
    /// [`ScanConfig::refresh_on_stale_cursor`] is set.
    pub async fn resume_scan(
        &self,
        options: ScanOptions,
        cursor: &ScanCursor,
    ) -> Result<ScanSession> {
        let options = self.with_defaults(options);
        let state = self.resume_state(cursor).await;
        let state = match state {
            Ok(state) => state,
            Err(e) => {
                self.dispatcher.metrics.record_error(e.kind());
                return Err(e);
            }
        };
        ScanSession::new(self.dispatcher.clone(), options, state)
    }

    async fn resume_state(&self, cursor: &ScanCursor) -> Result<SessionState> {
        if cursor.is_finished() {
            return Ok(SessionState::Completed);
        }
        if cursor.is_initial() {
            return Ok(SessionState::NotStarted);
        }

        let position = ShardCursorCodec::parse(cursor)?;
        let topology = self.dispatcher.view.current().await?;
        if position.shard_index < topology.scan_target_count() {
            return Ok(SessionState::InShard(position));
        }

        if self.config.refresh_on_stale_cursor {
            tracing::info!(
                cursor = %cursor,
                shard_count = topology.scan_target_count(),
                "Cursor names an unknown shard, refreshing topology"
            );
            let refreshed = self.dispatcher.view.refresh(topology.generation()).await?;
            ShardCursorCodec::check_range(cursor, &position, refreshed.scan_target_count())?;
            return Ok(SessionState::InShard(position));
        }

        ShardCursorCodec::check_range(cursor, &position, topology.scan_target_count())?;
        Ok(SessionState::InShard(position))
    }

    /// Start a member scan of one key.
    ///
    /// `command` must be `HScan`, `SScan` or `ZScan`.
    pub fn start_single_key_scan(
        &self,
        command: ScanCommand,
        key: impl Into<Bytes>,
        options: ScanOptions,
    ) -> Result<SingleKeyScanSession> {
        SingleKeyScanSession::new(
            self.dispatcher.clone(),
            command,
            key.into(),
            self.with_defaults(options),
            SessionState::NotStarted,
        )
    }

    /// Resume a member scan from a cursor returned by an earlier page.
    pub fn resume_single_key_scan(
        &self,
        command: ScanCommand,
        key: impl Into<Bytes>,
        options: ScanOptions,
        cursor: &ScanCursor,
    ) -> Result<SingleKeyScanSession> {
        let state = if cursor.is_finished() {
            SessionState::Completed
        } else if cursor.is_initial() {
            SessionState::NotStarted
        } else {
            match ShardCursorCodec::decode(cursor, 1) {
                Ok(position) => SessionState::InShard(position),
                Err(e) => {
                    self.dispatcher.metrics.record_error(e.kind());
                    return Err(e);
                }
            }
        };
        SingleKeyScanSession::new(
            self.dispatcher.clone(),
            command,
            key.into(),
            self.with_defaults(options),
            state,
        )
    }
}
