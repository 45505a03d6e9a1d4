//! Client-side keyspace scanning for slot-sharded clusters.
//!
//! A clustered key-value store splits its keyspace into 16384 hash slots
//! spread across nodes, and each node can only scan the keys it owns. This
//! crate turns the per-node `SCAN` primitive into one resumable scan of the
//! whole cluster:
//! - **Opaque cursors** encoding the shard being scanned and that node's
//!   native cursor, safe to persist and resume from later
//! - **Shared topology view** fetched lazily and refreshed when a node
//!   reports it no longer owns the slots it was asked about
//! - **Member scans** of a single hash, set or sorted set on whichever node
//!   owns the key
//!
//! The caller supplies the transport ([`RequestExecutor`]) and the topology
//! source ([`TopologySource`]); the engine owns paging, routing and retry.
//!
//! # Example
//!
//! ```rust,ignore
//! use slotscan::{ClusterScanner, ScanConfig, ScanOptions};
//!
//! let scanner = ClusterScanner::new(executor, topology_source, ScanConfig::default());
//! let mut session = scanner.start_scan(ScanOptions::new().with_match("user:*").with_count(500))?;
//!
//! loop {
//!     let page = session.next_page().await?;
//!     handle(page.entries);
//!     checkpoint(page.cursor.as_str());
//!     if page.done {
//!         break;
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Application Layer                │
//! └─────────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────────┐
//! │             ClusterScanner                  │
//! │  • start_scan / resume_scan                 │
//! │  • start_single_key_scan                    │
//! └─────────────────────────────────────────────┘
//!                     │
//!     ┌───────────────┼────────────────┐
//!     ▼               ▼                ▼
//! ┌─────────┐   ┌───────────┐   ┌──────────────┐
//! │ Options │   │  Cursor   │   │  Topology    │
//! │ Encoder │   │  Codec    │   │  View        │
//! └─────────┘   └───────────┘   └──────────────┘
//! ```
//!
//! # Consistency Model
//!
//! - Every key present for the whole scan and never moved is returned at
//!   least once
//! - Keys written, deleted or migrated during the scan may be missed or
//!   returned twice
//! - A failed page request never moves the session, so it can be retried

pub mod config;
pub mod cursor;
pub mod error;
pub mod metrics;
pub mod options;
pub mod scan;
pub mod testing;
pub mod topology;
pub mod types;

// Re-export main types for convenience
pub use config::ScanConfig;
pub use error::{Error, ErrorKind, Result, TopologyError};
pub use scan::{ClusterScanner, RequestExecutor, ScanSession, SessionState, SingleKeyScanSession};
pub use types::{
    key_slot, NodeAddress, ObjectType, Page, ScanCommand, ScanEntry, ScanReply, SLOT_COUNT,
};

// Re-export option and cursor types
pub use cursor::{ScanCursor, ShardCursorCodec, ShardCursorState};
pub use options::{OptionEncoder, ScanOptions};

// Re-export topology types
pub use topology::{ShardDescriptor, ShardTopology, ShardTopologyView, TopologySource};

pub use metrics::{ScanMetrics, ScanMetricsSnapshot};
