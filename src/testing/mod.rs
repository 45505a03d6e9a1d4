//! Testing utilities for code built on the scan engine.
//!
//! This module provides in-process stand-ins for the two collaborators a
//! scanner needs:
//! - [`MockExecutor`] and [`MockTopologySource`] replay scripted replies and
//!   topologies, and record every call for assertions
//! - [`MockCluster`] is a small slot-sharded store that pages for real and
//!   can be resharded between pages
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ClusterScanner                          │
//! └─────────────────────────────────────────────────────────────────┘
//!            │ RequestExecutor                 │ TopologySource
//!            ▼                                 ▼
//! ┌──────────────────────────┐    ┌──────────────────────────────────┐
//! │  MockExecutor            │    │  MockTopologySource              │
//! │  - scripted replies      │    │  - queued shard lists            │
//! │  - MOVED injection       │    │  - fetch failures                │
//! │  - call recording        │    │  - fetch counting                │
//! └──────────────────────────┘    └──────────────────────────────────┘
//!            │                                 │
//!            └──────────────┬──────────────────┘
//!                           ▼ (or both at once)
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  MockCluster: keys, hashes, sets and sorted sets by slot         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use slotscan::testing::{even_shards, MockCluster};
//! use slotscan::{ClusterScanner, ScanConfig, ScanOptions};
//! use std::sync::Arc;
//!
//! let cluster = Arc::new(MockCluster::new(even_shards(&["a:6379", "b:6379"])));
//! cluster.insert_string("user:1", "alice");
//!
//! let scanner = ClusterScanner::new(cluster.clone(), cluster.clone(), ScanConfig::default());
//! let mut session = scanner.start_scan(ScanOptions::new())?;
//! let keys = session.collect_all().await?;
//! ```

mod cluster;
mod mock;

mod cluster_scan_tests;
mod scan_session_tests;

pub use cluster::{glob_match, MockCluster, MockValue};
pub use mock::{even_shards, MockExecutor, MockTopologySource, RecordedCall};
