//! Metrics for monitoring scans.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       ScanMetrics                        │
//! │  ┌────────────────────┐  ┌──────────────────────────┐   │
//! │  │  Counters          │  │  Histograms              │   │
//! │  │ - pages, requests  │  │ - scan request latency   │   │
//! │  │ - routing retries  │  └──────────────────────────┘   │
//! │  │ - refreshes        │                                 │
//! │  │ - errors by kind   │                                 │
//! │  └────────────────────┘                                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! One `ScanMetrics` is shared by a scanner, its topology view, and every
//! session it starts.

mod counters;
mod histograms;

pub use counters::{Counter, ErrorCounter};
pub use histograms::{Histogram, HistogramSnapshot};

use crate::error::ErrorKind;
use std::time::Duration;

/// Latency buckets for a single scan primitive call (in seconds).
pub const SCAN_LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

/// Scan engine metrics.
#[derive(Debug)]
pub struct ScanMetrics {
    /// Pages handed to callers.
    pub pages_total: Counter,
    /// Entries handed to callers.
    pub entries_total: Counter,
    /// Scan primitive calls issued.
    pub requests_total: Counter,
    /// Requests repeated after a routing-stale failure.
    pub routing_retries: Counter,
    /// Topology fetches that installed a new snapshot.
    pub topology_refreshes: Counter,
    /// Topology fetches that failed.
    pub topology_refresh_failures: Counter,
    /// Shards fully drained.
    pub shards_completed: Counter,
    /// Scans that reached the terminal page.
    pub scans_completed: Counter,
    /// Scan primitive latency.
    pub request_latency: Histogram,
    /// Errors surfaced to callers, by kind.
    pub errors: ErrorCounter,
}

impl ScanMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            pages_total: Counter::new("scan_pages_total", "Pages returned to callers"),
            entries_total: Counter::new("scan_entries_total", "Entries returned to callers"),
            requests_total: Counter::new("scan_requests_total", "Scan primitive calls issued"),
            routing_retries: Counter::new(
                "scan_routing_retries_total",
                "Requests retried after a routing-stale error",
            ),
            topology_refreshes: Counter::new(
                "scan_topology_refreshes_total",
                "Topology snapshots installed",
            ),
            topology_refresh_failures: Counter::new(
                "scan_topology_refresh_failures_total",
                "Failed topology fetches",
            ),
            shards_completed: Counter::new("scan_shards_completed_total", "Shards fully drained"),
            scans_completed: Counter::new("scan_completed_total", "Scans that finished"),
            request_latency: Histogram::with_buckets(
                "scan_request_latency_seconds",
                "Scan primitive latency",
                SCAN_LATENCY_BUCKETS.to_vec(),
            ),
            errors: ErrorCounter::new("scan_errors_total", "Errors surfaced to callers, by kind"),
        }
    }

    /// Record one scan primitive call.
    pub fn record_request(&self, latency: Duration) {
        self.requests_total.inc();
        self.request_latency.observe_duration(latency);
    }

    /// Record a page handed to the caller.
    pub fn record_page(&self, entries: usize) {
        self.pages_total.inc();
        self.entries_total.add(entries as u64);
    }

    /// Record an error surfaced to the caller.
    pub fn record_error(&self, kind: ErrorKind) {
        self.errors.inc(kind);
    }

    /// Get a snapshot of the current values.
    pub fn snapshot(&self) -> ScanMetricsSnapshot {
        ScanMetricsSnapshot {
            pages_total: self.pages_total.get(),
            entries_total: self.entries_total.get(),
            requests_total: self.requests_total.get(),
            routing_retries: self.routing_retries.get(),
            topology_refreshes: self.topology_refreshes.get(),
            topology_refresh_failures: self.topology_refresh_failures.get(),
            shards_completed: self.shards_completed.get(),
            scans_completed: self.scans_completed.get(),
            request_latency: self.request_latency.snapshot(),
        }
    }

    /// Format metrics in Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        for counter in [
            &self.pages_total,
            &self.entries_total,
            &self.requests_total,
            &self.routing_retries,
            &self.topology_refreshes,
            &self.topology_refresh_failures,
            &self.shards_completed,
            &self.scans_completed,
        ] {
            counter.write_prometheus(&mut output);
        }
        self.errors.write_prometheus(&mut output);

        let latency = self.request_latency.snapshot();
        output.push_str(&format!(
            "# HELP {name} {help}\n# TYPE {name} histogram\n{name}_sum {}\n{name}_count {}\n",
            latency.sum,
            latency.count,
            name = self.request_latency.name(),
            help = self.request_latency.help()
        ));

        output
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of scan metrics.
#[derive(Debug, Clone)]
pub struct ScanMetricsSnapshot {
    pub pages_total: u64,
    pub entries_total: u64,
    pub requests_total: u64,
    pub routing_retries: u64,
    pub topology_refreshes: u64,
    pub topology_refresh_failures: u64,
    pub shards_completed: u64,
    pub scans_completed: u64,
    pub request_latency: HistogramSnapshot,
}

impl ScanMetricsSnapshot {
    /// Average entries per page.
    pub fn avg_page_size(&self) -> f64 {
        if self.pages_total == 0 {
            0.0
        } else {
            self.entries_total as f64 / self.pages_total as f64
        }
    }
}
