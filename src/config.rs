//! Configuration types for the scan engine.

/// Configuration shared by every session a [`ClusterScanner`] starts.
///
/// [`ClusterScanner`]: crate::scan::ClusterScanner
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// When a resumed cursor names a shard index the current topology does
    /// not have, refresh the topology once and decode again before failing.
    pub refresh_on_stale_cursor: bool,

    /// Check that fetched topologies partition the slot space before
    /// installing them.
    pub validate_topology: bool,

    /// Count hint applied when a scan's options carry none.
    pub default_count: Option<i64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            refresh_on_stale_cursor: true,
            validate_topology: true,
            default_count: None,
        }
    }
}

impl ScanConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the refresh-and-redecode step for stale cursors.
    pub fn with_refresh_on_stale_cursor(mut self, enabled: bool) -> Self {
        self.refresh_on_stale_cursor = enabled;
        self
    }

    /// Enable or disable slot partition validation.
    pub fn with_validate_topology(mut self, enabled: bool) -> Self {
        self.validate_topology = enabled;
        self
    }

    /// Set the fallback count hint.
    pub fn with_default_count(mut self, count: i64) -> Self {
        self.default_count = Some(count);
        self
    }
}
