//! Error types for the scan engine.

use thiserror::Error;

/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scan engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An option value was rejected before any request was issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A caller-supplied cursor token could not be decoded, or decodes to a
    /// shard that does not exist in the current topology.
    #[error("malformed cursor {cursor:?}: {reason}")]
    MalformedCursor { cursor: String, reason: String },

    /// The targeted node no longer owns the slot range it was asked to scan.
    #[error("routing stale at {node}: {reason}")]
    RoutingStale { node: String, reason: String },

    /// The topology source failed, or produced an unusable topology.
    #[error("topology unavailable: {0}")]
    TopologyUnavailable(String),

    /// A fetched topology violates the slot partition invariant.
    #[error("invalid topology: {0}")]
    InvalidTopology(#[from] TopologyError),

    /// The store replied with something a scan reply cannot be built from.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Any other error reported by the store (authentication, OOM, ...).
    #[error("remote error: {0}")]
    Remote(String),

    /// The operation was cancelled by the executor.
    #[error("operation cancelled")]
    Cancelled,

    /// The executor gave up waiting for the store.
    #[error("operation timed out")]
    Timeout,
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad option value; never retried.
    InvalidArgument,
    /// Unusable cursor token; the scan must restart.
    MalformedCursor,
    /// Ownership moved; handled internally by one refresh and one retry.
    RoutingStale,
    /// Topology could not be fetched; the same request may be retried.
    TopologyUnavailable,
    /// Everything else, surfaced verbatim.
    Fatal,
}

impl ErrorKind {
    /// Every kind, in metrics export order.
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::InvalidArgument,
        ErrorKind::MalformedCursor,
        ErrorKind::RoutingStale,
        ErrorKind::TopologyUnavailable,
        ErrorKind::Fatal,
    ];

    /// Label used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::MalformedCursor => "malformed_cursor",
            ErrorKind::RoutingStale => "routing_stale",
            ErrorKind::TopologyUnavailable => "topology_unavailable",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Build a [`Error::MalformedCursor`].
    pub fn malformed_cursor(cursor: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedCursor {
            cursor: cursor.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`Error::RoutingStale`].
    pub fn routing_stale(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::RoutingStale {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::MalformedCursor { .. } => ErrorKind::MalformedCursor,
            Error::RoutingStale { .. } => ErrorKind::RoutingStale,
            Error::TopologyUnavailable(_) | Error::InvalidTopology(_) => {
                ErrorKind::TopologyUnavailable
            }
            Error::Protocol(_) | Error::Remote(_) | Error::Cancelled | Error::Timeout => {
                ErrorKind::Fatal
            }
        }
    }

    /// Whether repeating the same `next_page` call unchanged may succeed.
    ///
    /// A failed page request never advances session state, so retrying is
    /// always safe; this only says whether it is worth it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TopologyUnavailable | ErrorKind::RoutingStale
        ) || matches!(self, Error::Timeout)
    }
}

/// Violations of the slot partition invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// The source returned no shards.
    #[error("topology has no shards")]
    Empty,

    /// A shard's range is inverted or exceeds the slot space.
    #[error("shard {index} has invalid slot range {start}..={end}")]
    InvalidRange { index: usize, start: u16, end: u16 },

    /// A range of slots is not owned by any shard.
    #[error("slots {start}..={end} are not covered")]
    Gap { start: u16, end: u16 },

    /// Two shards claim the same slot.
    #[error("shards {first} and {second} overlap at slot {slot}")]
    Overlap {
        first: usize,
        second: usize,
        slot: u16,
    },

    /// A shard has no owner address.
    #[error("shard {0} has an empty owner address")]
    MissingOwner(usize),
}
