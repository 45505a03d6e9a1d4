//! Scan options and their protocol encoding.
//!
//! A single [`ScanOptions`] value covers every scan command. Fields that only
//! make sense for one command family (`TYPE` for keyspace scans, `NOSCORES`
//! for sorted sets, `NOVALUES` for hashes) are validated against the target
//! command by [`OptionEncoder`] rather than split into separate types.
//!
//! # Example
//!
//! ```rust
//! use slotscan::{ObjectType, OptionEncoder, ScanCommand, ScanOptions};
//!
//! let options = ScanOptions::new()
//!     .with_match("user:*")
//!     .with_count(500)
//!     .with_type(ObjectType::Hash);
//!
//! let args = OptionEncoder::encode(ScanCommand::Scan, &options).unwrap();
//! assert_eq!(args.len(), 6);
//! ```

mod encoder;

pub use encoder::{
    OptionEncoder, COUNT_KEYWORD, MATCH_KEYWORD, NO_SCORES_KEYWORD, NO_VALUES_KEYWORD,
    TYPE_KEYWORD,
};

use crate::types::ObjectType;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Optional arguments of a scan, reused unchanged for every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Glob pattern the returned keys or members must match.
    pub match_pattern: Option<Bytes>,

    /// Advisory amount of work per call. Not a page size limit.
    pub count: Option<i64>,

    /// Restrict a keyspace scan to one value type.
    pub object_type: Option<ObjectType>,

    /// Omit scores from a sorted set scan. Supported from Valkey 8.0.
    pub no_scores: bool,

    /// Omit values from a hash scan. Supported from Valkey 8.0.
    pub no_values: bool,
}

impl ScanOptions {
    /// Create an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the match pattern.
    pub fn with_match(mut self, pattern: impl Into<Bytes>) -> Self {
        self.match_pattern = Some(pattern.into());
        self
    }

    /// Set the count hint.
    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    /// Set the type filter.
    pub fn with_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = Some(object_type);
        self
    }

    /// Set the `NOSCORES` flag.
    pub fn with_no_scores(mut self, no_scores: bool) -> Self {
        self.no_scores = no_scores;
        self
    }

    /// Set the `NOVALUES` flag.
    pub fn with_no_values(mut self, no_values: bool) -> Self {
        self.no_values = no_values;
        self
    }

    /// Fill in the count hint if none was given.
    pub(crate) fn or_default_count(mut self, count: Option<i64>) -> Self {
        if self.count.is_none() {
            self.count = count;
        }
        self
    }
}
