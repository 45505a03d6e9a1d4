//! Opaque cluster scan cursors.
//!
//! A [`ScanCursor`] is what callers see: a short string safe to log, persist
//! and hand back later. Internally it carries a [`ShardCursorState`], the
//! index of the shard being scanned plus the store's own cursor within that
//! shard. Cursors are self-contained; nothing about a scan lives anywhere
//! but in its token.
//!
//! # Format
//!
//! ```text
//! "0"                          not started (shard 0, native cursor 0)
//! "<shard>.<native>.<crc32c>"  mid-scan position, crc32c in 8 hex digits
//! "finished"                   terminal
//! ```
//!
//! The checksum covers `"<shard>.<native>"` and rejects tokens that were
//! truncated, hand-edited, or belong to some other scheme.

use crate::error::{Error, Result};
use crc::{Crc, CRC_32_ISCSI};
use serde::{Deserialize, Serialize};
use std::fmt;

const CURSOR_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

const INITIAL_TOKEN: &str = "0";
const FINISHED_TOKEN: &str = "finished";

/// Opaque, resumable position of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanCursor(String);

impl ScanCursor {
    /// The cursor of a scan that has not started.
    pub fn initial() -> Self {
        Self(INITIAL_TOKEN.to_string())
    }

    /// The terminal cursor of a completed scan.
    pub fn finished() -> Self {
        Self(FINISHED_TOKEN.to_string())
    }

    /// Wrap a token received from a caller.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Whether this is the not-started cursor.
    pub fn is_initial(&self) -> bool {
        self.0 == INITIAL_TOKEN
    }

    /// Whether this is the terminal cursor.
    pub fn is_finished(&self) -> bool {
        self.0 == FINISHED_TOKEN
    }

    /// Borrow the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the token string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for ScanCursor {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScanCursor {
    fn from(token: &str) -> Self {
        Self::from_token(token)
    }
}

impl From<String> for ScanCursor {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Decoded position: which shard, and where inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShardCursorState {
    /// Ordinal into the topology's ordered shard list.
    pub shard_index: usize,
    /// Store cursor within that shard; 0 means "from the beginning".
    pub native_cursor: u64,
}

impl ShardCursorState {
    /// Create a new state.
    pub fn new(shard_index: usize, native_cursor: u64) -> Self {
        Self {
            shard_index,
            native_cursor,
        }
    }

    /// The beginning of `shard_index`.
    pub fn start_of(shard_index: usize) -> Self {
        Self::new(shard_index, 0)
    }
}

/// Encodes and decodes [`ScanCursor`] tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShardCursorCodec;

impl ShardCursorCodec {
    /// Encode a position. The start of shard 0 encodes to the initial token.
    pub fn encode(state: &ShardCursorState) -> ScanCursor {
        if *state == ShardCursorState::default() {
            return ScanCursor::initial();
        }
        let body = format!("{}.{}", state.shard_index, state.native_cursor);
        let checksum = CURSOR_CRC.checksum(body.as_bytes());
        ScanCursor(format!("{}.{:08x}", body, checksum))
    }

    /// Decode a token against a topology of `shard_count` shards.
    ///
    /// Fails with [`Error::MalformedCursor`] if the token does not parse, its
    /// checksum does not match, or its shard index is out of range.
    pub fn decode(cursor: &ScanCursor, shard_count: usize) -> Result<ShardCursorState> {
        let state = Self::parse(cursor)?;
        Self::check_range(cursor, &state, shard_count)?;
        Ok(state)
    }

    /// Decode a token without checking its shard index.
    pub fn parse(cursor: &ScanCursor) -> Result<ShardCursorState> {
        let token = cursor.as_str();
        if cursor.is_initial() {
            return Ok(ShardCursorState::default());
        }
        if cursor.is_finished() {
            return Err(Error::malformed_cursor(token, "scan already finished"));
        }

        let mut parts = token.split('.');
        let (Some(shard), Some(native), Some(checksum), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::malformed_cursor(token, "expected three components"));
        };

        if !is_decimal(shard) || !is_decimal(native) {
            return Err(Error::malformed_cursor(token, "non-numeric position"));
        }
        if checksum.len() != 8 || !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::malformed_cursor(token, "invalid checksum field"));
        }

        let expected = u32::from_str_radix(checksum, 16)
            .map_err(|e| Error::malformed_cursor(token, e.to_string()))?;
        let body = &token[..shard.len() + 1 + native.len()];
        if CURSOR_CRC.checksum(body.as_bytes()) != expected {
            return Err(Error::malformed_cursor(token, "checksum mismatch"));
        }

        let shard_index = shard
            .parse::<usize>()
            .map_err(|e| Error::malformed_cursor(token, format!("shard index: {}", e)))?;
        let native_cursor = native
            .parse::<u64>()
            .map_err(|e| Error::malformed_cursor(token, format!("native cursor: {}", e)))?;

        Ok(ShardCursorState::new(shard_index, native_cursor))
    }

    /// Fail if `state` names a shard outside `0..shard_count`.
    pub fn check_range(
        cursor: &ScanCursor,
        state: &ShardCursorState,
        shard_count: usize,
    ) -> Result<()> {
        if state.shard_index >= shard_count {
            return Err(Error::malformed_cursor(
                cursor.as_str(),
                format!(
                    "shard index {} out of range for {} shards",
                    state.shard_index, shard_count
                ),
            ));
        }
        Ok(())
    }
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
