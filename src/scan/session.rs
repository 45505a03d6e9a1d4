//! Whole-keyspace scan across every shard.

use super::dispatch::Dispatcher;
use super::reply::decode_reply;
use crate::cursor::{ScanCursor, ShardCursorCodec, ShardCursorState};
use crate::error::{Error, Result};
use crate::options::{OptionEncoder, ScanOptions};
use crate::types::{Page, ScanCommand, ScanEntry};
use bytes::Bytes;

/// Where a session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No request has been issued yet.
    NotStarted,
    /// Scanning the shard at `shard_index`, resuming from `native_cursor`.
    InShard(ShardCursorState),
    /// Every shard reported completion.
    Completed,
}

impl SessionState {
    /// The cursor a caller would resume this state from.
    pub fn cursor(&self) -> ScanCursor {
        match self {
            SessionState::NotStarted => ScanCursor::initial(),
            SessionState::InShard(position) => ShardCursorCodec::encode(position),
            SessionState::Completed => ScanCursor::finished(),
        }
    }
}

/// One logical scan of the whole keyspace, one shard at a time.
///
/// Shards are visited in the order of the topology snapshot's
/// [`scan_targets`](crate::topology::ShardTopology::scan_targets): one entry
/// per distinct owner node, so a node holding several slot ranges is scanned
/// once. Each call to [`next_page`](Self::next_page) issues exactly one
/// `SCAN` to the current shard's owner and returns one page. Draining a shard always
/// produces a page of its own (possibly empty) whose cursor points at the
/// start of the next shard, so callers see the cursor move forward on every
/// call.
///
/// A failed call leaves the session exactly where it was, so it can be
/// retried. Sessions are driven by one caller; `next_page` takes `&mut self`.
///
/// If the topology changes shape mid-scan, shard indices are not reconciled
/// against the new shape. Ranges whose ownership moved may be skipped or
/// visited twice, the same weak guarantee the store's own scan gives under
/// concurrent writes.
#[derive(Debug)]
pub struct ScanSession {
    dispatcher: Dispatcher,
    options: ScanOptions,
    state: SessionState,
    shard_count_at_start: Option<usize>,
}

impl ScanSession {
    /// Create a session. Options are validated here, before any request.
    pub(crate) fn new(
        dispatcher: Dispatcher,
        options: ScanOptions,
        state: SessionState,
    ) -> Result<Self> {
        OptionEncoder::validate(ScanCommand::Scan, &options)?;
        Ok(Self {
            dispatcher,
            options,
            state,
            shard_count_at_start: None,
        })
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Cursor to resume from after the last returned page.
    pub fn cursor(&self) -> ScanCursor {
        self.state.cursor()
    }

    /// Whether the terminal page was returned.
    pub fn is_done(&self) -> bool {
        self.state == SessionState::Completed
    }

    /// Options this session was started with.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Shard count of the topology the first request of this session used.
    pub fn shard_count_at_start(&self) -> Option<usize> {
        self.shard_count_at_start
    }

    /// Fetch the next page.
    ///
    /// Once the scan is complete this keeps returning empty terminal pages
    /// without contacting the store.
    pub async fn next_page(&mut self) -> Result<Page> {
        match self.advance().await {
            Ok(page) => {
                self.dispatcher.metrics.record_page(page.len());
                Ok(page)
            }
            Err(e) => {
                self.dispatcher.metrics.record_error(e.kind());
                Err(e)
            }
        }
    }

    /// Drain the scan and return every entry.
    pub async fn collect_all(&mut self) -> Result<Vec<ScanEntry>> {
        let mut entries = Vec::new();
        while !self.is_done() {
            entries.extend(self.next_page().await?.entries);
        }
        Ok(entries)
    }

    async fn advance(&mut self) -> Result<Page> {
        let position = match self.state {
            SessionState::Completed => return Ok(Page::finished()),
            SessionState::NotStarted => ShardCursorState::start_of(0),
            SessionState::InShard(position) => position,
        };

        let topology = self.dispatcher.view.current().await?;
        let shard_count = topology.scan_target_count();
        self.shard_count_at_start.get_or_insert(shard_count);

        if position.shard_index >= shard_count {
            tracing::warn!(
                shard = position.shard_index,
                shard_count,
                "Topology shrank below the scan position, finishing scan"
            );
            return Ok(self.complete(Vec::new()));
        }

        let mut args = Vec::with_capacity(7);
        args.push(Bytes::from(position.native_cursor.to_string()));
        args.extend(OptionEncoder::encode(ScanCommand::Scan, &self.options)?);

        tracing::debug!(
            shard = position.shard_index,
            native_cursor = position.native_cursor,
            generation = topology.generation(),
            "Requesting scan page"
        );

        let shard_index = position.shard_index;
        let reply = self
            .dispatcher
            .execute_routed(
                &topology,
                |t| {
                    t.scan_target(shard_index).cloned().ok_or_else(|| {
                        Error::routing_stale(
                            format!("shard {}", shard_index),
                            format!(
                                "shard index out of range for {} shards",
                                t.scan_target_count()
                            ),
                        )
                    })
                },
                ScanCommand::Scan,
                args,
            )
            .await?;

        let (native_cursor, entries) = decode_reply(ScanCommand::Scan, &self.options, reply)?;

        if native_cursor != 0 {
            let next = ShardCursorState::new(shard_index, native_cursor);
            self.state = SessionState::InShard(next);
            return Ok(Page {
                entries,
                cursor: ShardCursorCodec::encode(&next),
                done: false,
            });
        }

        self.dispatcher.metrics.shards_completed.inc();

        // The view may have been refreshed by the request above.
        let shard_count = self
            .dispatcher
            .view
            .cached()
            .map(|t| t.scan_target_count())
            .unwrap_or(shard_count);

        if shard_index + 1 < shard_count {
            let next = ShardCursorState::start_of(shard_index + 1);
            tracing::info!(
                shard = shard_index,
                next_shard = next.shard_index,
                shard_count,
                "Shard drained"
            );
            self.state = SessionState::InShard(next);
            Ok(Page {
                entries,
                cursor: ShardCursorCodec::encode(&next),
                done: false,
            })
        } else {
            Ok(self.complete(entries))
        }
    }

    fn complete(&mut self, entries: Vec<ScanEntry>) -> Page {
        self.state = SessionState::Completed;
        self.dispatcher.metrics.scans_completed.inc();
        tracing::info!(
            shards = self.shard_count_at_start.unwrap_or(0),
            "Scan completed"
        );
        Page {
            entries,
            cursor: ScanCursor::finished(),
            done: true,
        }
    }
}
