//! Member scan of a single hash, set or sorted set.

use super::dispatch::Dispatcher;
use super::reply::decode_reply;
use super::session::SessionState;
use crate::cursor::{ScanCursor, ShardCursorCodec, ShardCursorState};
use crate::error::{Error, Result};
use crate::options::{OptionEncoder, ScanOptions};
use crate::topology::ShardTopology;
use crate::types::{key_slot, NodeAddress, Page, ScanCommand, ScanEntry};
use bytes::Bytes;

/// Scan of the members of one key with `HSCAN`, `SSCAN` or `ZSCAN`.
///
/// There is a single implicit shard, the node owning the key's slot, so the
/// cursor always carries shard index 0. If that node reports the key moved,
/// ownership is resolved again from a refreshed topology and the request is
/// retried once.
#[derive(Debug)]
pub struct SingleKeyScanSession {
    dispatcher: Dispatcher,
    command: ScanCommand,
    key: Bytes,
    options: ScanOptions,
    state: SessionState,
}

impl SingleKeyScanSession {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        command: ScanCommand,
        key: Bytes,
        options: ScanOptions,
        state: SessionState,
    ) -> Result<Self> {
        if !command.is_collection() {
            return Err(Error::InvalidArgument(format!(
                "{} does not scan a single key",
                command
            )));
        }
        OptionEncoder::validate(command, &options)?;
        Ok(Self {
            dispatcher,
            command,
            key,
            options,
            state,
        })
    }

    /// The scanned key.
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    /// The scan command in use.
    pub fn command(&self) -> ScanCommand {
        self.command
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

    /// Fetch the next page of members.
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

    /// Drain the scan and return every member.
    pub async fn collect_all(&mut self) -> Result<Vec<ScanEntry>> {
        let mut entries = Vec::new();
        while !self.is_done() {
            entries.extend(self.next_page().await?.entries);
        }
        Ok(entries)
    }

    async fn advance(&mut self) -> Result<Page> {
        let native_cursor = match self.state {
            SessionState::Completed => return Ok(Page::finished()),
            SessionState::NotStarted => 0,
            SessionState::InShard(position) => position.native_cursor,
        };

        let topology = self.dispatcher.view.current().await?;

        let mut args = Vec::with_capacity(8);
        args.push(self.key.clone());
        args.push(Bytes::from(native_cursor.to_string()));
        args.extend(OptionEncoder::encode(self.command, &self.options)?);

        tracing::debug!(
            command = %self.command,
            key = %String::from_utf8_lossy(&self.key),
            native_cursor,
            "Requesting member page"
        );

        let key = &self.key;
        let reply = self
            .dispatcher
            .execute_routed(&topology, |t| owner_of(t, key), self.command, args)
            .await?;

        let (native_cursor, entries) = decode_reply(self.command, &self.options, reply)?;

        if native_cursor == 0 {
            self.state = SessionState::Completed;
            self.dispatcher.metrics.shards_completed.inc();
            self.dispatcher.metrics.scans_completed.inc();
            tracing::debug!(command = %self.command, "Member scan completed");
            return Ok(Page {
                entries,
                cursor: ScanCursor::finished(),
                done: true,
            });
        }

        let next = ShardCursorState::new(0, native_cursor);
        self.state = SessionState::InShard(next);
        Ok(Page {
            entries,
            cursor: ShardCursorCodec::encode(&next),
            done: false,
        })
    }
}

fn owner_of(topology: &ShardTopology, key: &[u8]) -> Result<NodeAddress> {
    topology
        .shard_for_key(key)
        .map(|(_, shard)| shard.owner.clone())
        .ok_or_else(|| {
            Error::TopologyUnavailable(format!("no shard owns slot {}", key_slot(key)))
        })
}
