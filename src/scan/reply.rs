//! Turning raw scan replies into cursors and entries.

use crate::error::{Error, Result};
use crate::options::ScanOptions;
use crate::types::{ScanCommand, ScanEntry, ScanReply};
use bytes::Bytes;

/// Parse the native cursor of a reply.
pub(crate) fn parse_native_cursor(raw: &Bytes) -> Result<u64> {
    std::str::from_utf8(raw)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            Error::Protocol(format!(
                "invalid native cursor {:?}",
                String::from_utf8_lossy(raw)
            ))
        })
}

/// Split a reply into its native cursor and typed entries.
///
/// HSCAN and ZSCAN return flat `member, value` arrays unless values or
/// scores were suppressed, in which case only members come back.
pub(crate) fn decode_reply(
    command: ScanCommand,
    options: &ScanOptions,
    reply: ScanReply,
) -> Result<(u64, Vec<ScanEntry>)> {
    let cursor = parse_native_cursor(&reply.cursor)?;

    let paired = match command {
        ScanCommand::Scan | ScanCommand::SScan => false,
        ScanCommand::HScan => !options.no_values,
        ScanCommand::ZScan => !options.no_scores,
    };

    let entries = if paired {
        if reply.items.len() % 2 != 0 {
            return Err(Error::Protocol(format!(
                "{} returned an odd number of elements ({})",
                command,
                reply.items.len()
            )));
        }
        let mut entries = Vec::with_capacity(reply.items.len() / 2);
        let mut items = reply.items.into_iter();
        while let (Some(member), Some(value)) = (items.next(), items.next()) {
            entries.push(ScanEntry::Pair { member, value });
        }
        entries
    } else if command == ScanCommand::Scan {
        reply.items.into_iter().map(ScanEntry::Key).collect()
    } else {
        reply.items.into_iter().map(ScanEntry::Member).collect()
    };

    Ok((cursor, entries))
}
