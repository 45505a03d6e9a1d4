//! Translation of [`ScanOptions`] into protocol arguments.

use super::ScanOptions;
use crate::error::{Error, Result};
use crate::types::ScanCommand;
use bytes::Bytes;

/// Keyword preceding the match pattern.
pub const MATCH_KEYWORD: &str = "MATCH";
/// Keyword preceding the count hint.
pub const COUNT_KEYWORD: &str = "COUNT";
/// Keyword preceding the type filter.
pub const TYPE_KEYWORD: &str = "TYPE";
/// Flag suppressing sorted set scores.
pub const NO_SCORES_KEYWORD: &str = "NOSCORES";
/// Flag suppressing hash values.
pub const NO_VALUES_KEYWORD: &str = "NOVALUES";

/// Stateless encoder for scan options.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionEncoder;

impl OptionEncoder {
    /// Check that `options` can be sent with `command`.
    pub fn validate(command: ScanCommand, options: &ScanOptions) -> Result<()> {
        if let Some(count) = options.count {
            if count <= 0 {
                return Err(Error::InvalidArgument(format!(
                    "count must be positive, got {}",
                    count
                )));
            }
        }
        if options.object_type.is_some() && command != ScanCommand::Scan {
            return Err(Error::InvalidArgument(format!(
                "{} does not accept {}",
                command, TYPE_KEYWORD
            )));
        }
        if options.no_scores && command != ScanCommand::ZScan {
            return Err(Error::InvalidArgument(format!(
                "{} does not accept {}",
                command, NO_SCORES_KEYWORD
            )));
        }
        if options.no_values && command != ScanCommand::HScan {
            return Err(Error::InvalidArgument(format!(
                "{} does not accept {}",
                command, NO_VALUES_KEYWORD
            )));
        }
        Ok(())
    }

    /// Encode `options` for `command`, omitting every unset option.
    ///
    /// Arguments are always emitted in the order `MATCH`, `COUNT`, `TYPE`,
    /// `NOSCORES`, `NOVALUES`. The key and cursor arguments are not part of
    /// the output; the session places them in front.
    pub fn encode(command: ScanCommand, options: &ScanOptions) -> Result<Vec<Bytes>> {
        Self::validate(command, options)?;

        let mut args = Vec::with_capacity(6);
        if let Some(ref pattern) = options.match_pattern {
            args.push(Bytes::from_static(MATCH_KEYWORD.as_bytes()));
            args.push(pattern.clone());
        }
        if let Some(count) = options.count {
            args.push(Bytes::from_static(COUNT_KEYWORD.as_bytes()));
            args.push(Bytes::from(count.to_string()));
        }
        if let Some(object_type) = options.object_type {
            args.push(Bytes::from_static(TYPE_KEYWORD.as_bytes()));
            args.push(Bytes::from_static(object_type.as_str().as_bytes()));
        }
        if options.no_scores {
            args.push(Bytes::from_static(NO_SCORES_KEYWORD.as_bytes()));
        }
        if options.no_values {
            args.push(Bytes::from_static(NO_VALUES_KEYWORD.as_bytes()));
        }
        Ok(args)
    }
}
