//! Feed payload parsing.
//!
//! A payload is turned into a lazy, single-pass sequence of [`ParsedItem`]s.
//! Items that lack a required field or carry an unreadable date come out as
//! [`ParsedItem::Skipped`] so callers can count them; a payload that is not a
//! feed document at all ends the sequence with a [`ParseError`].
//!
//! # Supported Formats
//!
//! | Feed type | Module | Documents |
//! |-----------|--------|-----------|
//! | `rss` | [`rss`] | RSS 2.0, RSS 1.0 (RDF) and Atom, selected by element names |
//!
//! Payloads are transcoded to UTF-8 by [`encoding`] before parsing, so feeds
//! served as Shift_JIS, EUC-JP or UTF-16 read the same as UTF-8 ones.

pub mod encoding;
pub mod rss;

use crate::error::ParseError;
use crate::models::{FeedRecord, FeedType, Source};
use crate::transport::FetchedPayload;
use std::fmt;

/// One element of a parsed feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedItem {
    Record(FeedRecord),
    Skipped(SkipReason),
}

/// Why an individual item was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingTitle,
    MissingLink,
    InvalidLink(String),
    MissingDate,
    UnparsableDate(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingTitle => write!(f, "item has no title"),
            SkipReason::MissingLink => write!(f, "item has no link"),
            SkipReason::InvalidLink(link) => write!(f, "item link '{link}' is not an absolute http(s) URL"),
            SkipReason::MissingDate => write!(f, "item has no date"),
            SkipReason::UnparsableDate(raw) => write!(f, "item date '{raw}' is not in a known format"),
        }
    }
}

/// A soft anomaly attributed to a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemWarning {
    pub source_name: String,
    pub reason: SkipReason,
}

/// Open already-decoded feed `text` as the feed type `source` declares.
///
/// # Errors
///
/// Returns a [`ParseError`] when `source` declares a feed type this crate
/// cannot read.
pub fn parse_feed<'a>(
    source: &'a Source,
    text: &'a str,
    content_type: Option<&str>,
) -> Result<rss::FeedItems<'a>, ParseError> {
    match &source.feed_type {
        FeedType::Rss => Ok(rss::FeedItems::new(source, text, content_type)),
        FeedType::Other(name) => Err(ParseError {
            source_name: source.name.clone(),
            content_type: content_type.unwrap_or("-").to_string(),
            reason: format!("unsupported feed type '{name}'"),
        }),
    }
}

/// Decode a payload and drain it into records and warnings.
///
/// # Errors
///
/// Returns a [`ParseError`] for an unsupported feed type or a payload that is
/// not a well-formed feed document.
pub fn collect_feed(
    source: &Source,
    payload: &FetchedPayload,
) -> Result<(Vec<FeedRecord>, Vec<ItemWarning>), ParseError> {
    let content_type = payload.content_type.as_deref();
    let text = encoding::decode(&payload.body, content_type);
    let mut records = Vec::new();
    let mut warnings = Vec::new();
    for item in parse_feed(source, &text, content_type)? {
        match item? {
            ParsedItem::Record(record) => records.push(record),
            ParsedItem::Skipped(reason) => warnings.push(ItemWarning {
                source_name: source.name.clone(),
                reason,
            }),
        }
    }
    Ok((records, warnings))
}
