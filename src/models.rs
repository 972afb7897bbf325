//! Data models shared by the collection pipeline and its collaborators.
//!
//! - [`Source`]: a registered feed endpoint and its extraction rules
//! - [`FeedRecord`]: one normalized article, the unit of output
//! - [`SearchRequest`] / [`DateWindow`]: caller input and its resolved range
//! - [`SearchResult`]: ordered records plus the per-source failure report
//!
//! Field names in the sites file also accept the legacy JSON layout
//! (`type`, `scraping_rules`, `*_selector`), hence the serde aliases.

use crate::error::{FetchError, ValidationError};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Feed formats a [`Source`] can declare.
///
/// Unrecognized `type` values load as [`FeedType::Other`] and are written back
/// unchanged, so one foreign entry does not make the whole sites file unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FeedType {
    #[default]
    Rss,
    Other(String),
}

impl FeedType {
    pub fn as_str(&self) -> &str {
        match self {
            FeedType::Rss => "rss",
            FeedType::Other(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, FeedType::Rss)
    }
}

impl From<String> for FeedType {
    fn from(name: String) -> Self {
        if name.eq_ignore_ascii_case("rss") {
            FeedType::Rss
        } else {
            FeedType::Other(name)
        }
    }
}

impl From<FeedType> for String {
    fn from(feed_type: FeedType) -> Self {
        match feed_type {
            FeedType::Rss => "rss".to_string(),
            FeedType::Other(name) => name,
        }
    }
}

/// Element names used to pull fields out of a feed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectors {
    /// Element wrapping one article (`item` for RSS, `entry` for Atom).
    #[serde(default = "default_item", alias = "article_selector")]
    pub item: String,
    #[serde(default = "default_title", alias = "title_selector")]
    pub title: String,
    #[serde(default = "default_date", alias = "date_selector")]
    pub date: String,
    #[serde(default = "default_link", alias = "link_selector")]
    pub link: String,
}

fn default_item() -> String {
    "item".to_string()
}

fn default_title() -> String {
    "title".to_string()
}

fn default_date() -> String {
    "pubDate".to_string()
}

fn default_link() -> String {
    "link".to_string()
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            item: default_item(),
            title: default_title(),
            date: default_date(),
            link: default_link(),
        }
    }
}

impl Selectors {
    /// Selectors for an Atom feed (`entry` / `updated`).
    pub fn atom() -> Self {
        Self {
            item: "entry".to_string(),
            title: "title".to_string(),
            date: "updated".to_string(),
            link: "link".to_string(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// A registry entry. Its index in the registry is its dedup priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", alias = "feedType", default)]
    pub feed_type: FeedType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, alias = "scraping_rules")]
    pub selectors: Selectors,
}

impl Source {
    /// An enabled RSS source with default selectors.
    pub fn rss(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            feed_type: FeedType::Rss,
            enabled: true,
            selectors: Selectors::default(),
        }
    }
}

/// The normalized `(title, link)` pair two records must differ in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordIdentity {
    title: String,
    link: String,
}

fn normalize_identity_part(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One collected article.
///
/// Built by the feed parser and never mutated afterwards.
///
/// # Ordering
///
/// `FeedRecord` implements [`Ord`] in result order: newest `published_at`
/// first, then `source_name`, `title` and `link` ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub source_name: String,
    /// Publication time in the offset the feed declared (UTC when it declared none).
    pub published_at: DateTime<FixedOffset>,
    pub title: String,
    pub link: String,
}

impl FeedRecord {
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity {
            title: normalize_identity_part(&self.title),
            link: normalize_identity_part(&self.link),
        }
    }

    /// Calendar date in the record's own offset, used for window checks.
    pub fn published_date(&self) -> NaiveDate {
        self.published_at.date_naive()
    }

    /// Publication date as written by the output writers (`YYYY/MM/DD`).
    pub fn display_date(&self) -> String {
        self.published_at.format("%Y/%m/%d").to_string()
    }
}

impl Ord for FeedRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .published_at
            .cmp(&self.published_at)
            .then_with(|| self.source_name.cmp(&other.source_name))
            .then_with(|| self.title.cmp(&other.title))
            .then_with(|| self.link.cmp(&other.link))
    }
}

impl PartialOrd for FeedRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Caller input for a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Whitespace-separated terms; every one must appear in the title.
    pub keyword: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub case_sensitive: bool,
}

impl SearchRequest {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            start_date: None,
            end_date: None,
            case_sensitive: false,
        }
    }

    pub fn starting(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn ending(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.keyword.split_whitespace()
    }

    /// Check the request and resolve its date window against `today`.
    ///
    /// Missing dates default to `today`; an end date alone, a start date after
    /// the end date, or a blank keyword are rejected.
    pub fn validate(&self, today: NaiveDate) -> Result<DateWindow, ValidationError> {
        if self.terms().next().is_none() {
            return Err(ValidationError::EmptyKeyword);
        }
        let (start, end) = match (self.start_date, self.end_date) {
            (None, None) => (today, today),
            (Some(start), None) => (start, today),
            (Some(start), Some(end)) => (start, end),
            (None, Some(_)) => return Err(ValidationError::EndWithoutStart),
        };
        if start > end {
            return Err(ValidationError::StartAfterEnd { start, end });
        }
        Ok(DateWindow { start, end })
    }
}

/// The outcome of one search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Matching records in result order (see [`FeedRecord`]'s `Ord`).
    pub records: Vec<FeedRecord>,
    /// One entry per source that produced nothing, in registry order.
    pub failures: Vec<FetchError>,
    /// Items skipped across all sources for a missing field or bad date.
    pub warnings: usize,
    pub window: DateWindow,
    pub sources_searched: usize,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(source: &str, title: &str, link: &str, hour: u32) -> FeedRecord {
        FeedRecord {
            source_name: source.to_string(),
            published_at: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2025, 2, 17, hour, 0, 0)
                .unwrap(),
            title: title.to_string(),
            link: link.to_string(),
        }
    }

    #[test]
    fn test_identity_ignores_case_and_spacing() {
        let a = record("A", "AI  News Today", "https://EXAMPLE.com/a", 9);
        let b = record("B", "ai news today ", "https://example.com/a", 10);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_result_order() {
        let mut records = vec![
            record("B", "b", "https://x/1", 9),
            record("A", "z", "https://x/2", 9),
            record("A", "a", "https://x/3", 12),
        ];
        records.sort();
        assert_eq!(records[0].title, "a", "newest first");
        assert_eq!(records[1].source_name, "A", "source name breaks ties");
        assert_eq!(records[2].source_name, "B");
    }

    #[test]
    fn test_display_date() {
        assert_eq!(record("A", "t", "https://x", 1).display_date(), "2025/02/17");
    }

    #[test]
    fn test_validate_defaults_to_today() {
        let today = date(2025, 2, 17);
        let window = SearchRequest::new("AI").validate(today).unwrap();
        assert_eq!(window, DateWindow { start: today, end: today });
    }

    #[test]
    fn test_validate_start_only_runs_to_today() {
        let today = date(2025, 2, 17);
        let window = SearchRequest::new("AI")
            .starting(date(2025, 2, 1))
            .validate(today)
            .unwrap();
        assert_eq!(window.start, date(2025, 2, 1));
        assert_eq!(window.end, today);
    }

    #[test]
    fn test_validate_rejects_end_without_start() {
        let err = SearchRequest::new("AI")
            .ending(date(2025, 2, 17))
            .validate(date(2025, 2, 17))
            .unwrap_err();
        assert_eq!(err, ValidationError::EndWithoutStart);
    }

    #[test]
    fn test_validate_rejects_reversed_range() {
        let err = SearchRequest::new("AI")
            .starting(date(2025, 2, 18))
            .ending(date(2025, 2, 17))
            .validate(date(2025, 3, 1))
            .unwrap_err();
        assert!(matches!(err, ValidationError::StartAfterEnd { .. }));
    }

    #[test]
    fn test_validate_rejects_blank_keyword() {
        let err = SearchRequest::new("   ").validate(date(2025, 2, 17)).unwrap_err();
        assert_eq!(err, ValidationError::EmptyKeyword);
    }

    #[test]
    fn test_source_deserializes_legacy_layout() {
        let json = r#"{
            "name": "Example",
            "url": "https://example.com/rss",
            "type": "rss",
            "scraping_rules": {
                "article_selector": "entry",
                "title_selector": "title",
                "date_selector": "updated"
            }
        }"#;
        let source: Source = serde_json::from_str(json).unwrap();
        assert!(source.enabled);
        assert_eq!(source.feed_type, FeedType::Rss);
        assert_eq!(source.selectors.item, "entry");
        assert_eq!(source.selectors.date, "updated");
        assert_eq!(source.selectors.link, "link");
    }

    #[test]
    fn test_unknown_feed_type_round_trips() {
        let json = r#"{"name": "Portal", "url": "https://example.com/", "type": "html"}"#;
        let source: Source = serde_json::from_str(json).unwrap();
        assert_eq!(source.feed_type, FeedType::Other("html".to_string()));
        assert!(!source.feed_type.is_supported());

        let written = serde_json::to_value(&source).unwrap();
        assert_eq!(written["type"], "html");
    }
}
