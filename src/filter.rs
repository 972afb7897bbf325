//! Date window and keyword filters applied after deduplication.

use crate::models::{DateWindow, FeedRecord, SearchRequest};

/// Keep records whose calendar date falls inside `window` (inclusive).
pub fn within_window(records: Vec<FeedRecord>, window: &DateWindow) -> Vec<FeedRecord> {
    records
        .into_iter()
        .filter(|r| window.contains(r.published_date()))
        .collect()
}

/// Title matcher: every term must occur as a substring.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    terms: Vec<String>,
    case_sensitive: bool,
}

impl KeywordMatcher {
    pub fn new(request: &SearchRequest) -> Self {
        let case_sensitive = request.case_sensitive;
        let terms = request
            .terms()
            .map(|t| if case_sensitive { t.to_string() } else { t.to_lowercase() })
            .collect();
        Self { terms, case_sensitive }
    }

    pub fn matches(&self, title: &str) -> bool {
        if self.case_sensitive {
            self.terms.iter().all(|t| title.contains(t.as_str()))
        } else {
            let folded = title.to_lowercase();
            self.terms.iter().all(|t| folded.contains(t.as_str()))
        }
    }

    pub fn retain(&self, records: Vec<FeedRecord>) -> Vec<FeedRecord> {
        records.into_iter().filter(|r| self.matches(&r.title)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn record_at(offset_hours: i32, y: i32, m: u32, d: u32, h: u32) -> FeedRecord {
        FeedRecord {
            source_name: "A".to_string(),
            published_at: FixedOffset::east_opt(offset_hours * 3600)
                .unwrap()
                .with_ymd_and_hms(y, m, d, h, 0, 0)
                .unwrap(),
            title: "t".to_string(),
            link: "https://x/1".to_string(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    #[test]
    fn test_window_is_inclusive() {
        let window = DateWindow { start: day(10), end: day(12) };
        let records = vec![
            record_at(0, 2025, 2, 9, 23),
            record_at(0, 2025, 2, 10, 0),
            record_at(0, 2025, 2, 12, 23),
            record_at(0, 2025, 2, 13, 0),
        ];
        let kept = within_window(records, &window);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_window_uses_record_offset() {
        // 2025-02-13 01:00 +09:00 is still 02-12 in UTC, but the feed said the 13th.
        let window = DateWindow { start: day(10), end: day(12) };
        let kept = within_window(vec![record_at(9, 2025, 2, 13, 1)], &window);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_all_terms_required() {
        let matcher = KeywordMatcher::new(&SearchRequest::new("rate cut"));
        assert!(matcher.matches("Central bank signals rate cut"));
        assert!(!matcher.matches("Central bank holds rate"));
    }

    #[test]
    fn test_case_insensitive_mixed_script() {
        let matcher = KeywordMatcher::new(&SearchRequest::new("AI 機械学習"));
        assert!(matcher.matches("ai and 機械学習 news"));
        assert!(!matcher.matches("ai news"));
    }

    #[test]
    fn test_case_sensitive() {
        let matcher = KeywordMatcher::new(&SearchRequest::new("AI").case_sensitive(true));
        assert!(matcher.matches("New AI chips"));
        assert!(!matcher.matches("New ai chips"));
    }

    #[test]
    fn test_substring_match() {
        let matcher = KeywordMatcher::new(&SearchRequest::new("AI"));
        assert!(matcher.matches("Spain wins"), "terms match inside words");
    }
}
