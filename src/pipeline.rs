//! End-to-end keyword search over the registered feeds.
//!
//! ```text
//! SearchRequest ─validate─▶ DateWindow
//!        │
//!        ▼
//! enabled sources ─▶ CollectionScheduler ─▶ outcomes (by registry position)
//!                                              │
//!                     failures ◀───────────────┤
//!                                              ▼
//!                 deduplicate ─▶ date window ─▶ keyword ─▶ sort ─▶ SearchResult
//! ```
//!
//! A request that fails validation returns before any source is contacted.
//! Anything that goes wrong with an individual source ends up in
//! [`SearchResult::failures`] instead.

use crate::config::RunConfig;
use crate::dedup::deduplicate;
use crate::error::ValidationError;
use crate::filter::{within_window, KeywordMatcher};
use crate::models::{SearchRequest, SearchResult, Source};
use crate::retry::{RetryingFetcher, Sleeper};
use crate::scheduler::CollectionScheduler;
use crate::transport::FeedTransport;
use chrono::{Local, NaiveDate};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Runs searches with a fixed transport and run configuration.
#[derive(Debug)]
pub struct SearchPipeline<T> {
    fetcher: RetryingFetcher<T>,
    concurrency: usize,
    run_timeout: Option<Duration>,
    today: Option<NaiveDate>,
}

impl<T> SearchPipeline<T>
where
    T: FeedTransport,
{
    pub fn new(transport: T, config: &RunConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            fetcher: RetryingFetcher::new(transport, config.retry_policy(), config.request_timeout()),
            concurrency: config.concurrent_requests,
            run_timeout: config.run_timeout(),
            today: None,
        })
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.fetcher = self.fetcher.with_sleeper(sleeper);
        self
    }

    /// Pin the date used for defaulted window bounds.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Search every enabled source in `sources` for `request`.
    ///
    /// The position of a source in `sources` is its priority when two sources
    /// publish the same article. Enabled sources whose feed type cannot be
    /// parsed are skipped with a warning.
    ///
    /// # Arguments
    ///
    /// * `request` - Keyword, optional date bounds and case rule.
    /// * `sources` - The registry, in priority order.
    ///
    /// # Returns
    ///
    /// Matching records sorted newest first, plus one failure per source
    /// that produced nothing.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] when the request is malformed. This is checked
    /// before any source is contacted; source failures never surface here.
    #[instrument(level = "info", skip_all, fields(keyword = %request.keyword))]
    pub async fn search(&self, request: &SearchRequest, sources: &[Source]) -> Result<SearchResult, ValidationError> {
        let window = request.validate(self.today())?;
        let t0 = Instant::now();

        let mut enabled: Vec<(usize, &Source)> = Vec::with_capacity(sources.len());
        for (position, source) in sources.iter().enumerate().filter(|(_, s)| s.enabled) {
            if source.feed_type.is_supported() {
                enabled.push((position, source));
            } else {
                warn!(
                    source = %source.name,
                    feed_type = source.feed_type.as_str(),
                    "Skipping source with unsupported feed type"
                );
            }
        }
        info!(
            start = %window.start,
            end = %window.end,
            sources = enabled.len(),
            skipped = sources.len() - enabled.len(),
            "Searching feeds"
        );

        let mut outcomes = CollectionScheduler::new(&self.fetcher, self.concurrency)
            .with_run_timeout(self.run_timeout)
            .collect(enabled.iter().copied())
            .await;
        outcomes.sort_by_key(|o| o.position);

        let mut batches = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut warnings = 0;
        for outcome in outcomes {
            match outcome.result {
                Ok(harvest) => {
                    warnings += harvest.warnings.len();
                    batches.push((outcome.position, harvest.records));
                }
                Err(e) => failures.push(e),
            }
        }

        let unique = deduplicate(batches);
        let dated = within_window(unique, &window);
        let mut records = KeywordMatcher::new(request).retain(dated);
        records.sort();

        for failure in &failures {
            warn!(source = %failure.source_name(), kind = failure.kind().as_str(), error = %failure, "Source produced no records");
        }
        info!(
            matched = records.len(),
            failed = failures.len(),
            skipped_items = warnings,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Search finished"
        );

        Ok(SearchResult {
            records,
            failures,
            warnings,
            window,
            sources_searched: enabled.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, TransportError};
    use crate::models::FeedType;
    use crate::retry::testing::*;
    use std::collections::HashSet;

    const DAY: &str = "Mon, 17 Feb 2025 09:00:00 +0000";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 17).unwrap()
    }

    fn url(name: &str) -> String {
        format!("https://{name}.example.com/rss")
    }

    fn pipeline(transport: ScriptedTransport, config: RunConfig) -> SearchPipeline<ScriptedTransport> {
        SearchPipeline::new(transport, &config)
            .unwrap()
            .with_sleeper(RecordingSleeper::default())
            .with_today(today())
    }

    fn sources(names: &[&str]) -> Vec<Source> {
        names.iter().map(|n| Source::rss(*n, url(n))).collect()
    }

    #[tokio::test]
    async fn test_end_date_alone_fails_before_fetching() {
        let transport = ScriptedTransport::new().script(&url("a"), vec![Reply::Body(rss_with(&[]))]);
        let pipeline = pipeline(transport.clone(), RunConfig::default());
        let request = SearchRequest::new("AI").ending(today());

        let err = pipeline.search(&request, &sources(&["a"])).await.unwrap_err();

        assert_eq!(err, ValidationError::EndWithoutStart);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_keeps_earlier_source() {
        let item = [("AI News", "https://x/1", DAY)];
        // A answers last but is registered first.
        let transport = ScriptedTransport::new()
            .script(&url("a"), vec![Reply::Slow(Duration::from_millis(50), rss_with(&item))])
            .script(&url("b"), vec![Reply::Body(rss_with(&item))]);
        let pipeline = pipeline(transport, RunConfig::default());

        let result = pipeline
            .search(&SearchRequest::new("AI"), &sources(&["a", "b"]))
            .await
            .unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].source_name, "a");
    }

    #[tokio::test]
    async fn test_exhausted_source_reported_once() {
        let transport = ScriptedTransport::new()
            .script(&url("down"), vec![Reply::Fail(TransportError::Timeout)])
            .script(&url("up"), vec![Reply::Body(rss_with(&[("AI rollout", "https://up/1", DAY)]))]);
        let pipeline = pipeline(transport.clone(), RunConfig::default());

        let result = pipeline
            .search(&SearchRequest::new("ai"), &sources(&["down", "up"]))
            .await
            .unwrap();

        assert_eq!(result.failures.len(), 1);
        assert!(matches!(
            &result.failures[0],
            FetchError::Network { source_name, retry_count: 3, .. } if source_name == "down"
        ));
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].source_name, "up");
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_results_ordered_unique_and_filtered() {
        let feed_a = rss_with(&[
            ("AI chips", "https://a/1", "Mon, 17 Feb 2025 08:00:00 +0000"),
            ("AI chips", "https://a/1", "Mon, 17 Feb 2025 08:00:00 +0000"),
            ("AI old", "https://a/2", "Sun, 16 Feb 2025 08:00:00 +0000"),
            ("Weather", "https://a/3", DAY),
        ]);
        let feed_b = rss_with(&[
            ("AI late", "https://b/1", "Mon, 17 Feb 2025 21:00:00 +0000"),
            ("AI chips", "https://b/2", "Mon, 17 Feb 2025 08:00:00 +0000"),
        ]);
        let transport = ScriptedTransport::new()
            .script(&url("a"), vec![Reply::Body(feed_a)])
            .script(&url("b"), vec![Reply::Body(feed_b)]);
        let pipeline = pipeline(transport, RunConfig::default());

        let result = pipeline
            .search(&SearchRequest::new("AI"), &sources(&["b", "a"]))
            .await
            .unwrap();

        let titles: Vec<(&str, &str)> = result
            .records
            .iter()
            .map(|r| (r.source_name.as_str(), r.title.as_str()))
            .collect();
        assert_eq!(titles, vec![("b", "AI late"), ("a", "AI chips"), ("b", "AI chips")]);

        let identities: HashSet<_> = result.records.iter().map(|r| r.identity()).collect();
        assert_eq!(identities.len(), result.records.len());
        assert!(result.failures.is_empty());
        assert_eq!(result.sources_searched, 2);
    }

    #[tokio::test]
    async fn test_repeated_search_is_stable() {
        let transport = ScriptedTransport::new()
            .script(&url("a"), vec![Reply::Body(rss_with(&[("AI one", "https://a/1", DAY)]))])
            .script(&url("b"), vec![Reply::Body(rss_with(&[("AI two", "https://b/1", DAY)]))]);
        let pipeline = pipeline(transport, RunConfig::default());
        let request = SearchRequest::new("AI");
        let sources = sources(&["a", "b"]);

        let first = pipeline.search(&request, &sources).await.unwrap();
        let second = pipeline.search(&request, &sources).await.unwrap();

        assert_eq!(first.records, second.records);
        assert_eq!(first.records.len(), 2);
    }

    #[tokio::test]
    async fn test_mixed_script_keyword() {
        let transport = ScriptedTransport::new().script(
            &url("jp"),
            vec![Reply::Body(rss_with(&[
                ("ai and 機械学習 news", "https://jp/1", DAY),
                ("ai news", "https://jp/2", DAY),
            ]))],
        );
        let pipeline = pipeline(transport, RunConfig::default());

        let result = pipeline
            .search(&SearchRequest::new("AI 機械学習"), &sources(&["jp"]))
            .await
            .unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].link, "https://jp/1");
    }

    #[tokio::test]
    async fn test_disabled_sources_not_fetched() {
        let transport = ScriptedTransport::new().script(&url("a"), vec![Reply::Body(rss_with(&[]))]);
        let pipeline = pipeline(transport.clone(), RunConfig::default());
        let mut sources = sources(&["a", "b"]);
        sources[1].enabled = false;

        let result = pipeline.search(&SearchRequest::new("AI"), &sources).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(result.sources_searched, 1);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_feed_types_skipped() {
        let transport = ScriptedTransport::new()
            .script(&url("a"), vec![Reply::Body(rss_with(&[("AI one", "https://a/1", DAY)]))]);
        let pipeline = pipeline(transport.clone(), RunConfig::default());
        let mut sources = sources(&["portal", "a"]);
        sources[0].feed_type = FeedType::Other("html".to_string());

        let result = pipeline.search(&SearchRequest::new("AI"), &sources).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert!(result.failures.is_empty());
        assert_eq!(result.sources_searched, 1);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_shift_jis_feed_matches_japanese_keyword() {
        let xml = format!(
            r#"<?xml version="1.0" encoding="Shift_JIS"?>{}"#,
            rss_with(&[("機械学習で需要予測", "https://jp/1", DAY)])
                .trim_start_matches(r#"<?xml version="1.0"?>"#)
        );
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(&xml);
        let transport = ScriptedTransport::new().script(
            &url("jp"),
            vec![Reply::Bytes(bytes.into_owned(), "application/rss+xml".to_string())],
        );
        let pipeline = pipeline(transport, RunConfig::default());

        let result = pipeline
            .search(&SearchRequest::new("機械学習"), &sources(&["jp"]))
            .await
            .unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].title, "機械学習で需要予測");
    }

    #[tokio::test]
    async fn test_skipped_items_counted() {
        let xml = r#"<rss version="2.0"><channel>
            <item><title>AI ok</title><link>https://a/1</link><pubDate>Mon, 17 Feb 2025 09:00:00 +0000</pubDate></item>
            <item><title>AI undated</title><link>https://a/2</link></item>
            <item><title>AI garbled</title><link>https://a/3</link><pubDate>someday</pubDate></item>
        </channel></rss>"#;
        let transport = ScriptedTransport::new().script(&url("a"), vec![Reply::Body(xml.to_string())]);
        let pipeline = pipeline(transport, RunConfig::default());

        let result = pipeline.search(&SearchRequest::new("AI"), &sources(&["a"])).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.warnings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_setting_bounds_in_flight_fetches() {
        let names = ["a", "b", "c", "d", "e"];
        let mut transport = ScriptedTransport::new();
        for (i, name) in names.iter().enumerate() {
            let link = format!("https://{name}/1");
            let feed = rss_with(&[("AI", link.as_str(), DAY)]);
            transport = transport.script(&url(name), vec![Reply::Slow(Duration::from_millis(100 * (i as u64 + 1)), feed)]);
        }
        let config = RunConfig {
            concurrent_requests: 2,
            ..RunConfig::default()
        };
        let pipeline = pipeline(transport.clone(), config);

        let result = pipeline.search(&SearchRequest::new("AI"), &sources(&names)).await.unwrap();

        assert_eq!(result.records.len(), 5);
        assert_eq!(transport.max_in_flight(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RunConfig {
            concurrent_requests: 0,
            ..RunConfig::default()
        };
        assert!(SearchPipeline::new(ScriptedTransport::new(), &config).is_err());
    }
}
