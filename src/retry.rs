//! Per-source retrieval with bounded retry and linear backoff.
//!
//! Each fetch is driven through an explicit state machine:
//!
//! ```text
//! Pending → Fetching → Success
//!              │
//!              ├─→ RetryScheduled → Fetching …
//!              ├─→ Exhausted        (transient failures used every attempt)
//!              └─→ Aborted          (non-retryable failure)
//! ```
//!
//! Transitions are computed by [`RetryPolicy`] without touching a clock; the
//! wait itself goes through a [`Sleeper`] so tests can observe backoff delays
//! without waiting for them.
//!
//! # Retry Strategy
//!
//! - At most `retry_count` attempts in total (never fewer than one)
//! - After failed attempt `n` the fetcher waits `retry_delay * n`
//! - Only the network fetch is retried; parsing identical bytes twice
//!   would fail the same way

use crate::error::{FetchError, TransportError};
use crate::feeds::{collect_feed, ItemWarning};
use crate::models::{FeedRecord, Source};
use crate::transport::{FeedTransport, FetchedPayload};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Delay abstraction used between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Where a single source's fetch currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Pending,
    Fetching { attempt: u32 },
    RetryScheduled { attempt: u32, delay: Duration },
    Success { attempt: u32 },
    Exhausted { attempts: u32 },
    Aborted { attempt: u32 },
}

/// Attempt budget and backoff step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: retry_count.max(1),
            retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait applied after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }

    /// Next state after `state` given the result of the attempt, if one ran.
    pub fn advance(&self, state: FetchState, attempt_result: Option<&Result<(), TransportError>>) -> FetchState {
        match (state, attempt_result) {
            (FetchState::Pending, _) => FetchState::Fetching { attempt: 1 },
            (FetchState::Fetching { attempt }, Some(Ok(()))) => FetchState::Success { attempt },
            (FetchState::Fetching { attempt }, Some(Err(e))) => {
                if !e.is_retryable() {
                    FetchState::Aborted { attempt }
                } else if attempt >= self.max_attempts {
                    FetchState::Exhausted { attempts: attempt }
                } else {
                    FetchState::RetryScheduled {
                        attempt,
                        delay: self.delay_after(attempt),
                    }
                }
            }
            (FetchState::RetryScheduled { attempt, .. }, _) => FetchState::Fetching { attempt: attempt + 1 },
            (other, _) => other,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// What one source produced.
#[derive(Debug, Clone, Default)]
pub struct SourceHarvest {
    pub records: Vec<FeedRecord>,
    pub warnings: Vec<ItemWarning>,
    /// Fetch attempts it took to get the payload.
    pub attempts: u32,
}

/// Result of running one source through fetch and parse.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub source_name: String,
    /// Index of the source in the registry; lower wins dedup ties.
    pub position: usize,
    pub result: Result<SourceHarvest, FetchError>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fetches and parses one source, retrying the transport step per [`RetryPolicy`].
pub struct RetryingFetcher<T> {
    transport: T,
    policy: RetryPolicy,
    request_timeout: Duration,
    sleeper: Box<dyn Sleeper>,
}

impl<T> fmt::Debug for RetryingFetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingFetcher")
            .field("policy", &self.policy)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl<T> RetryingFetcher<T>
where
    T: FeedTransport,
{
    pub fn new(transport: T, policy: RetryPolicy, request_timeout: Duration) -> Self {
        Self {
            transport,
            policy,
            request_timeout,
            sleeper: Box::new(TokioSleeper),
        }
    }

    /// Replace the delay implementation (tests use a recording sleeper).
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch and parse `source`.
    ///
    /// # Arguments
    ///
    /// * `position` - Registry index of `source`, copied into the outcome.
    /// * `source` - The feed to retrieve.
    /// * `progress` - Receives the number of the attempt in progress, so a
    ///   scheduler that abandons this fetch can still report how far it got.
    ///
    /// # Returns
    ///
    /// A [`FetchOutcome`] holding either the harvested records or the
    /// [`FetchError`] that ended the fetch: `Network` once retryable failures
    /// used every attempt, `Http` on a 4xx status, `InvalidUrl` for a source
    /// URL that does not parse, and `Parse` when the payload is not a
    /// readable feed. Parsing is never retried.
    #[instrument(level = "info", skip_all, fields(source = %source.name))]
    pub async fn fetch(&self, position: usize, source: &Source, progress: &watch::Sender<u32>) -> FetchOutcome {
        let t0 = Instant::now();
        let result = match self.fetch_payload(source, progress).await {
            Ok((payload, attempts)) => self.parse(source, &payload, attempts),
            Err(e) => Err(e),
        };

        match &result {
            Ok(harvest) => info!(
                records = harvest.records.len(),
                skipped = harvest.warnings.len(),
                attempts = harvest.attempts,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Collected source"
            ),
            Err(e) => error!(
                kind = e.kind().as_str(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                error = %e,
                "Source failed"
            ),
        }

        FetchOutcome {
            source_name: source.name.clone(),
            position,
            result,
        }
    }

    fn parse(&self, source: &Source, payload: &FetchedPayload, attempts: u32) -> Result<SourceHarvest, FetchError> {
        let (records, warnings) = collect_feed(source, payload).inspect_err(|_| {
            debug!(
                preview = %truncate_for_log(&String::from_utf8_lossy(&payload.body), 300),
                "Unparseable payload"
            );
        })?;
        for w in &warnings {
            warn!(source = %w.source_name, reason = %w.reason, "Skipped feed item");
        }
        Ok(SourceHarvest {
            records,
            warnings,
            attempts,
        })
    }

    async fn fetch_payload(
        &self,
        source: &Source,
        progress: &watch::Sender<u32>,
    ) -> Result<(FetchedPayload, u32), FetchError> {
        let url = parse_source_url(source)?;
        let mut state = FetchState::Pending;
        let mut payload = None;
        let mut last_error = None;

        loop {
            state = match state {
                FetchState::Pending => self.policy.advance(state, None),
                FetchState::Fetching { attempt } => {
                    progress.send_replace(attempt);
                    debug!(attempt, max = self.policy.max_attempts(), "Fetching feed");
                    let result = self.transport.fetch(&url, self.request_timeout).await;
                    let verdict = result.as_ref().map(|_| ()).map_err(TransportError::clone);
                    let next = self.policy.advance(state, Some(&verdict));
                    match result {
                        Ok(p) => payload = Some(p),
                        Err(e) => {
                            warn!(
                                attempt,
                                max = self.policy.max_attempts(),
                                error = %e,
                                "Feed fetch attempt failed"
                            );
                            last_error = Some(e);
                        }
                    }
                    next
                }
                FetchState::RetryScheduled { delay, .. } => {
                    debug!(?delay, "Backing off before next attempt");
                    self.sleeper.sleep(delay).await;
                    self.policy.advance(state, None)
                }
                FetchState::Success { attempt } => {
                    return payload.map(|p| (p, attempt)).ok_or_else(|| FetchError::Network {
                        source_name: source.name.clone(),
                        url: source.url.clone(),
                        retry_count: attempt,
                        reason: "fetch reported success without a payload".to_string(),
                    });
                }
                FetchState::Exhausted { attempts } => {
                    return Err(FetchError::Network {
                        source_name: source.name.clone(),
                        url: source.url.clone(),
                        retry_count: attempts,
                        reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
                    });
                }
                FetchState::Aborted { attempt } => {
                    return Err(abort_error(source, attempt, last_error));
                }
            };
        }
    }
}

fn parse_source_url(source: &Source) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        source_name: source.name.clone(),
        url: source.url.clone(),
        reason,
    };
    let url = Url::parse(&source.url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(url)
}

fn abort_error(source: &Source, attempt: u32, error: Option<TransportError>) -> FetchError {
    match error {
        Some(TransportError::Status(status)) => FetchError::Http {
            source_name: source.name.clone(),
            url: source.url.clone(),
            status,
        },
        Some(TransportError::InvalidUrl(reason)) => FetchError::InvalidUrl {
            source_name: source.name.clone(),
            url: source.url.clone(),
            reason,
        },
        other => FetchError::Network {
            source_name: source.name.clone(),
            url: source.url.clone(),
            retry_count: attempt,
            reason: other.map(|e| e.to_string()).unwrap_or_default(),
        },
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport and recording sleeper shared by the pipeline tests.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// One scripted response for a URL.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Body(String),
        /// Respond with raw bytes and a `Content-Type` header.
        Bytes(Vec<u8>, String),
        Fail(TransportError),
        /// Respond with `body` after `delay` of (tokio) time.
        Slow(Duration, String),
    }

    /// Replays scripted replies per URL; the last reply repeats once the script runs out.
    #[derive(Debug, Default, Clone)]
    pub struct ScriptedTransport {
        replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(self, url: &str, replies: Vec<Reply>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .insert(url.to_string(), replies.into_iter().collect());
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn next_reply(&self, url: &str) -> Reply {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue
                    .front()
                    .cloned()
                    .unwrap_or(Reply::Fail(TransportError::Status(404))),
                None => Reply::Fail(TransportError::Status(404)),
            }
        }
    }

    #[async_trait]
    impl FeedTransport for ScriptedTransport {
        async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchedPayload, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let reply = self.next_reply(url.as_str());
            let result = match reply {
                Reply::Body(body) => Ok(FetchedPayload::new(body)),
                Reply::Bytes(body, content_type) => Ok(FetchedPayload {
                    body,
                    content_type: Some(content_type),
                }),
                Reply::Fail(e) => Err(e),
                Reply::Slow(delay, body) => {
                    tokio::time::sleep(delay).await;
                    Ok(FetchedPayload::new(body))
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    /// Records requested delays and returns immediately.
    #[derive(Debug, Default, Clone)]
    pub struct RecordingSleeper {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingSleeper {
        pub fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    pub fn rss_with(items: &[(&str, &str, &str)]) -> String {
        let mut xml = String::from(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>"#);
        for (title, link, date) in items {
            xml.push_str(&format!(
                "<item><title>{title}</title><link>{link}</link><pubDate>{date}</pubDate></item>"
            ));
        }
        xml.push_str("</channel></rss>");
        xml
    }
}
