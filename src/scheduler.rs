//! Bounded-concurrency collection across all sources.
//!
//! Every source becomes one future. A counting [`Semaphore`] admits at most
//! `concurrency` of them into the fetcher at a time, and the scheduler drains
//! a [`FuturesUnordered`] until every future has reported, so one failing
//! source never cuts the run short.
//!
//! An optional run timeout bounds the whole collection. When it fires the
//! remaining futures are dropped and each abandoned source is reported as a
//! network failure carrying the attempt it had reached, read from the
//! per-source `watch` channel it alone writes to.

use crate::error::FetchError;
use crate::models::Source;
use crate::retry::{FetchOutcome, RetryingFetcher};
use crate::transport::FeedTransport;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use tracing::{info, instrument, warn};

/// Number of sources fetched at once unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 3;

struct Tracker<'a> {
    position: usize,
    source: &'a Source,
    progress: watch::Receiver<u32>,
}

/// Runs a [`RetryingFetcher`] over many sources under a concurrency cap.
#[derive(Debug)]
pub struct CollectionScheduler<'f, T> {
    fetcher: &'f RetryingFetcher<T>,
    concurrency: usize,
    run_timeout: Option<Duration>,
}

impl<'f, T> CollectionScheduler<'f, T>
where
    T: FeedTransport,
{
    pub fn new(fetcher: &'f RetryingFetcher<T>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.clamp(1, Semaphore::MAX_PERMITS),
            run_timeout: None,
        }
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Fetch every `(registry position, source)` pair and return all outcomes.
    ///
    /// # Arguments
    ///
    /// * `sources` - Pairs of registry position and source. The position is
    ///   copied into each outcome so callers can restore registry order.
    ///
    /// # Returns
    ///
    /// Exactly one [`FetchOutcome`] per source, in completion order, with
    /// sources abandoned at the run timeout appended last. Failures are
    /// carried inside the outcomes; this never fails as a whole.
    #[instrument(level = "info", skip_all, fields(concurrency = self.concurrency))]
    pub async fn collect<'s, I>(&self, sources: I) -> Vec<FetchOutcome>
    where
        I: IntoIterator<Item = (usize, &'s Source)>,
    {
        let t0 = Instant::now();
        let gate = Semaphore::new(self.concurrency);
        let gate = &gate;
        let fetcher = self.fetcher;

        let mut trackers = Vec::new();
        let mut pending = FuturesUnordered::new();
        for (position, source) in sources {
            let (tx, rx) = watch::channel(0u32);
            trackers.push(Tracker {
                position,
                source,
                progress: rx,
            });
            pending.push(async move {
                let _permit = gate.acquire().await;
                fetcher.fetch(position, source, &tx).await
            });
        }

        let total = trackers.len();
        info!(sources = total, "Collecting sources");

        // A deadline past what `Instant` can represent never fires.
        let deadline = self.run_timeout.and_then(|t| tokio::time::Instant::now().checked_add(t));
        let expiry = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mut outcomes = Vec::with_capacity(total);
        let mut timed_out = false;
        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some(outcome) => outcomes.push(outcome),
                    None => break,
                },
                _ = &mut expiry => {
                    timed_out = true;
                    break;
                }
            }
        }
        drop(pending);

        if timed_out {
            let finished: HashSet<usize> = outcomes.iter().map(|o| o.position).collect();
            let abandoned: Vec<&Tracker<'_>> = trackers
                .iter()
                .filter(|t| !finished.contains(&t.position))
                .collect();
            warn!(
                abandoned = abandoned.len(),
                completed = outcomes.len(),
                "Run timeout elapsed; abandoning in-flight fetches"
            );
            for tracker in abandoned {
                outcomes.push(abandoned_outcome(tracker));
            }
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            sources = total,
            succeeded = total - failed,
            failed,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Collection finished"
        );
        outcomes
    }
}

fn abandoned_outcome(tracker: &Tracker<'_>) -> FetchOutcome {
    let attempts = *tracker.progress.borrow();
    FetchOutcome {
        source_name: tracker.source.name.clone(),
        position: tracker.position,
        result: Err(FetchError::Network {
            source_name: tracker.source.name.clone(),
            url: tracker.source.url.clone(),
            retry_count: attempts,
            reason: "abandoned when the run timeout elapsed".to_string(),
        }),
    }
}
