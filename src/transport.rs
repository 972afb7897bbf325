//! HTTP transport seam.
//!
//! [`FeedTransport`] is the only place the pipeline touches the network, which
//! keeps the retry and scheduling logic testable with in-memory fakes.

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

/// Browser-like User-Agent; some feed hosts reject unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Raw bytes of one successful fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchedPayload {
    pub body: Vec<u8>,
    /// `Content-Type` header, if the server sent one.
    pub content_type: Option<String>,
}

impl FetchedPayload {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            content_type: None,
        }
    }
}

/// Performs a single retrieval attempt. Retries are the caller's business.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPayload, TransportError>;
}

/// [`FeedTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPayload, TransportError> {
        let t0 = Instant::now();
        let response = self.client.get(url.clone()).timeout(timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            content_type = content_type.as_deref().unwrap_or("-"),
            "Fetched feed"
        );
        Ok(FetchedPayload { body, content_type })
    }
}
