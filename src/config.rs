//! Run settings.
//!
//! Loaded from the `settings` table of the sites file and optionally
//! overridden from the command line. Keys are snake_case in the file; the
//! camelCase spellings are accepted as aliases.

use crate::error::ValidationError;
use crate::retry::RetryPolicy;
use crate::scheduler::DEFAULT_CONCURRENCY;
use crate::transport::DEFAULT_USER_AGENT;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;

fn default_request_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Timeouts, retry budget and concurrency for one search run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_request_timeout", alias = "requestTimeout")]
    pub request_timeout: u64,
    /// Total attempts per source, including the first.
    #[serde(default = "default_retry_count", alias = "retryCount")]
    pub retry_count: u32,
    /// Backoff step in seconds; attempt `n` is followed by `n * retry_delay`.
    #[serde(default = "default_retry_delay", alias = "retryDelay")]
    pub retry_delay: u64,
    #[serde(default = "default_concurrency", alias = "concurrentRequests")]
    pub concurrent_requests: usize,
    /// Bound on the whole collection phase, in seconds.
    #[serde(default, alias = "runTimeout", skip_serializing_if = "Option::is_none")]
    pub run_timeout: Option<u64>,
    #[serde(default = "default_user_agent", alias = "userAgent")]
    pub user_agent: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            retry_count: default_retry_count(),
            retry_delay: default_retry_delay(),
            concurrent_requests: default_concurrency(),
            run_timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrent_requests == 0 {
            return Err(ValidationError::InvalidConfig(
                "concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.concurrent_requests > Semaphore::MAX_PERMITS {
            return Err(ValidationError::InvalidConfig(format!(
                "concurrent_requests must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.request_timeout == 0 {
            return Err(ValidationError::InvalidConfig(
                "request_timeout must be at least 1 second".to_string(),
            ));
        }
        if self.run_timeout == Some(0) {
            return Err(ValidationError::InvalidConfig(
                "run_timeout must be at least 1 second".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ValidationError::InvalidConfig("user_agent must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout.map(Duration::from_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, Duration::from_secs(self.retry_delay))
    }
}
