//! Error types for the search pipeline and its collaborators.
//!
//! Per-source failures ([`FetchError`], [`ParseError`]) are carried as data in
//! the search result and never abort a run. [`ValidationError`] is the only
//! error [`crate::pipeline::SearchPipeline::search`] returns, and it is raised
//! before any network traffic happens.

use chrono::NaiveDate;
use thiserror::Error;

/// A malformed search request or run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("keyword must contain at least one search term")]
    EmptyKeyword,

    #[error("an end date requires a start date")]
    EndWithoutStart,

    #[error("start date {start} is after end date {end}")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },

    #[error("invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { value: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The payload of a source could not be read as its declared feed type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse {content_type} payload from {source_name}: {reason}")]
pub struct ParseError {
    pub source_name: String,
    pub content_type: String,
    pub reason: String,
}

/// A single transport attempt failed.
///
/// Stored as strings so outcomes stay `Clone` and comparable in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("transport error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, connection failures, other I/O failures and 5xx responses are
    /// transient. Client errors and bad URLs are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Connect(_) | TransportError::Io(_) => true,
            TransportError::Status(status) => (500..600).contains(status),
            TransportError::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidUrl(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Io(e.to_string())
        }
    }
}

/// Coarse classification of a per-source failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Network,
    Http,
    InvalidUrl,
    Parse,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "NetworkError",
            FailureKind::Http => "HttpError",
            FailureKind::InvalidUrl => "InvalidUrl",
            FailureKind::Parse => "ParseError",
        }
    }
}

/// Why a source contributed no records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transient failures exhausted every attempt, or the run timed out.
    #[error("network error for {source_name} ({url}) after {retry_count} attempt(s): {reason}")]
    Network {
        source_name: String,
        url: String,
        retry_count: u32,
        reason: String,
    },

    /// A client error status; never retried.
    #[error("{source_name} ({url}) answered with HTTP {status}")]
    Http {
        source_name: String,
        url: String,
        status: u16,
    },

    #[error("{source_name} has an unusable URL '{url}': {reason}")]
    InvalidUrl {
        source_name: String,
        url: String,
        reason: String,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Network { .. } => FailureKind::Network,
            FetchError::Http { .. } => FailureKind::Http,
            FetchError::InvalidUrl { .. } => FailureKind::InvalidUrl,
            FetchError::Parse(_) => FailureKind::Parse,
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            FetchError::Network { source_name, .. }
            | FetchError::Http { source_name, .. }
            | FetchError::InvalidUrl { source_name, .. } => source_name,
            FetchError::Parse(e) => &e.source_name,
        }
    }
}

/// Failures reading or updating the sites file.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid site URL '{0}'")]
    InvalidUrl(String),

    #[error("site name must not be empty")]
    EmptyName,

    #[error("a site named '{0}' is already registered")]
    DuplicateName(String),

    #[error("the URL '{0}' is already registered")]
    DuplicateUrl(String),

    #[error("no site named '{name}' with URL '{url}'")]
    NotFound { name: String, url: String },
}

/// Failures writing search results to disk.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    CsvBuffer(String),
}
