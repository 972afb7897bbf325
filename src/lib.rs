//! # news_sift
//!
//! Keyword search across a registry of RSS, RDF and Atom feeds.
//!
//! ## Features
//!
//! - Fetches every enabled feed concurrently under a configurable cap
//! - Retries transient failures with linear backoff; client errors fail fast
//! - Drops duplicate articles across feeds, keeping the earliest-registered source
//! - Filters by an inclusive date window and by every keyword term
//! - Reports each failed feed without aborting the search
//! - Saves results as CSV or JSON
//!
//! ## Architecture
//!
//! 1. **Validation**: [`models::SearchRequest::validate`] resolves the date window
//! 2. **Collection**: [`scheduler::CollectionScheduler`] runs a
//!    [`retry::RetryingFetcher`] per source over a [`transport::FeedTransport`]
//! 3. **Parsing**: [`feeds`] turns each payload into [`models::FeedRecord`]s
//! 4. **Selection**: [`dedup`] then [`filter`], then result ordering
//! 5. **Output**: [`outputs`] prints and saves the [`models::SearchResult`]
//!
//! [`pipeline::SearchPipeline`] ties steps 1 to 4 together.

pub mod cli;
pub mod config;
pub mod dates;
pub mod dedup;
pub mod error;
pub mod feeds;
pub mod filter;
pub mod models;
pub mod outputs;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod transport;
pub mod utils;
