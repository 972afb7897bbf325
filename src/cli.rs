//! Command-line interface definitions.
//!
//! Global options may also come from environment variables. Run settings
//! given as flags override the `settings` table of the sites file.

use crate::dates::parse_request_date;
use crate::outputs::OutputFormat;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Search registered news feeds for a keyword.
///
/// # Examples
///
/// ```sh
/// # Today's articles mentioning "AI"
/// news_sift search AI
///
/// # Every term must appear; JSON output
/// news_sift search "AI 機械学習" --start-date 2025-02-01 --format json
///
/// # Manage the registry
/// news_sift add "Example" https://example.com/rss
/// news_sift del "Example" https://example.com/rss
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the sites file
    #[arg(long, global = true, env = "NEWS_SIFT_SITES", default_value = "config/sites.json")]
    pub sites: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search feeds for articles whose title contains every keyword term
    Search(SearchArgs),

    /// Register a feed
    Add(SiteArgs),

    /// Remove a feed (name and URL must both match)
    Del(SiteArgs),
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Whitespace-separated search terms
    pub keyword: String,

    /// First day of the window (YYYY-MM-DD); defaults to today
    #[arg(long, value_parser = parse_request_date)]
    pub start_date: Option<NaiveDate>,

    /// Last day of the window (YYYY-MM-DD); requires --start-date
    #[arg(long, value_parser = parse_request_date)]
    pub end_date: Option<NaiveDate>,

    /// Match terms case-sensitively
    #[arg(long)]
    pub case_sensitive: bool,

    /// File format for saved results
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Base directory for saved results
    #[arg(short, long, env = "NEWS_SIFT_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// Maximum number of feeds fetched at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Give up on unfinished feeds after this many seconds
    #[arg(long)]
    pub run_timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SiteArgs {
    /// Display name of the site
    pub name: String,

    /// Feed URL (http or https)
    pub url: String,
}
