//! Writing search results to the console and to disk.
//!
//! # Submodules
//!
//! - [`csv`]: BOM-prefixed CSV for spreadsheet tools
//! - [`json`]: pretty-printed JSON array
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! └── 2025-02-17/
//!     └── processed/
//!         ├── news_20250217_093000_AI.csv
//!         └── news_20250217_101500_AI.json
//! ```
//!
//! Both formats carry the same four fields per article: `source`,
//! `published` (`YYYY/MM/DD`), `title` and `url`.

pub mod csv;
pub mod json;

use crate::error::OutputError;
use crate::models::{FeedRecord, SearchResult};
use crate::utils::file_safe;
use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// File format for saved results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// One article as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleRow {
    pub source: String,
    pub published: String,
    pub title: String,
    pub url: String,
}

impl From<&FeedRecord> for ArticleRow {
    fn from(record: &FeedRecord) -> Self {
        Self {
            source: record.source_name.clone(),
            published: record.display_date(),
            title: record.title.clone(),
            url: record.link.clone(),
        }
    }
}

/// `{output_dir}/{YYYY-MM-DD}/processed/news_{YYYYmmdd_HHMMSS}_{keyword}.{ext}`
pub fn output_path(output_dir: &Path, keyword: &str, format: OutputFormat, now: DateTime<Local>) -> PathBuf {
    output_dir
        .join(now.format("%Y-%m-%d").to_string())
        .join("processed")
        .join(format!(
            "news_{}_{}.{}",
            now.format("%Y%m%d_%H%M%S"),
            file_safe(keyword),
            format.extension()
        ))
}

/// Save `records` and return the written path.
///
/// Nothing is written for an empty result.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), ?format))]
pub async fn write_results(
    records: &[FeedRecord],
    keyword: &str,
    format: OutputFormat,
    output_dir: &Path,
    now: DateTime<Local>,
) -> Result<Option<PathBuf>, OutputError> {
    if records.is_empty() {
        warn!("No results to save");
        return Ok(None);
    }

    let rows: Vec<ArticleRow> = records.iter().map(ArticleRow::from).collect();
    let path = output_path(output_dir, keyword, format, now);
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    match format {
        OutputFormat::Csv => csv::write_rows(&path, &rows).await?,
        OutputFormat::Json => json::write_rows(&path, &rows).await?,
    }
    info!(path = %path.display(), rows = rows.len(), "Saved results");
    Ok(Some(path))
}

/// Human-readable listing of a search result.
pub fn render_console(result: &SearchResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Search window: {} to {} ({} source(s))",
        result.window.start.format("%Y/%m/%d"),
        result.window.end.format("%Y/%m/%d"),
        result.sources_searched
    );

    if result.records.is_empty() {
        let _ = writeln!(out, "\nNo matching articles found.");
    } else {
        let _ = writeln!(out, "\nTotal articles: {}", result.records.len());
        let _ = writeln!(out, "\n=== Search results ===");
        for (i, record) in result.records.iter().enumerate() {
            let _ = writeln!(out, "\nArticle {}:", i + 1);
            let _ = writeln!(out, "Source: {}", record.source_name);
            let _ = writeln!(out, "Published: {}", record.display_date());
            let _ = writeln!(out, "Title: {}", record.title);
            let _ = writeln!(out, "URL: {}", record.link);
            let _ = writeln!(out, "{}", "-".repeat(50));
        }
    }

    if !result.failures.is_empty() {
        let _ = writeln!(out, "\n=== Failed sources ({}) ===", result.failures.len());
        for failure in &result.failures {
            let _ = writeln!(out, "[{}] {}", failure.kind().as_str(), failure);
        }
    }
    if result.warnings > 0 {
        let _ = writeln!(out, "\n{} feed item(s) skipped; see log for details", result.warnings);
    }
    out
}
