//! JSON result files.
//!
//! Written as a pretty-printed array of [`ArticleRow`] objects, UTF-8 with
//! non-ASCII text kept as-is.

use super::ArticleRow;
use crate::error::OutputError;
use std::path::Path;
use tokio::fs;
use tracing::{error, instrument};

#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn write_rows(path: &Path, rows: &[ArticleRow]) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(rows)?;
    if let Err(e) = fs::write(path, json).await {
        error!(error = %e, "Failed writing JSON results");
        return Err(e.into());
    }
    Ok(())
}
