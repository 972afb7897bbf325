//! CSV result files.
//!
//! A UTF-8 byte order mark precedes the header so spreadsheet applications
//! detect the encoding of non-ASCII titles.

use super::ArticleRow;
use crate::error::OutputError;
use std::path::Path;
use tokio::fs;
use tracing::instrument;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Serialize `rows` with a `source,published,title,url` header.
pub fn to_bytes(rows: &[ArticleRow]) -> Result<Vec<u8>, OutputError> {
    let mut writer = ::csv::Writer::from_writer(UTF8_BOM.to_vec());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.into_inner().map_err(|e| OutputError::CsvBuffer(e.to_string()))
}

#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn write_rows(path: &Path, rows: &[ArticleRow]) -> Result<(), OutputError> {
    let bytes = to_bytes(rows)?;
    fs::write(path, bytes).await?;
    Ok(())
}
