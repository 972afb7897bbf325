//! Cross-source duplicate removal.

use crate::models::FeedRecord;
use itertools::Itertools;
use tracing::debug;

/// Merge per-source batches into a list with unique identities.
///
/// Batches are keyed by registry position. The batch with the lowest position
/// is consumed first, so when two sources carry the same article the record
/// from the earlier-registered source survives. Inside one batch the first
/// occurrence in feed order wins.
pub fn deduplicate(mut batches: Vec<(usize, Vec<FeedRecord>)>) -> Vec<FeedRecord> {
    batches.sort_by_key(|(position, _)| *position);
    let total: usize = batches.iter().map(|(_, records)| records.len()).sum();

    let unique: Vec<FeedRecord> = batches
        .into_iter()
        .flat_map(|(_, records)| records)
        .unique_by(FeedRecord::identity)
        .collect();

    debug!(total, unique = unique.len(), dropped = total - unique.len(), "Deduplicated records");
    unique
}
