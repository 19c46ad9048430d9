//! Batched metadata fetching
//!
//! Candidates already known to the library are skipped, the rest are fetched
//! in fixed-size batches. Requests inside a batch run concurrently; batches
//! run one after another with a pause between them and none after the last.

use futures::future::join_all;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::application::metadata_scraper::MetadataSource;
use crate::domain::BookMetadata;
use crate::infrastructure::config::WatchlistConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl From<&WatchlistConfig> for BatchSettings {
    fn from(config: &WatchlistConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            batch_delay: config.batch_delay(),
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from(&WatchlistConfig::default())
    }
}

/// Metadata that was fetched, keyed by its place in the full candidate list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// `(listing position, metadata)` in listing order; positions are 0-based
    pub fetched: Vec<(usize, BookMetadata)>,
    /// Size of every batch issued, in order
    pub batches: Vec<usize>,
    pub failures: usize,
}

impl BatchOutcome {
    pub fn requested(&self) -> usize {
        self.batches.iter().sum()
    }
}

/// Fetch metadata for `candidates` after skipping the first `skip`.
///
/// A failed item is logged and left out; it never fails the whole call.
pub async fn fetch_in_batches<S>(
    candidates: &[String],
    skip: usize,
    settings: BatchSettings,
    source: &S,
) -> BatchOutcome
where
    S: MetadataSource + ?Sized,
{
    let batch_size = settings.batch_size.max(1);
    let pending: Vec<(usize, &String)> = candidates.iter().enumerate().skip(skip).collect();

    let mut outcome = BatchOutcome::default();
    if pending.is_empty() {
        debug!(candidates = candidates.len(), skip, "No candidates left after skip");
        return outcome;
    }

    let chunks: Vec<_> = pending.chunks(batch_size).collect();
    let total_batches = chunks.len();
    info!(
        candidates = pending.len(),
        batches = total_batches,
        batch_size,
        "Fetching candidate metadata"
    );

    for (batch_index, chunk) in chunks.into_iter().enumerate() {
        outcome.batches.push(chunk.len());

        let results = join_all(chunk.iter().map(|(position, asin)| async move {
            (*position, asin.as_str(), source.fetch_metadata(asin).await)
        }))
        .await;

        for (position, asin, result) in results {
            match result {
                Ok(metadata) => outcome.fetched.push((position, metadata)),
                Err(e) => {
                    warn!(asin, batch = batch_index + 1, "Dropping candidate: {}", e);
                    outcome.failures += 1;
                }
            }
        }

        if batch_index + 1 < total_batches {
            debug!(
                batch = batch_index + 1,
                total_batches,
                "Waiting {:?} before next batch",
                settings.batch_delay
            );
            sleep(settings.batch_delay).await;
        }
    }

    outcome
}
