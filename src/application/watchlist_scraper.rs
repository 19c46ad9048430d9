//! New-volume detection for one watchlist
//!
//! Resolves the marketplace series from the last known volume, lists the
//! series' volumes and fetches metadata for those past the last known one.
//! Per-product fetching is delegated to a [`MetadataSource`].

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::batch_fetch::{BatchSettings, fetch_in_batches};
use crate::application::metadata_scraper::{MetadataSource, ScrapeError};
use crate::domain::{WatchlistResult, WatchlistWithSeries};
use crate::infrastructure::config::MarketplaceConfig;
use crate::infrastructure::parsing::extract_asin;
use crate::infrastructure::{HtmlFetcher, ParsingError, SeriesPageParser};

pub struct WatchlistScraper {
    fetcher: Arc<dyn HtmlFetcher>,
    metadata: Arc<dyn MetadataSource>,
    parser: SeriesPageParser,
    marketplace: MarketplaceConfig,
    settings: BatchSettings,
}

impl WatchlistScraper {
    pub fn new(
        fetcher: Arc<dyn HtmlFetcher>,
        metadata: Arc<dyn MetadataSource>,
        marketplace: MarketplaceConfig,
        settings: BatchSettings,
    ) -> Result<Self, ParsingError> {
        let parser = SeriesPageParser::with_config(&marketplace.selectors.series)?;
        Ok(Self {
            fetcher,
            metadata,
            parser,
            marketplace,
            settings,
        })
    }

    /// Series identifier of the series `volume_asin` belongs to, if any
    pub async fn resolve_series_asin(&self, volume_asin: &str) -> Result<Option<String>, ScrapeError> {
        let html = self.fetcher.fetch_html(&self.marketplace.product_url(volume_asin)).await?;
        Ok(self.parser.parse_series_asin(&html))
    }

    /// Volume identifiers listed on the series page, in document order
    pub async fn resolve_volume_asins(&self, series_asin: &str) -> Result<Vec<String>, ScrapeError> {
        let html = self.fetcher.fetch_html(&self.marketplace.product_url(series_asin)).await?;
        Ok(self.parser.parse_volume_asins(&html))
    }

    /// Volumes of the watched series newer than its last known volume.
    ///
    /// Missing data (no last volume, no identifier, not a series) yields an
    /// empty list. Only fetch failures during series resolution are errors.
    pub async fn scrape(&self, entry: &WatchlistWithSeries) -> Result<Vec<WatchlistResult>, ScrapeError> {
        let series_id = entry.series.id;

        let Some(last_volume) = &entry.last_volume else {
            warn!(series_id, series = %entry.series.name, "Watchlist has no last known volume, skipping");
            return Ok(Vec::new());
        };
        let Some(volume_asin) = last_volume.location_url.as_deref().and_then(extract_asin) else {
            warn!(
                series_id,
                book_id = last_volume.book_id,
                "Last known volume has no marketplace identifier, skipping"
            );
            return Ok(Vec::new());
        };

        let Some(series_asin) = self.resolve_series_asin(&volume_asin).await? else {
            info!(series_id, asin = %volume_asin, "Last known volume is not part of a marketplace series");
            return Ok(Vec::new());
        };

        let volumes = self.resolve_volume_asins(&series_asin).await?;
        debug!(series_id, series_asin = %series_asin, volumes = volumes.len(), "Resolved series volumes");

        let last_volume_number = entry.last_volume_number();
        let outcome = fetch_in_batches(
            &volumes,
            last_volume_number as usize,
            self.settings,
            self.metadata.as_ref(),
        )
        .await;

        // Listing order is only presumed to be volume order
        let out_of_order = outcome
            .fetched
            .iter()
            .filter(|(position, metadata)| {
                metadata
                    .series_position
                    .is_some_and(|reported| reported as usize != position + 1)
            })
            .count();
        if out_of_order > 0 {
            warn!(
                series_id,
                series_asin = %series_asin,
                out_of_order,
                "Series page order disagrees with reported volume numbers"
            );
        }

        let mut results = Vec::with_capacity(outcome.fetched.len());
        for (position, metadata) in outcome.fetched {
            let location_url = self.marketplace.product_url(&metadata.asin);
            let result = metadata.into_watchlist_result(series_id, (position + 1) as u32, location_url);

            if result.is_after(last_volume_number) {
                results.push(result);
            } else {
                warn!(
                    series_id,
                    volume = result.volume_number,
                    last_volume_number,
                    title = %result.title,
                    "Dropping candidate that is not newer than the last known volume"
                );
            }
        }

        info!(
            series_id,
            found = results.len(),
            failed = outcome.failures,
            "Scraped watchlist"
        );
        Ok(results)
    }
}
