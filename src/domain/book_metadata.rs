//! Per-volume metadata scraped from a marketplace detail page

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::watchlist::{LocationType, WatchlistResult};

/// Metadata extracted from a single product page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub asin: String,
    pub title: String,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub release_date: Option<String>,
    pub page_count: Option<u32>,
    pub cover_url: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    /// "Book N of M" position reported by the product page
    pub series_position: Option<u32>,
}

impl BookMetadata {
    /// Convert into a watchlist result for `series_id`.
    ///
    /// The page-reported series position wins over `fallback_volume`, which
    /// is derived from the candidate's place in the series listing.
    pub fn into_watchlist_result(
        self,
        series_id: i64,
        fallback_volume: u32,
        location_url: String,
    ) -> WatchlistResult {
        WatchlistResult {
            id: None,
            series_id,
            title: self.title,
            description: self.description,
            volume_number: self.series_position.unwrap_or(fallback_volume),
            authors: self.authors,
            release_date: self.release_date,
            page_count: self.page_count,
            cover_url: self.cover_url,
            location_type: LocationType::Amazon,
            location_url,
            categories: self.categories,
            tags: self.tags,
            discovered_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_position_overrides_listing_position() {
        let metadata = BookMetadata {
            asin: "B004".to_string(),
            title: "Volume Four".to_string(),
            series_position: Some(6),
            ..Default::default()
        };

        let result = metadata.into_watchlist_result(3, 4, "https://www.amazon.com/dp/B004".to_string());
        assert_eq!(result.volume_number, 6);
        assert_eq!(result.series_id, 3);
        assert_eq!(result.location_type, LocationType::Amazon);
    }

    #[test]
    fn listing_position_used_without_series_label() {
        let metadata = BookMetadata {
            asin: "B005".to_string(),
            title: "Volume Five".to_string(),
            ..Default::default()
        };

        let result = metadata.into_watchlist_result(3, 5, "https://www.amazon.com/dp/B005".to_string());
        assert_eq!(result.volume_number, 5);
        assert!(result.id.is_none());
    }
}
