//! Watchlist entities
//!
//! A watchlist pairs a user with a library series so that new volumes of the
//! series can be detected on the marketplace. Discovered volumes are kept as
//! [`WatchlistResult`] rows until the user imports or dismisses them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Library series referenced by a watchlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub name: String,
}

/// The newest volume of a series that already lives in the library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastKnownVolume {
    pub book_id: i64,
    pub title: String,
    pub volume_number: u32,
    /// Marketplace detail page of the book, holds its ASIN
    pub location_url: Option<String>,
}

/// A (series, user) pair flagged for new-volume detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesWatchlist {
    pub id: i64,
    pub series_id: i64,
    pub user_id: i64,
    pub last_volume_id: Option<i64>,
}

/// Input for opting a series into tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWatchlist {
    pub series_id: i64,
    pub user_id: i64,
    pub last_volume_id: Option<i64>,
}

/// Watchlist loaded together with its series and last known volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistWithSeries {
    pub watchlist: SeriesWatchlist,
    pub series: Series,
    pub last_volume: Option<LastKnownVolume>,
}

impl WatchlistWithSeries {
    /// Volume number after which candidates are considered new
    pub fn last_volume_number(&self) -> u32 {
        self.last_volume
            .as_ref()
            .map_or(0, |volume| volume.volume_number)
    }
}

/// Where a discovered volume can be obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Amazon,
}

impl LocationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "amazon" => Some(Self::Amazon),
            _ => None,
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered volume that has not been imported into the library yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistResult {
    /// `None` until persisted
    pub id: Option<i64>,
    pub series_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub volume_number: u32,
    pub authors: Vec<String>,
    /// Free text as shown by the marketplace (e.g. "March 5, 2024")
    pub release_date: Option<String>,
    pub page_count: Option<u32>,
    pub cover_url: Option<String>,
    pub location_type: LocationType,
    pub location_url: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub discovered_at: DateTime<Utc>,
}

impl WatchlistResult {
    /// True when the result is strictly newer than `last_volume_number`
    pub fn is_after(&self, last_volume_number: u32) -> bool {
        self.volume_number > last_volume_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watchlist(last_volume: Option<u32>) -> WatchlistWithSeries {
        WatchlistWithSeries {
            watchlist: SeriesWatchlist {
                id: 1,
                series_id: 10,
                user_id: 100,
                last_volume_id: last_volume.map(|_| 7),
            },
            series: Series {
                id: 10,
                name: "The Expanse".to_string(),
            },
            last_volume: last_volume.map(|number| LastKnownVolume {
                book_id: 7,
                title: "Cibola Burn".to_string(),
                volume_number: number,
                location_url: Some("https://www.amazon.com/dp/B00G3L7V0C".to_string()),
            }),
        }
    }

    #[test]
    fn last_volume_number_defaults_to_zero() {
        assert_eq!(watchlist(None).last_volume_number(), 0);
        assert_eq!(watchlist(Some(4)).last_volume_number(), 4);
    }

    #[test]
    fn location_type_round_trips_through_text() {
        assert_eq!(LocationType::parse("Amazon"), Some(LocationType::Amazon));
        assert_eq!(LocationType::Amazon.to_string(), "amazon");
        assert_eq!(LocationType::parse("kobo"), None);
    }
}
