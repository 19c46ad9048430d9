//! Domain module - watchlist entities and repository contracts
//!
//! This module contains the entities the update pipeline works on and the
//! traits through which it reaches persistence.

pub mod book_metadata;
pub mod repositories;
pub mod watchlist;

// Re-export commonly used items
pub use book_metadata::BookMetadata;
pub use repositories::{TaskOutcome, TaskRunRepository, UnfinishedRun, WatchlistRepository};
pub use watchlist::{
    LastKnownVolume, LocationType, NewWatchlist, Series, SeriesWatchlist, WatchlistResult,
    WatchlistWithSeries,
};
