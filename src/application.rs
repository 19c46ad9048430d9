//! Application layer - watchlist update use cases
//!
//! Composes the marketplace fetching and parsing infrastructure into the
//! update pipeline the scheduler drives.

pub mod batch_fetch;
pub mod metadata_scraper;
pub mod update_watchlists;
pub mod watchlist_scraper;

// Re-export commonly used items
pub use batch_fetch::{BatchOutcome, BatchSettings, fetch_in_batches};
pub use metadata_scraper::{MarketplaceMetadataScraper, MetadataSource, ScrapeError};
pub use update_watchlists::{RunSummary, UPDATE_WATCHLISTS_TASK, UpdateWatchlistsTask};
pub use watchlist_scraper::WatchlistScraper;
