//! Generic per-product metadata fetching
//!
//! [`MetadataSource`] is the capability the watchlist scraper composes: given
//! a product identifier, return its parsed metadata.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::domain::BookMetadata;
use crate::infrastructure::config::MarketplaceConfig;
use crate::infrastructure::{BookDetailParser, FetchError, HtmlFetcher, ParsingError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parsing(#[from] ParsingError),
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_metadata(&self, asin: &str) -> Result<BookMetadata, ScrapeError>;
}

/// Fetches a product detail page and parses it into [`BookMetadata`]
pub struct MarketplaceMetadataScraper {
    fetcher: Arc<dyn HtmlFetcher>,
    parser: BookDetailParser,
    marketplace: MarketplaceConfig,
}

impl MarketplaceMetadataScraper {
    pub fn new(fetcher: Arc<dyn HtmlFetcher>, marketplace: MarketplaceConfig) -> Result<Self, ParsingError> {
        let parser = BookDetailParser::with_config(&marketplace.selectors.detail)?;
        Ok(Self {
            fetcher,
            parser,
            marketplace,
        })
    }
}

#[async_trait]
impl MetadataSource for MarketplaceMetadataScraper {
    async fn fetch_metadata(&self, asin: &str) -> Result<BookMetadata, ScrapeError> {
        let url = self.marketplace.product_url(asin);
        let html = self.fetcher.fetch_html(&url).await?;
        let metadata = self.parser.parse(asin, &html)?;
        debug!(asin, title = %metadata.title, "Parsed product metadata");
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StaticPages, product_url};

    fn scraper(pages: Vec<(String, String)>) -> (MarketplaceMetadataScraper, Arc<StaticPages>) {
        let fetcher = StaticPages::new(pages);
        let scraper = MarketplaceMetadataScraper::new(fetcher.clone(), MarketplaceConfig::default()).unwrap();
        (scraper, fetcher)
    }

    #[tokio::test]
    async fn test_fetches_detail_page_by_asin() {
        let (scraper, fetcher) = scraper(vec![(
            product_url("B000000004"),
            r#"<span id="productTitle">Cibola Burn</span>"#.to_string(),
        )]);

        let metadata = scraper.fetch_metadata("B000000004").await.unwrap();
        assert_eq!(metadata.title, "Cibola Burn");
        assert_eq!(metadata.asin, "B000000004");
        assert_eq!(fetcher.requested(), vec![product_url("B000000004")]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_surfaced() {
        let (scraper, _) = scraper(Vec::new());
        let result = scraper.fetch_metadata("B000000004").await;
        assert!(matches!(result, Err(ScrapeError::Fetch(FetchError::Status { status: 503, .. }))));
    }

    #[tokio::test]
    async fn test_page_without_title_is_a_parsing_error() {
        let (scraper, _) = scraper(vec![(
            product_url("B000000004"),
            "<html><p>robot check</p></html>".to_string(),
        )]);
        let result = scraper.fetch_metadata("B000000004").await;
        assert!(matches!(result, Err(ScrapeError::Parsing(ParsingError::RequiredFieldMissing { .. }))));
    }
}
