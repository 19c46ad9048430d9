//! Marketplace HTML parsing
//!
//! Selector-based extraction for series resolution and per-volume metadata.
//! Parsers are synchronous; `scraper::Html` never crosses an await point.

pub mod asin;
pub mod book_detail_parser;
pub mod config;
pub mod error;
pub mod series_page_parser;

// Re-export public types
pub use asin::extract_asin;
pub use book_detail_parser::BookDetailParser;
pub use config::{BookDetailSelectors, MarketplaceSelectors, SeriesSelectors};
pub use error::{ParsingError, ParsingResult};
pub use series_page_parser::SeriesPageParser;

use scraper::{ElementRef, Selector};
use tracing::warn;

/// Compile fallback selector strings, skipping (and logging) broken ones
pub(crate) fn compile_selectors(field: &str, selector_strings: &[String]) -> ParsingResult<Vec<Selector>> {
    let mut selectors = Vec::with_capacity(selector_strings.len());

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => warn!("Failed to compile selector '{}' for {}: {}", selector_str, field, e),
        }
    }

    if selectors.is_empty() {
        return Err(ParsingError::NoSelectors {
            field: field.to_string(),
        });
    }

    Ok(selectors)
}

/// Element text with whitespace collapsed
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_broken_selectors_are_skipped() {
        let selectors = compile_selectors("title", &["##".to_string(), "#productTitle".to_string()]).unwrap();
        assert_eq!(selectors.len(), 1);
    }

    #[test]
    fn test_all_broken_selectors_rejected() {
        let result = compile_selectors("title", &["##".to_string()]);
        assert!(matches!(result, Err(ParsingError::NoSelectors { .. })));
    }

    #[test]
    fn test_element_text_collapses_whitespace() {
        let html = Html::parse_fragment("<span id=\"t\">\n  Leviathan\n   <b>Wakes</b>  </span>");
        let selector = Selector::parse("#t").unwrap();
        let element = html.select(&selector).next().unwrap();
        assert_eq!(element_text(&element), "Leviathan Wakes");
    }
}
