//! Series resolution parsing
//!
//! A volume's detail page carries a series-context container whose attribute
//! names the series. The series page then lists every volume as a title link.

use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;

use super::config::SeriesSelectors;
use super::{ParsingResult, compile_selectors, extract_asin};

pub struct SeriesPageParser {
    context_container_selectors: Vec<Selector>,
    series_id_attribute: String,
    volume_link_selectors: Vec<Selector>,
}

impl SeriesPageParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&SeriesSelectors::default())
    }

    pub fn with_config(selectors: &SeriesSelectors) -> ParsingResult<Self> {
        Ok(Self {
            context_container_selectors: compile_selectors("context_container", &selectors.context_container)?,
            series_id_attribute: selectors.series_id_attribute.clone(),
            volume_link_selectors: compile_selectors("volume_title_links", &selectors.volume_title_links)?,
        })
    }

    /// Series identifier from a volume's detail page.
    ///
    /// `None` means the book is not part of a series the marketplace knows.
    pub fn parse_series_asin(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);

        self.context_container_selectors.iter().find_map(|selector| {
            document
                .select(selector)
                .filter_map(|container| container.value().attr(&self.series_id_attribute))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(str::to_string)
        })
    }

    /// Volume identifiers of a series page in document order.
    ///
    /// Anchors without an `href` or without an extractable identifier are
    /// skipped; repeated identifiers keep their first position.
    pub fn parse_volume_asins(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);

        for selector in &self.volume_link_selectors {
            let anchors: Vec<_> = document.select(selector).collect();
            if anchors.is_empty() {
                continue;
            }

            let mut seen = HashSet::new();
            let mut asins = Vec::with_capacity(anchors.len());
            for anchor in anchors {
                let Some(href) = anchor.value().attr("href") else {
                    debug!("Skipping volume link without href");
                    continue;
                };
                let Some(asin) = extract_asin(href) else {
                    debug!("Skipping volume link without identifier: {}", href);
                    continue;
                };
                if seen.insert(asin.clone()) {
                    asins.push(asin);
                }
            }
            return asins;
        }

        Vec::new()
    }
}
