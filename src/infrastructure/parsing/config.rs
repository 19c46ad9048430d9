//! CSS selectors for marketplace pages
//!
//! Each field holds fallbacks tried in order. Update these when the
//! marketplace changes its markup.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceSelectors {
    pub series: SeriesSelectors,
    pub detail: BookDetailSelectors,
}

/// Selectors used to resolve a series and its volumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSelectors {
    /// Series-context container on a volume's detail page
    pub context_container: Vec<String>,
    /// Attribute of the container holding the series identifier
    pub series_id_attribute: String,
    /// Title links of the volumes on the series page
    pub volume_title_links: Vec<String>,
}

impl Default for SeriesSelectors {
    fn default() -> Self {
        Self {
            context_container: vec!["#cardContextDataContainer".to_string()],
            series_id_attribute: "data-collection-asin".to_string(),
            volume_title_links: vec![
                "a.itemBookTitle".to_string(),
                "a[id^='itemBookTitle_']".to_string(),
            ],
        }
    }
}

/// Selectors for per-volume metadata on a detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDetailSelectors {
    pub title: Vec<String>,
    pub authors: Vec<String>,
    pub description: Vec<String>,
    pub release_date: Vec<String>,
    pub page_count: Vec<String>,
    pub cover: Vec<String>,
    pub categories: Vec<String>,
    pub series_position: Vec<String>,
}

impl Default for BookDetailSelectors {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();

        Self {
            title: list(&["#productTitle", "#ebooksProductTitle", "span#title"]),
            authors: list(&[
                "#bylineInfo .author a.a-link-normal",
                "#bylineInfo .author .contributorNameID",
            ]),
            description: list(&[
                "#bookDescription_feature_div .a-expander-content",
                "#bookDescription_feature_div noscript",
                "#productDescription",
            ]),
            release_date: list(&["#rpi-attribute-book_details-publication_date .rpi-attribute-value span"]),
            page_count: list(&[
                "#rpi-attribute-book_details-ebook_pages .rpi-attribute-value span",
                "#rpi-attribute-book_details-fiona_pages .rpi-attribute-value span",
            ]),
            cover: list(&["#landingImage", "#imgBlkFront", "#ebooksImgBlkFront"]),
            categories: list(&["#wayfinding-breadcrumbs_feature_div ul li a"]),
            series_position: list(&["#rpi-attribute-book_details-series .rpi-attribute-label span"]),
        }
    }
}
