//! Per-volume metadata from a product detail page
//!
//! Only the title is required. Every other field degrades to `None` or an
//! empty list when the page layout does not carry it.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

use super::config::BookDetailSelectors;
use super::{ParsingError, ParsingResult, compile_selectors, element_text};
use crate::domain::BookMetadata;

static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d[\d,]*)").expect("number pattern is valid"));

static SERIES_POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbook\s+(\d+)\s+of\b").expect("series position pattern is valid"));

pub struct BookDetailParser {
    title_selectors: Vec<Selector>,
    author_selectors: Vec<Selector>,
    description_selectors: Vec<Selector>,
    release_date_selectors: Vec<Selector>,
    page_count_selectors: Vec<Selector>,
    cover_selectors: Vec<Selector>,
    category_selectors: Vec<Selector>,
    series_position_selectors: Vec<Selector>,
}

impl BookDetailParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&BookDetailSelectors::default())
    }

    pub fn with_config(selectors: &BookDetailSelectors) -> ParsingResult<Self> {
        Ok(Self {
            title_selectors: compile_selectors("title", &selectors.title)?,
            author_selectors: compile_selectors("authors", &selectors.authors)?,
            description_selectors: compile_selectors("description", &selectors.description)?,
            release_date_selectors: compile_selectors("release_date", &selectors.release_date)?,
            page_count_selectors: compile_selectors("page_count", &selectors.page_count)?,
            cover_selectors: compile_selectors("cover", &selectors.cover)?,
            category_selectors: compile_selectors("categories", &selectors.categories)?,
            series_position_selectors: compile_selectors("series_position", &selectors.series_position)?,
        })
    }

    pub fn parse(&self, asin: &str, html: &str) -> ParsingResult<BookMetadata> {
        let document = Html::parse_document(html);

        let title = first_text(&document, &self.title_selectors)
            .ok_or_else(|| ParsingError::required_field_missing("title", asin))?;

        Ok(BookMetadata {
            asin: asin.to_string(),
            title,
            description: first_text(&document, &self.description_selectors),
            authors: all_texts(&document, &self.author_selectors),
            release_date: first_text(&document, &self.release_date_selectors),
            page_count: first_text(&document, &self.page_count_selectors).and_then(|text| parse_page_count(&text)),
            cover_url: self.extract_cover(&document),
            categories: all_texts(&document, &self.category_selectors),
            tags: Vec::new(),
            series_position: first_text(&document, &self.series_position_selectors)
                .and_then(|text| parse_series_position(&text)),
        })
    }

    /// High-resolution image first, then the plain `src`; inline data URIs are ignored
    fn extract_cover(&self, document: &Html) -> Option<String> {
        self.cover_selectors.iter().find_map(|selector| {
            document.select(selector).find_map(|image| {
                ["data-old-hires", "src"]
                    .iter()
                    .filter_map(|attr| image.value().attr(attr))
                    .map(str::trim)
                    .find(|url| !url.is_empty() && !url.starts_with("data:"))
                    .map(str::to_string)
            })
        })
    }
}

fn first_text(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        document
            .select(selector)
            .map(|element| element_text(&element))
            .find(|text| !text.is_empty())
    })
}

/// Texts of the first selector that matches anything, in document order without repeats
fn all_texts(document: &Html, selectors: &[Selector]) -> Vec<String> {
    for selector in selectors {
        let elements: Vec<ElementRef<'_>> = document.select(selector).collect();
        if elements.is_empty() {
            continue;
        }

        let mut seen = HashSet::new();
        return elements
            .iter()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .filter(|text| seen.insert(text.clone()))
            .collect();
    }
    Vec::new()
}

/// "1,024 pages" -> 1024
fn parse_page_count(text: &str) -> Option<u32> {
    FIRST_NUMBER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// "Book 4 of 9" -> 4
fn parse_series_position(text: &str) -> Option<u32> {
    SERIES_POSITION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
