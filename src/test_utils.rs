//! Test utilities for series-watch
//!
//! Provides a file-backed test database with seeding helpers and a canned
//! page fetcher so tests never touch the network.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::infrastructure::{DatabaseConnection, FetchError, HtmlFetcher};

/// Migrated SQLite database living in its own temporary directory
pub struct TestDatabase {
    pub connection: DatabaseConnection,
    _dir: TempDir,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let connection = DatabaseConnection::new(&url).await?;
        connection.migrate().await?;
        Ok(Self { connection, _dir: dir })
    }

    pub fn pool(&self) -> sqlx::Pool<sqlx::Sqlite> {
        self.connection.pool().clone()
    }

    pub async fn insert_series(&self, id: i64, name: &str) -> Result<()> {
        sqlx::query("INSERT INTO series (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    pub async fn insert_book(&self, id: i64, series_id: i64, volume_number: u32, location_url: &str) -> Result<()> {
        sqlx::query("INSERT INTO books (id, series_id, title, volume_number, location_url) VALUES (?, ?, ?, ?, ?)")
            .bind(id)
            .bind(series_id)
            .bind(format!("Volume {volume_number}"))
            .bind(i64::from(volume_number))
            .bind(location_url)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }
}

/// Serves canned HTML by URL; unknown URLs fail with a 503
#[derive(Default)]
pub struct StaticPages {
    pages: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl StaticPages {
    pub fn new(pages: impl IntoIterator<Item = (String, String)>) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.into_iter().collect(),
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl HtmlFetcher for StaticPages {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
            status: 503,
            url: url.to_string(),
            retry_after: None,
        })
    }
}

pub fn product_url(asin: &str) -> String {
    format!("https://www.amazon.com/dp/{asin}")
}

/// Detail page whose series-context container names `series_asin`
pub fn detail_page(title: &str, series_asin: Option<&str>, position: Option<u32>) -> String {
    let container = series_asin
        .map(|asin| format!(r#"<div id="cardContextDataContainer" data-collection-asin="{asin}"></div>"#))
        .unwrap_or_default();
    let series_label = position
        .map(|n| {
            format!(
                r#"<div id="rpi-attribute-book_details-series"><div class="rpi-attribute-label"><span>Book {n} of 12</span></div></div>"#
            )
        })
        .unwrap_or_default();
    format!(r#"<html><body>{container}<span id="productTitle">{title}</span>{series_label}</body></html>"#)
}

/// Series page listing `asins` as title links in the given order
pub fn series_page(asins: &[String]) -> String {
    let links: String = asins
        .iter()
        .map(|asin| format!(r#"<a class="a-link-normal itemBookTitle" href="/dp/{asin}?ref_=series">{asin}</a>"#))
        .collect();
    format!("<html><body>{links}</body></html>")
}
