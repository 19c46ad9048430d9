//! SQLite implementation of [`WatchlistRepository`]
//!
//! List-valued result columns (authors, categories, tags) are stored as JSON text.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{
    LastKnownVolume, LocationType, NewWatchlist, Series, SeriesWatchlist, WatchlistRepository, WatchlistResult,
    WatchlistWithSeries,
};

#[derive(Clone)]
pub struct SqliteWatchlistRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteWatchlistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    fn watchlist_from_row(row: &SqliteRow) -> Result<WatchlistWithSeries> {
        let last_volume = match row.try_get::<Option<i64>, _>("book_id")? {
            Some(book_id) => Some(LastKnownVolume {
                book_id,
                title: row.try_get("book_title")?,
                volume_number: to_u32(row.try_get("book_volume")?, "books.volume_number")?,
                location_url: row.try_get("book_location")?,
            }),
            None => None,
        };

        Ok(WatchlistWithSeries {
            watchlist: SeriesWatchlist {
                id: row.try_get("id")?,
                series_id: row.try_get("series_id")?,
                user_id: row.try_get("user_id")?,
                last_volume_id: row.try_get("last_volume_id")?,
            },
            series: Series {
                id: row.try_get("series_id")?,
                name: row.try_get("series_name")?,
            },
            last_volume,
        })
    }

    fn result_from_row(row: &SqliteRow) -> Result<WatchlistResult> {
        let location_type: String = row.try_get("location_type")?;
        let page_count: Option<i64> = row.try_get("page_count")?;

        Ok(WatchlistResult {
            id: Some(row.try_get("id")?),
            series_id: row.try_get("series_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            volume_number: to_u32(row.try_get("volume_number")?, "volume_number")?,
            authors: from_json(&row.try_get::<String, _>("authors")?)?,
            release_date: row.try_get("release_date")?,
            page_count: page_count.map(|count| to_u32(count, "page_count")).transpose()?,
            cover_url: row.try_get("cover_url")?,
            location_type: LocationType::parse(&location_type)
                .ok_or_else(|| anyhow!("Unknown location type: {}", location_type))?,
            location_url: row.try_get("location_url")?,
            categories: from_json(&row.try_get::<String, _>("categories")?)?,
            tags: from_json(&row.try_get::<String, _>("tags")?)?,
            discovered_at: row.try_get::<DateTime<Utc>, _>("discovered_at")?,
        })
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("Column {column} out of range: {value}"))
}

fn from_json(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).context("Failed to decode JSON list column")
}

#[async_trait]
impl WatchlistRepository for SqliteWatchlistRepository {
    async fn create_watchlist(&self, watchlist: &NewWatchlist) -> Result<SeriesWatchlist> {
        let id = sqlx::query(
            r#"
            INSERT INTO series_watchlists (series_id, user_id, last_volume_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(watchlist.series_id)
        .bind(watchlist.user_id)
        .bind(watchlist.last_volume_id)
        .execute(&*self.pool)
        .await?
        .last_insert_rowid();

        Ok(SeriesWatchlist {
            id,
            series_id: watchlist.series_id,
            user_id: watchlist.user_id,
            last_volume_id: watchlist.last_volume_id,
        })
    }

    async fn delete_watchlist(&self, watchlist_id: i64) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM series_watchlists WHERE id = ?")
            .bind(watchlist_id)
            .execute(&*self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn find_all_with_series(&self) -> Result<Vec<WatchlistWithSeries>> {
        let rows = sqlx::query(
            r#"
            SELECT w.id, w.series_id, w.user_id, w.last_volume_id,
                   s.name AS series_name,
                   b.id AS book_id, b.title AS book_title,
                   b.volume_number AS book_volume, b.location_url AS book_location
            FROM series_watchlists w
            JOIN series s ON s.id = w.series_id
            LEFT JOIN books b ON b.id = w.last_volume_id
            ORDER BY w.id
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(Self::watchlist_from_row).collect()
    }

    async fn find_results_for_series(&self, series_id: i64) -> Result<Vec<WatchlistResult>> {
        let rows = sqlx::query(
            r#"
            SELECT id, series_id, title, description, volume_number, authors, release_date,
                   page_count, cover_url, location_type, location_url, categories, tags, discovered_at
            FROM series_watchlist_results
            WHERE series_id = ?
            ORDER BY volume_number ASC
            "#,
        )
        .bind(series_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(Self::result_from_row).collect()
    }

    async fn replace_results_for_series(&self, series_id: i64, results: &[WatchlistResult]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query("DELETE FROM series_watchlist_results WHERE series_id = ?")
            .bind(series_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for result in results {
            sqlx::query(
                r#"
                INSERT INTO series_watchlist_results
                (series_id, title, description, volume_number, authors, release_date, page_count,
                 cover_url, location_type, location_url, categories, tags, discovered_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(series_id)
            .bind(&result.title)
            .bind(&result.description)
            .bind(i64::from(result.volume_number))
            .bind(serde_json::to_string(&result.authors)?)
            .bind(&result.release_date)
            .bind(result.page_count.map(i64::from))
            .bind(&result.cover_url)
            .bind(result.location_type.as_str())
            .bind(&result.location_url)
            .bind(serde_json::to_string(&result.categories)?)
            .bind(serde_json::to_string(&result.tags)?)
            .bind(result.discovered_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            series_id,
            superseded,
            inserted = results.len(),
            "Replaced watchlist results"
        );
        Ok(results.len())
    }

    async fn dismiss_result(&self, result_id: i64) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM series_watchlist_results WHERE id = ?")
            .bind(result_id)
            .execute(&*self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}
