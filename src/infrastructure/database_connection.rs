// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                tokio::fs::File::create(db_path).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to database: {}", database_url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_series_sql = r#"
            CREATE TABLE IF NOT EXISTS series (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            )
        "#;

        let create_books_sql = r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                series_id INTEGER,
                title TEXT NOT NULL,
                volume_number INTEGER NOT NULL DEFAULT 0,
                location_url TEXT,
                FOREIGN KEY (series_id) REFERENCES series (id) ON DELETE SET NULL
            )
        "#;

        let create_watchlists_sql = r#"
            CREATE TABLE IF NOT EXISTS series_watchlists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                series_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                last_volume_id INTEGER,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (series_id, user_id),
                FOREIGN KEY (series_id) REFERENCES series (id) ON DELETE CASCADE,
                FOREIGN KEY (last_volume_id) REFERENCES books (id) ON DELETE SET NULL
            )
        "#;

        let create_results_sql = r#"
            CREATE TABLE IF NOT EXISTS series_watchlist_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                series_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                volume_number INTEGER NOT NULL,
                authors TEXT NOT NULL DEFAULT '[]',
                release_date TEXT,
                page_count INTEGER,
                cover_url TEXT,
                location_type TEXT NOT NULL,
                location_url TEXT NOT NULL,
                categories TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                discovered_at DATETIME NOT NULL,
                FOREIGN KEY (series_id) REFERENCES series (id) ON DELETE CASCADE
            )
        "#;

        let create_task_runs_sql = r#"
            CREATE TABLE IF NOT EXISTS task_runs (
                id TEXT PRIMARY KEY,
                task_key TEXT NOT NULL,
                started_at DATETIME NOT NULL,
                finished_at DATETIME,
                outcome TEXT
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_results_series_id ON series_watchlist_results (series_id);
            CREATE INDEX IF NOT EXISTS idx_books_series_id ON books (series_id);
            CREATE INDEX IF NOT EXISTS idx_task_runs_key ON task_runs (task_key, finished_at);
        "#;

        sqlx::query(create_series_sql).execute(&self.pool).await?;
        sqlx::query(create_books_sql).execute(&self.pool).await?;
        sqlx::query(create_watchlists_sql).execute(&self.pool).await?;
        sqlx::query(create_results_sql).execute(&self.pool).await?;
        sqlx::query(create_task_runs_sql).execute(&self.pool).await?;
        sqlx::raw_sql(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}
