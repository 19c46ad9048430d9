//! Infrastructure layer for database connections, parsing, and external integrations
//!
//! This module provides the SQLite stores, marketplace HTTP access, HTML
//! parsing, configuration loading and logging setup.

pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod retry_policy;
pub mod task_run_repository;
pub mod watchlist_repository;

// Re-export commonly used items
pub use config::{AppConfig, ConfigError};
pub use database_connection::DatabaseConnection;
pub use http_client::{FetchError, HtmlFetcher, HttpClient};
pub use logging::{init_logging, init_logging_with_config};
pub use parsing::{BookDetailParser, ParsingError, ParsingResult, SeriesPageParser};
pub use retry_policy::{RetryPolicy, RetryableError, retry_async};
pub use task_run_repository::SqliteTaskRunRepository;
pub use watchlist_repository::SqliteWatchlistRepository;
