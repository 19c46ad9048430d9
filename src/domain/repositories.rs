//! Repository interfaces for watchlist tracking
//!
//! Contains trait definitions for the stores the update pipeline reads from
//! and writes to. SQLite implementations live in the infrastructure layer.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::watchlist::{NewWatchlist, SeriesWatchlist, WatchlistResult, WatchlistWithSeries};

#[async_trait]
pub trait WatchlistRepository: Send + Sync {
    // Opt-in / opt-out
    async fn create_watchlist(&self, watchlist: &NewWatchlist) -> Result<SeriesWatchlist>;
    async fn delete_watchlist(&self, watchlist_id: i64) -> Result<bool>;

    // Orchestrator reads
    async fn find_all_with_series(&self) -> Result<Vec<WatchlistWithSeries>>;
    async fn find_results_for_series(&self, series_id: i64) -> Result<Vec<WatchlistResult>>;

    // Persisting scraped results; previous results of the series are superseded
    async fn replace_results_for_series(&self, series_id: i64, results: &[WatchlistResult]) -> Result<usize>;
    async fn dismiss_result(&self, result_id: i64) -> Result<bool>;
}

/// Final state of a recorded task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Interrupted,
    Abandoned,
}

impl TaskOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
            Self::Abandoned => "abandoned",
        }
    }
}

/// A task run that was started but never recorded as finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnfinishedRun {
    pub run_id: Uuid,
    pub task_key: String,
    pub started_at: DateTime<Utc>,
}

#[async_trait]
pub trait TaskRunRepository: Send + Sync {
    async fn record_start(&self, task_key: &str) -> Result<Uuid>;
    async fn record_finish(&self, run_id: Uuid, outcome: TaskOutcome) -> Result<()>;
    async fn find_unfinished(&self, task_key: &str) -> Result<Vec<UnfinishedRun>>;
    async fn mark_abandoned(&self, run_id: Uuid) -> Result<()>;
}
