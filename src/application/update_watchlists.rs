//! Periodic watchlist update
//!
//! Walks every watchlist sequentially: scrape, persist, pause, report. A
//! failing series is logged and counted; the run moves on to the next one.
//! Interruption is honoured between watchlists only.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::application::watchlist_scraper::WatchlistScraper;
use crate::domain::{WatchlistRepository, WatchlistWithSeries};
use crate::scheduling::{ScheduledTask, TaskContext, TaskError, TaskKey};

pub const UPDATE_WATCHLISTS_TASK: &str = "update-watchlists";

/// Totals of one update run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub failed: usize,
    pub results_saved: usize,
    pub interrupted: bool,
}

pub struct UpdateWatchlistsTask {
    repository: Arc<dyn WatchlistRepository>,
    scraper: Arc<WatchlistScraper>,
    series_delay: Duration,
}

impl UpdateWatchlistsTask {
    pub fn new(repository: Arc<dyn WatchlistRepository>, scraper: Arc<WatchlistScraper>, series_delay: Duration) -> Self {
        Self {
            repository,
            scraper,
            series_delay,
        }
    }

    /// One pass over all watchlists
    pub async fn run(&self, ctx: &TaskContext) -> Result<RunSummary, TaskError> {
        let watchlists = self.repository.find_all_with_series().await?;
        let total = watchlists.len();
        info!(total, "Starting watchlist update");
        ctx.set_progress(0, total);

        let mut summary = RunSummary::default();
        for (index, entry) in watchlists.iter().enumerate() {
            ctx.set_message(format!("Checking {} for new volumes", entry.series.name));

            match self.update_one(entry).await {
                Ok(saved) => {
                    summary.processed += 1;
                    summary.results_saved += saved;
                }
                Err(e) => {
                    error!(
                        watchlist_id = entry.watchlist.id,
                        series_id = entry.series.id,
                        series = %entry.series.name,
                        "Failed to update watchlist: {:#}",
                        e
                    );
                    summary.failed += 1;
                }
            }

            sleep(self.series_delay).await;
            ctx.set_progress(index + 1, total);

            if ctx.is_interrupted() {
                warn!(done = index + 1, total, "Watchlist update interrupted");
                summary.interrupted = true;
                break;
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            results_saved = summary.results_saved,
            interrupted = summary.interrupted,
            "Watchlist update finished"
        );
        Ok(summary)
    }

    async fn update_one(&self, entry: &WatchlistWithSeries) -> Result<usize> {
        let results = self.scraper.scrape(entry).await?;
        let saved = self
            .repository
            .replace_results_for_series(entry.series.id, &results)
            .await?;
        Ok(saved)
    }
}

#[async_trait]
impl ScheduledTask for UpdateWatchlistsTask {
    fn key(&self) -> TaskKey {
        TaskKey::new(UPDATE_WATCHLISTS_TASK)
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let summary = self.run(ctx).await?;
        if summary.interrupted {
            return Err(TaskError::Interrupted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::batch_fetch::BatchSettings;
    use crate::application::metadata_scraper::MarketplaceMetadataScraper;
    use crate::domain::NewWatchlist;
    use crate::infrastructure::SqliteWatchlistRepository;
    use crate::infrastructure::config::MarketplaceConfig;
    use crate::scheduling::{ProgressReporter, TaskProgress};
    use crate::test_utils::{StaticPages, TestDatabase, detail_page, product_url, series_page};
    use std::sync::Mutex;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingReporter {
        messages: Mutex<Vec<String>>,
        progress: Mutex<Vec<TaskProgress>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn set_progress(&self, current: usize, total: usize) {
            self.progress.lock().unwrap().push(TaskProgress { current, total });
        }

        fn set_message(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    // SQLite runs on its own threads, so these tests use real time
    const SERIES_DELAY: Duration = Duration::from_millis(20);

    /// Series `n` has volumes 1 and 2; the library knows volume 1
    fn series_pages(n: u32, with_series_page: bool) -> Vec<(String, String)> {
        let known = format!("B00000000{n}");
        let series = format!("B0SERIES0{n}");
        let new = format!("B10000000{n}");

        let mut pages = vec![
            (product_url(&known), detail_page("Known", Some(&series), None)),
            (product_url(&new), detail_page(&format!("Series {n} Volume 2"), Some(&series), None)),
        ];
        if with_series_page {
            pages.push((product_url(&series), series_page(&[known, new])));
        }
        pages
    }

    async fn setup(
        pages: Vec<(String, String)>,
        series: u32,
    ) -> (TestDatabase, Arc<SqliteWatchlistRepository>, UpdateWatchlistsTask) {
        let db = TestDatabase::new().await.unwrap();
        let repo = Arc::new(SqliteWatchlistRepository::new(db.pool()));

        for n in 1..=series {
            let id = i64::from(n);
            db.insert_series(id, &format!("Series {n}")).await.unwrap();
            db.insert_book(id * 100, id, 1, &product_url(&format!("B00000000{n}")))
                .await
                .unwrap();
            repo.create_watchlist(&NewWatchlist {
                series_id: id,
                user_id: 1,
                last_volume_id: Some(id * 100),
            })
            .await
            .unwrap();
        }

        let fetcher = StaticPages::new(pages);
        let metadata = Arc::new(MarketplaceMetadataScraper::new(fetcher.clone(), MarketplaceConfig::default()).unwrap());
        let scraper = Arc::new(
            WatchlistScraper::new(fetcher, metadata, MarketplaceConfig::default(), BatchSettings::default()).unwrap(),
        );
        let task = UpdateWatchlistsTask::new(repo.clone(), scraper, SERIES_DELAY);
        (db, repo, task)
    }

    #[tokio::test]
    async fn test_failing_series_does_not_stop_the_run() {
        let mut pages = series_pages(1, true);
        pages.extend(series_pages(2, false));
        pages.extend(series_pages(3, true));
        let (_db, repo, task) = setup(pages, 3).await;

        let reporter = Arc::new(RecordingReporter::default());
        let ctx = TaskContext::new(task.key(), CancellationToken::new(), reporter.clone());
        let start = Instant::now();

        let summary = task.run(&ctx).await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                processed: 2,
                failed: 1,
                results_saved: 2,
                interrupted: false,
            }
        );
        assert!(start.elapsed() >= SERIES_DELAY * 3);

        assert_eq!(repo.find_results_for_series(1).await.unwrap()[0].title, "Series 1 Volume 2");
        assert!(repo.find_results_for_series(2).await.unwrap().is_empty());
        assert_eq!(repo.find_results_for_series(3).await.unwrap()[0].volume_number, 2);

        let messages = reporter.messages.lock().unwrap().clone();
        assert_eq!(
            messages,
            vec![
                "Checking Series 1 for new volumes",
                "Checking Series 2 for new volumes",
                "Checking Series 3 for new volumes",
            ]
        );
        let progress: Vec<_> = reporter.progress.lock().unwrap().iter().map(|p| p.current).collect();
        assert_eq!(progress, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_interrupt_stops_after_current_watchlist() {
        let mut pages = series_pages(1, true);
        pages.extend(series_pages(2, true));
        let (_db, repo, task) = setup(pages, 2).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = TaskContext::detached(task.key(), cancel);

        let summary = task.run(&ctx).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert!(summary.interrupted);
        assert_eq!(repo.find_results_for_series(1).await.unwrap().len(), 1);
        assert!(repo.find_results_for_series(2).await.unwrap().is_empty());

        assert!(matches!(task.execute(&ctx).await, Err(TaskError::Interrupted)));
    }

    #[tokio::test]
    async fn test_rerun_supersedes_previous_results() {
        let (_db, repo, task) = setup(series_pages(1, true), 1).await;
        let ctx = TaskContext::detached(task.key(), CancellationToken::new());

        task.execute(&ctx).await.unwrap();
        task.execute(&ctx).await.unwrap();

        assert_eq!(repo.find_results_for_series(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_watchlist_table() {
        let (_db, _repo, task) = setup(Vec::new(), 0).await;
        let ctx = TaskContext::detached(task.key(), CancellationToken::new());

        assert_eq!(task.run(&ctx).await.unwrap(), RunSummary::default());
    }
}
