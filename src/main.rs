//! series-watch entry point
//!
//! `series-watch [run]` keeps the hourly update scheduled until Ctrl+C.
//! `series-watch once` performs a single update pass and exits.

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use series_watch::application::{
    BatchSettings, MarketplaceMetadataScraper, UPDATE_WATCHLISTS_TASK, UpdateWatchlistsTask, WatchlistScraper,
};
use series_watch::infrastructure::logging::log_system_info;
use series_watch::infrastructure::{
    AppConfig, DatabaseConnection, HtmlFetcher, HttpClient, SqliteTaskRunRepository, SqliteWatchlistRepository,
    init_logging_with_config,
};
use series_watch::scheduling::{LocalScheduler, ScheduledTask, TaskContext, TaskKey, TaskScheduler, Trigger};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging_with_config(&config.logging)?;
    log_system_info();
    info!(path = %AppConfig::config_path(), "Loaded configuration");

    let db = DatabaseConnection::with_max_connections(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to open database")?;
    db.migrate().await.context("Failed to migrate database")?;

    let fetcher: Arc<dyn HtmlFetcher> = Arc::new(HttpClient::with_config(&config.http)?.with_context_label("watchlist"));
    let metadata = Arc::new(MarketplaceMetadataScraper::new(fetcher.clone(), config.marketplace.clone())?);
    let scraper = Arc::new(WatchlistScraper::new(
        fetcher,
        metadata,
        config.marketplace.clone(),
        BatchSettings::from(&config.watchlist),
    )?);
    let watchlists = Arc::new(SqliteWatchlistRepository::new(db.pool().clone()));
    let task = Arc::new(UpdateWatchlistsTask::new(
        watchlists,
        scraper,
        config.watchlist.series_delay(),
    ));

    match std::env::args().nth(1).as_deref() {
        Some("once") => run_once(&task).await,
        None | Some("run") => {
            let runs = Arc::new(SqliteTaskRunRepository::new(db.pool().clone()));
            let scheduler = LocalScheduler::with_config(runs, &config.scheduler);
            let trigger = match &config.scheduler.update_cron {
                Some(expression) => Trigger::cron(expression)?,
                None => Trigger::every(config.scheduler.update_interval()),
            }
            .with_run_on_start(config.scheduler.run_on_startup);
            run_scheduled(&scheduler, task, trigger).await
        }
        Some(other) => Err(anyhow!("Unknown command '{}', expected 'run' or 'once'", other)),
    }
}

async fn run_once(task: &UpdateWatchlistsTask) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, stopping after the current watchlist");
            on_signal.cancel();
        }
    });

    let ctx = TaskContext::detached(task.key(), cancel);
    let summary = task.run(&ctx).await?;
    info!(
        "Update pass done: {} processed, {} failed, {} results saved",
        summary.processed, summary.failed, summary.results_saved
    );
    Ok(())
}

async fn run_scheduled(scheduler: &LocalScheduler, task: Arc<UpdateWatchlistsTask>, trigger: Trigger) -> Result<()> {
    scheduler.schedule(task, trigger).await?;
    info!("Scheduler running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;

    let key = TaskKey::new(UPDATE_WATCHLISTS_TASK);
    if scheduler.interrupt(&key).await? {
        info!("Waiting for the running update to reach a safe point");
    }
    scheduler.shutdown().await;
    Ok(())
}
