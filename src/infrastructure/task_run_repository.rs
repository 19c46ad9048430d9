//! SQLite bookkeeping of scheduled task runs
//!
//! A row is written when a run starts and completed when it ends. Rows left
//! without `finished_at` after a restart are runs the process never finished.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{TaskOutcome, TaskRunRepository, UnfinishedRun};

#[derive(Clone)]
pub struct SqliteTaskRunRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteTaskRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn finish(&self, run_id: Uuid, outcome: TaskOutcome) -> Result<()> {
        sqlx::query("UPDATE task_runs SET finished_at = ?, outcome = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(outcome.as_str())
            .bind(run_id.to_string())
            .execute(&*self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRunRepository for SqliteTaskRunRepository {
    async fn record_start(&self, task_key: &str) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        sqlx::query("INSERT INTO task_runs (id, task_key, started_at) VALUES (?, ?, ?)")
            .bind(run_id.to_string())
            .bind(task_key)
            .bind(Utc::now())
            .execute(&*self.pool)
            .await?;
        Ok(run_id)
    }

    async fn record_finish(&self, run_id: Uuid, outcome: TaskOutcome) -> Result<()> {
        self.finish(run_id, outcome).await
    }

    async fn find_unfinished(&self, task_key: &str) -> Result<Vec<UnfinishedRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, task_key, started_at FROM task_runs
            WHERE task_key = ? AND finished_at IS NULL
            ORDER BY started_at ASC
            "#,
        )
        .bind(task_key)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                Ok(UnfinishedRun {
                    run_id: Uuid::parse_str(&id).with_context(|| format!("Malformed run id: {id}"))?,
                    task_key: row.try_get("task_key")?,
                    started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
                })
            })
            .collect()
    }

    async fn mark_abandoned(&self, run_id: Uuid) -> Result<()> {
        self.finish(run_id, TaskOutcome::Abandoned).await
    }
}
