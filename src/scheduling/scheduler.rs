//! Local tokio scheduler
//!
//! Every registered task gets its own loop that waits for the next tick (an
//! interval or a cron fire time), a manual trigger or shutdown. A key never
//! runs concurrently with itself: ticks missed during a run are skipped and a manual trigger received during
//! a run fires once after it.
//!
//! Runs are recorded through [`TaskRunRepository`]. A run left unfinished by
//! a previous process is marked abandoned at registration and, for
//! recoverable tasks, the task fires immediately.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{TaskOutcome, TaskRunRepository};
use crate::infrastructure::config::SchedulerConfig;
use crate::scheduling::task::{ScheduledTask, StatusCell, TaskContext, TaskError, TaskKey, TaskState, TaskStatus, Trigger};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Unknown task: {0}")]
    UnknownTask(TaskKey),

    #[error("Task already registered: {0}")]
    AlreadyRegistered(TaskKey),

    #[error("Scheduler is shut down")]
    ShutDown,

    #[error("Task run store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Scheduling seam the update pipeline is driven through
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    async fn schedule(&self, task: Arc<dyn ScheduledTask>, trigger: Trigger) -> Result<(), SchedulerError>;

    /// Fire a task out of schedule
    async fn trigger_now(&self, key: &TaskKey) -> Result<(), SchedulerError>;

    /// Request the running instance of a task to stop; `false` when it is idle
    async fn interrupt(&self, key: &TaskKey) -> Result<bool, SchedulerError>;

    async fn status(&self, key: &TaskKey) -> Option<TaskStatus>;

    async fn shutdown(&self);
}

struct TaskEntry {
    trigger: Arc<Notify>,
    status: Arc<StatusCell>,
    current_run: Arc<std::sync::Mutex<Option<CancellationToken>>>,
}

impl TaskEntry {
    fn new() -> Self {
        Self {
            trigger: Arc::new(Notify::new()),
            status: Arc::new(StatusCell::default()),
            current_run: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    fn shared(&self) -> Self {
        Self {
            trigger: self.trigger.clone(),
            status: self.status.clone(),
            current_run: self.current_run.clone(),
        }
    }

    fn set_current_run(&self, token: Option<CancellationToken>) {
        *self.current_run.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn current_run(&self) -> Option<CancellationToken> {
        self.current_run.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

pub struct LocalScheduler {
    runs: Arc<dyn TaskRunRepository>,
    recover_interrupted_runs: bool,
    entries: RwLock<HashMap<TaskKey, TaskEntry>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl LocalScheduler {
    pub fn new(runs: Arc<dyn TaskRunRepository>) -> Self {
        Self {
            runs,
            recover_interrupted_runs: true,
            entries: RwLock::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config(runs: Arc<dyn TaskRunRepository>, config: &SchedulerConfig) -> Self {
        Self {
            recover_interrupted_runs: config.recover_interrupted_runs,
            ..Self::new(runs)
        }
    }

    /// Close runs a previous process left open; true when the task should fire now
    async fn recover_unfinished(&self, task: &dyn ScheduledTask) -> Result<bool, SchedulerError> {
        let key = task.key();
        let unfinished = self.runs.find_unfinished(key.as_str()).await?;
        if unfinished.is_empty() {
            return Ok(false);
        }

        for run in &unfinished {
            warn!(
                task = %key,
                run_id = %run.run_id,
                started_at = %run.started_at,
                "Found unfinished run from a previous process, marking abandoned"
            );
            self.runs.mark_abandoned(run.run_id).await?;
        }

        Ok(self.recover_interrupted_runs && task.recoverable())
    }
}

#[async_trait]
impl TaskScheduler for LocalScheduler {
    async fn schedule(&self, task: Arc<dyn ScheduledTask>, trigger: Trigger) -> Result<(), SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }

        let key = task.key();
        if self.entries.read().await.contains_key(&key) {
            return Err(SchedulerError::AlreadyRegistered(key));
        }

        let recover = self.recover_unfinished(task.as_ref()).await?;
        if recover {
            info!(task = %key, "Re-firing task after unfinished run");
        }

        let fire_immediately = recover || trigger.runs_on_start();
        info!(task = %key, trigger = %trigger, run_on_start = trigger.runs_on_start(), "Scheduled task");

        let entry = TaskEntry::new();
        let worker = TaskLoop {
            key: key.clone(),
            task,
            trigger,
            entry: entry.shared(),
            runs: self.runs.clone(),
            shutdown: self.shutdown.clone(),
        };

        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&key) {
                return Err(SchedulerError::AlreadyRegistered(key));
            }
            entries.insert(key.clone(), entry);
        }

        let handle = tokio::spawn(worker.run(fire_immediately));
        self.handles.lock().await.push(handle);
        Ok(())
    }

    async fn trigger_now(&self, key: &TaskKey) -> Result<(), SchedulerError> {
        let entries = self.entries.read().await;
        let entry = entries.get(key).ok_or_else(|| SchedulerError::UnknownTask(key.clone()))?;
        debug!(task = %key, "Manual trigger");
        entry.trigger.notify_one();
        Ok(())
    }

    async fn interrupt(&self, key: &TaskKey) -> Result<bool, SchedulerError> {
        let entries = self.entries.read().await;
        let entry = entries.get(key).ok_or_else(|| SchedulerError::UnknownTask(key.clone()))?;

        match entry.current_run() {
            Some(token) => {
                info!(task = %key, "Interrupt requested");
                token.cancel();
                entry.status.update(|status| {
                    if status.state == TaskState::Running {
                        status.state = TaskState::Interrupting;
                    }
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn status(&self, key: &TaskKey) -> Option<TaskStatus> {
        self.entries.read().await.get(key).map(|entry| entry.status.snapshot())
    }

    async fn shutdown(&self) {
        info!("Shutting down scheduler");
        // Run tokens are children of this one
        self.shutdown.cancel();

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Task loop ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}

/// Wakes a task loop when its trigger is due
enum Ticker {
    Interval(Interval),
    Cron {
        trigger: Trigger,
        /// Wall clock at `anchor`; fire times are mapped onto the tokio clock from here
        anchor_wall: DateTime<Utc>,
        anchor: Instant,
        fire_now: bool,
    },
}

impl Ticker {
    fn new(trigger: &Trigger, fire_immediately: bool) -> Self {
        match trigger {
            Trigger::Every { period, .. } => {
                let first = if fire_immediately {
                    Instant::now()
                } else {
                    Instant::now() + *period
                };
                let mut interval = interval_at(first, *period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Self::Interval(interval)
            }
            Trigger::Cron { .. } => Self::Cron {
                trigger: trigger.clone(),
                anchor_wall: Utc::now(),
                anchor: Instant::now(),
                fire_now: fire_immediately,
            },
        }
    }

    /// Cancel safe: a dropped wait is recomputed on the next call
    async fn tick(&mut self) {
        match self {
            Self::Interval(interval) => {
                interval.tick().await;
            }
            Self::Cron {
                trigger,
                anchor_wall,
                anchor,
                fire_now,
            } => {
                if std::mem::take(fire_now) {
                    return;
                }
                let elapsed = chrono::Duration::from_std(anchor.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
                let now = *anchor_wall + elapsed;
                match trigger.next_after(now) {
                    Some(next) => {
                        let offset = (next - *anchor_wall).to_std().unwrap_or_default();
                        sleep_until(*anchor + offset).await;
                    }
                    None => {
                        warn!(trigger = %trigger, "Cron schedule has no upcoming fire time");
                        std::future::pending::<()>().await;
                    }
                }
            }
        }
    }
}

struct TaskLoop {
    key: TaskKey,
    task: Arc<dyn ScheduledTask>,
    trigger: Trigger,
    entry: TaskEntry,
    runs: Arc<dyn TaskRunRepository>,
    shutdown: CancellationToken,
}

impl TaskLoop {
    async fn run(self, fire_immediately: bool) {
        let mut ticker = Ticker::new(&self.trigger, fire_immediately);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(task = %self.key, "Task loop shutting down");
                    break;
                }
                _ = ticker.tick() => {}
                _ = self.entry.trigger.notified() => {}
            }

            self.run_once().await;
        }
    }

    async fn run_once(&self) {
        let run_id = match self.runs.record_start(self.key.as_str()).await {
            Ok(run_id) => Some(run_id),
            Err(e) => {
                warn!(task = %self.key, "Failed to record run start: {}", e);
                None
            }
        };

        let cancel = self.shutdown.child_token();
        self.entry.set_current_run(Some(cancel.clone()));
        self.entry.status.update(|status| {
            status.state = TaskState::Running;
            status.progress = None;
            status.message = None;
            status.last_started = Some(Utc::now());
        });

        info!(task = %self.key, "Task run started");
        let started = Instant::now();
        let ctx = TaskContext::new(self.key.clone(), cancel, self.entry.status.clone());

        let outcome = match AssertUnwindSafe(self.task.execute(&ctx)).catch_unwind().await {
            Ok(Ok(())) => TaskOutcome::Succeeded,
            Ok(Err(TaskError::Interrupted)) => {
                info!(task = %self.key, "Task run interrupted");
                TaskOutcome::Interrupted
            }
            Ok(Err(e)) => {
                error!(task = %self.key, "Task run failed: {}", e);
                e.outcome()
            }
            Err(_) => {
                error!(task = %self.key, "Task run panicked");
                TaskOutcome::Failed
            }
        };

        self.entry.set_current_run(None);
        self.entry.status.update(|status| {
            status.state = TaskState::Idle;
            status.last_finished = Some(Utc::now());
            status.last_outcome = Some(outcome);
            status.runs += 1;
        });
        info!(
            task = %self.key,
            outcome = outcome.as_str(),
            elapsed = ?started.elapsed(),
            "Task run finished"
        );

        if let Some(run_id) = run_id {
            if let Err(e) = self.runs.record_finish(run_id, outcome).await {
                warn!(task = %self.key, run_id = %run_id, "Failed to record run finish: {}", e);
            }
        }
    }
}
