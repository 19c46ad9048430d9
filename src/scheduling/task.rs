//! Scheduled task contract
//!
//! A task is identified by a [`TaskKey`] and executed with a [`TaskContext`]
//! through which it reports progress and observes interruption requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::TaskOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// When a scheduled task fires
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fixed period between starts; ticks missed while a run is in progress are skipped
    Every { period: Duration, run_on_start: bool },
    /// Cron expression evaluated in UTC, seconds field first (`0 0 * * * *` is hourly).
    /// Fire times that pass while a run is in progress are skipped.
    Cron {
        expression: String,
        schedule: Box<Schedule>,
        run_on_start: bool,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid cron expression '{expression}': {message}")]
pub struct InvalidCronExpression {
    pub expression: String,
    pub message: String,
}

impl Trigger {
    pub fn every(period: Duration) -> Self {
        Self::Every {
            period,
            run_on_start: false,
        }
    }

    pub fn hourly() -> Self {
        Self::every(Duration::from_secs(60 * 60))
    }

    pub fn cron(expression: &str) -> Result<Self, InvalidCronExpression> {
        let schedule = Schedule::from_str(expression).map_err(|e| InvalidCronExpression {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::Cron {
            expression: expression.to_string(),
            schedule: Box::new(schedule),
            run_on_start: false,
        })
    }

    pub fn with_run_on_start(self, run_on_start: bool) -> Self {
        match self {
            Self::Every { period, .. } => Self::Every { period, run_on_start },
            Self::Cron {
                expression, schedule, ..
            } => Self::Cron {
                expression,
                schedule,
                run_on_start,
            },
        }
    }

    pub fn runs_on_start(&self) -> bool {
        match self {
            Self::Every { run_on_start, .. } | Self::Cron { run_on_start, .. } => *run_on_start,
        }
    }

    /// First fire time strictly after `after`; `None` when the schedule is exhausted
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Every { period, .. } => chrono::Duration::from_std(*period).ok().map(|period| after + period),
            Self::Cron { schedule, .. } => schedule.after(&after).next(),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every { period, .. } => write!(f, "every {period:?}"),
            Self::Cron { expression, .. } => write!(f, "cron '{expression}'"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task was interrupted")]
    Interrupted,

    #[error("Task failed: {0}")]
    Failed(#[from] anyhow::Error),
}

impl TaskError {
    pub fn outcome(&self) -> TaskOutcome {
        match self {
            Self::Interrupted => TaskOutcome::Interrupted,
            Self::Failed(_) => TaskOutcome::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Interrupting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub current: usize,
    pub total: usize,
}

/// Snapshot of a task as seen by the scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub progress: Option<TaskProgress>,
    pub message: Option<String>,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_outcome: Option<TaskOutcome>,
    pub runs: u64,
}

/// Receives progress updates of a running task
pub trait ProgressReporter: Send + Sync {
    fn set_progress(&self, current: usize, total: usize);
    fn set_message(&self, message: &str);
}

/// Shared, lock-protected [`TaskStatus`] updated by the scheduler and the running task
#[derive(Debug, Default)]
pub struct StatusCell {
    status: Mutex<TaskStatus>,
}

impl StatusCell {
    pub fn snapshot(&self) -> TaskStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut TaskStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }
}

impl ProgressReporter for StatusCell {
    fn set_progress(&self, current: usize, total: usize) {
        self.update(|status| status.progress = Some(TaskProgress { current, total }));
    }

    fn set_message(&self, message: &str) {
        self.update(|status| status.message = Some(message.to_string()));
    }
}

/// Reporter that only logs, used for one-off runs outside the scheduler
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReporter;

impl ProgressReporter for LoggingReporter {
    fn set_progress(&self, current: usize, total: usize) {
        info!("Progress: {}/{}", current, total);
    }

    fn set_message(&self, message: &str) {
        info!("{}", message);
    }
}

/// Handle a running task uses to report and to observe interruption
pub struct TaskContext {
    key: TaskKey,
    cancel: CancellationToken,
    reporter: Arc<dyn ProgressReporter>,
}

impl TaskContext {
    pub fn new(key: TaskKey, cancel: CancellationToken, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { key, cancel, reporter }
    }

    /// Context for a run nobody can interrupt except through `cancel`
    pub fn detached(key: TaskKey, cancel: CancellationToken) -> Self {
        Self::new(key, cancel, Arc::new(LoggingReporter))
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn set_progress(&self, current: usize, total: usize) {
        self.reporter.set_progress(current, total);
    }

    pub fn set_message(&self, message: impl AsRef<str>) {
        self.reporter.set_message(message.as_ref());
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(TaskError::Interrupted)` once an interrupt has been requested
    pub fn check_for_interrupt(&self) -> Result<(), TaskError> {
        if self.is_interrupted() {
            Err(TaskError::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn key(&self) -> TaskKey;

    /// Whether a run the process never finished should be re-fired on startup
    fn recoverable(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError>;
}
