//! Task scheduling
//!
//! The [`TaskScheduler`] trait is the seam the application is driven through;
//! [`LocalScheduler`] is the in-process tokio implementation.

pub mod scheduler;
pub mod task;

pub use scheduler::{LocalScheduler, SchedulerError, TaskScheduler};
pub use task::{
    InvalidCronExpression, LoggingReporter, ProgressReporter, ScheduledTask, StatusCell, TaskContext, TaskError,
    TaskKey, TaskProgress, TaskState, TaskStatus, Trigger,
};
