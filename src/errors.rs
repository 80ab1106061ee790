// src/errors.rs

//! Crate-wide error types.
//!
//! - [`DagError`] covers graph construction, configuration and scheduler
//!   programming errors. These abort a run (or prevent it from starting).
//! - [`TaskError`] is the failure of a single unit of work. It never aborts a
//!   run; it is carried inside the task's handle in the result table.

use std::time::Duration;

use thiserror::Error;

use crate::dag::TaskState;

#[derive(Error, Debug)]
pub enum DagError {
    #[error("Duplicate task: a task with id '{task}' already exists in DAG '{dag}'")]
    DuplicateTask { dag: String, task: String },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error(
        "Scheduling deadlock: selector admitted no task while {ready} task(s) are ready and none are running"
    )]
    SchedulingDeadlock { ready: usize },

    #[error("Invalid state transition for task '{task}': {from:?} -> {to:?}")]
    InvalidTransition {
        task: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("Scheduler has already executed its DAG")]
    AlreadyExecuted,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of a single unit of work.
///
/// Cloneable so that one failed handle can be read by several children.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("upstream task '{task}' failed: {reason}")]
    UpstreamFailed { task: String, reason: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("worker exited without reporting a result")]
    Abandoned,
}

impl TaskError {
    /// Convenience constructor for [`TaskError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::Failed(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagError>;
