// src/dag/selector.rs

//! Batch selection policies.
//!
//! A selector looks at what is running and what is ready and decides which
//! ready tasks to dispatch next. It never mutates scheduler state.

use std::fmt::Debug;

use crate::types::TaskId;

/// Default admission limit for [`MaxConcurrencySelector`].
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

pub trait Selector: Send + Sync + Debug {
    /// Return the subset of `ready` to dispatch now, in dispatch order.
    ///
    /// Ids not in `ready` are ignored by the scheduler. An empty selection
    /// while nothing is running stops the run with a deadlock error.
    fn select(&self, running: &[TaskId], ready: &[TaskId]) -> Vec<TaskId>;
}

/// Dispatch everything that is ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllSelector;

impl Selector for AllSelector {
    fn select(&self, _running: &[TaskId], ready: &[TaskId]) -> Vec<TaskId> {
        ready.to_vec()
    }
}

/// Dispatch at most `limit - running` tasks, taking a prefix of `ready`.
#[derive(Debug, Clone, Copy)]
pub struct MaxConcurrencySelector {
    limit: usize,
}

impl MaxConcurrencySelector {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for MaxConcurrencySelector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

impl Selector for MaxConcurrencySelector {
    fn select(&self, running: &[TaskId], ready: &[TaskId]) -> Vec<TaskId> {
        let room = self.limit.saturating_sub(running.len());
        ready.iter().take(room).cloned().collect()
    }
}
