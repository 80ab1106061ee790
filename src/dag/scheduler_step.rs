// src/dag/scheduler_step.rs

//! Per-batch records and the final report of a run.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::dag::task_info::TaskState;
use crate::future::{Outcome, TaskFuture};
use crate::types::TaskId;

/// What happened in one batch.
///
/// Useful for tests that want to assert on the exact batch sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchRecord {
    /// Zero-based batch number.
    pub index: usize,
    /// Members in the order the selector returned them.
    pub tasks: Vec<TaskId>,
    pub succeeded: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    /// Descendants failed without running (skip-descendants policy).
    pub skipped: Vec<TaskId>,
    /// Tasks that became ready because of this batch.
    pub newly_ready: Vec<TaskId>,
    /// The batch hit the configured timeout.
    pub timed_out: bool,
}

impl BatchRecord {
    pub fn new(index: usize, tasks: Vec<TaskId>) -> Self {
        Self {
            index,
            tasks,
            ..Self::default()
        }
    }
}

/// Result of [`Scheduler::execute`](crate::dag::Scheduler::execute).
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub dag_id: String,
    /// Result handle of every task that finished (ran or was failed without
    /// running).
    pub results: BTreeMap<TaskId, TaskFuture>,
    /// Final state of every task.
    pub states: BTreeMap<TaskId, TaskState>,
    pub batches: Vec<BatchRecord>,
}

impl ExecutionReport {
    pub fn result(&self, task: &str) -> Option<&TaskFuture> {
        self.results.get(task)
    }

    pub fn state(&self, task: &str) -> Option<TaskState> {
        self.states.get(task).copied()
    }

    pub fn succeeded(&self) -> bool {
        self.states.values().all(|s| *s == TaskState::Success)
    }

    pub fn failed_tasks(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, s)| **s == TaskState::Failed)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Batch members, in execution order.
    pub fn batch_tasks(&self) -> Vec<Vec<&str>> {
        self.batches
            .iter()
            .map(|b| b.tasks.iter().map(String::as_str).collect())
            .collect()
    }

    /// Resolve every result into a JSON table:
    /// `{ "<task>": { "state": ..., "value": ... | "error": ... } }`.
    pub async fn to_json(&self) -> Value {
        let mut table = Map::new();
        for (id, state) in &self.states {
            let mut entry = Map::new();
            entry.insert("state".into(), json!(state));
            if let Some(future) = self.results.get(id) {
                let outcome: Outcome = future.result().await;
                match outcome {
                    Ok(value) => entry.insert("value".into(), value),
                    Err(err) => entry.insert("error".into(), Value::String(err.to_string())),
                };
            }
            table.insert(id.clone(), Value::Object(entry));
        }
        Value::Object(table)
    }
}
