// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The scheduler hands each batch to an `ExecutorBackend` and waits for the
//! returned future. This keeps the scheduler independent of how work is
//! actually run and makes it easy to swap in a fake executor in tests.
//!
//! - [`LocalExecutor`] is the default implementation. It invokes every
//!   scheduled task's operator against a [`WorkerPool`] and resolves once all
//!   handles in the batch are resolved.
//!   Dropping that future before it resolves (a batch timeout) aborts the
//!   batch's units on the pool.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were dispatched in which batch.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info_span};

use crate::dag::ScheduledTask;
use crate::errors::Result;
use crate::exec::pool::{TokioPool, WorkerPool};
use crate::future::TaskFuture;
use crate::types::TaskId;

/// Handles produced by one batch, keyed by task id.
pub type BatchResults = HashMap<TaskId, TaskFuture>;

/// Trait abstracting how a batch of scheduled tasks is executed.
pub trait ExecutorBackend: Send {
    /// Run every task in `tasks` and resolve once all of their handles are
    /// resolved.
    ///
    /// An `Err` means the backend itself broke down; the scheduler then marks
    /// every member of the batch as failed and carries on.
    fn run_batch(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<BatchResults>> + Send + '_>>;
}

/// Default executor: runs operators on a worker pool in this process.
#[derive(Clone)]
pub struct LocalExecutor {
    pool: Arc<dyn WorkerPool>,
}

impl fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalExecutor").finish_non_exhaustive()
    }
}

impl LocalExecutor {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self { pool }
    }

    /// Executor over a fresh [`TokioPool`] with `workers` permits.
    pub fn with_workers(workers: usize) -> Self {
        Self::new(Arc::new(TokioPool::new(workers)))
    }

    pub fn pool(&self) -> &Arc<dyn WorkerPool> {
        &self.pool
    }
}

/// Aborts the pool unless the batch ran to completion.
struct AbortOnDrop {
    pool: Arc<dyn WorkerPool>,
    armed: bool,
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.pool.abort();
        }
    }
}

impl ExecutorBackend for LocalExecutor {
    fn run_batch(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<BatchResults>> + Send + '_>> {
        let pool = Arc::clone(&self.pool);

        Box::pin(async move {
            let mut guard = AbortOnDrop {
                pool: Arc::clone(&pool),
                armed: true,
            };
            let mut handles = BatchResults::with_capacity(tasks.len());

            // Start everything first so the batch members run concurrently.
            for task in tasks {
                let span = info_span!("task", task = %task.id, batch = task.batch);
                let future = span.in_scope(|| {
                    debug!(kind = ?task.operator.kind(), "invoking operator");
                    task.operator.invoke(&task.id, task.inputs, pool.as_ref())
                });
                handles.insert(task.id, future);
            }

            for future in handles.values() {
                future.wait().await;
            }
            guard.armed = false;
            Ok(handles)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TaskError;
    use crate::future::Inputs;
    use crate::operators::CallOperator;
    use serde_json::json;
    use std::time::Duration;

    fn scheduled(id: &str, delay_ms: u64) -> ScheduledTask {
        let op = CallOperator::new(move |_inputs: Inputs| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok::<_, TaskError>(json!(delay_ms))
        });
        ScheduledTask {
            id: id.to_string(),
            operator: Arc::new(op),
            inputs: Inputs::new(),
            batch: 0,
        }
    }

    #[tokio::test]
    async fn batch_resolves_every_handle() {
        let mut exec = LocalExecutor::with_workers(4);
        let results = exec
            .run_batch(vec![scheduled("slow", 30), scheduled("fast", 1)])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.values().all(TaskFuture::is_resolved));
        assert_eq!(results["slow"].result().await, Ok(json!(30)));
    }

    #[tokio::test]
    async fn dropped_batch_frees_the_worker() {
        let mut exec = LocalExecutor::with_workers(1);
        let slow = exec.run_batch(vec![scheduled("slow", 10_000)]);
        assert!(tokio::time::timeout(Duration::from_millis(20), slow).await.is_err());

        let results = exec.run_batch(vec![scheduled("next", 1)]).await.unwrap();
        assert_eq!(results["next"].result().await, Ok(json!(1)));
    }

    #[tokio::test]
    async fn empty_batch_is_fine() {
        let mut exec = LocalExecutor::with_workers(1);
        assert!(exec.run_batch(Vec::new()).await.unwrap().is_empty());
    }
}
