// src/exec/pool.rs

//! Worker pool capability used by operators.
//!
//! Operators never spawn work themselves; they hand [`Job`]s to a
//! [`WorkerPool`] and get [`UnitHandle`]s back. [`TokioPool`] is the default
//! implementation: every job is a Tokio task, and a semaphore bounds how many
//! jobs execute at the same time.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, warn, Instrument};

use crate::errors::TaskError;
use crate::future::{Outcome, UnitHandle, UnitCompleter};
use crate::operators::Job;

/// Final step of a map-reduce, fed the map results in submission order.
pub type Reducer = Box<dyn FnOnce(Vec<Value>) -> Job + Send>;

/// Submit / map / map-reduce capability.
pub trait WorkerPool: Send + Sync {
    /// Start one unit of work for `task`.
    fn submit(&self, task: &str, job: Job) -> UnitHandle;

    /// Start one unit per job; handles are in submission order.
    fn map(&self, task: &str, jobs: Vec<Job>) -> Vec<UnitHandle> {
        jobs.into_iter().map(|job| self.submit(task, job)).collect()
    }

    /// Start the map units, then a reducer over their results.
    ///
    /// The returned handle fails with the first failed map unit (in
    /// submission order) without running the reducer.
    fn map_reduce(&self, task: &str, jobs: Vec<Job>, reducer: Reducer) -> UnitHandle;

    /// Stop every unit started so far, queued or executing. Their handles
    /// resolve as [`TaskError::Cancelled`]; units submitted afterwards run
    /// normally.
    fn abort(&self) {}
}

/// Default worker pool backed by the Tokio runtime.
///
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct TokioPool {
    permits: Arc<Semaphore>,
    /// Cancelled by [`WorkerPool::abort`] and then replaced.
    scope: Arc<Mutex<CancellationToken>>,
    workers: usize,
}

impl fmt::Debug for TokioPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioPool")
            .field("workers", &self.workers)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl TokioPool {
    /// Create a pool where at most `workers` jobs execute concurrently.
    ///
    /// A value of 0 is treated as 1.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            scope: Arc::new(Mutex::new(CancellationToken::new())),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Refuse new work. Jobs still waiting for a worker resolve as
    /// [`TaskError::Cancelled`]; jobs already executing run to completion.
    pub fn close(&self) {
        self.permits.close();
    }

    fn current_scope(&self) -> CancellationToken {
        self.scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `job` once a worker is free and report the outcome.
    ///
    /// Cancelling `scope` drops the job wherever it is, releasing its worker.
    async fn run_with_permit(
        permits: Arc<Semaphore>,
        scope: CancellationToken,
        job: Job,
        completer: UnitCompleter,
    ) {
        let work = async move {
            match permits.acquire_owned().await {
                Ok(_permit) => job.await,
                Err(_) => Err(TaskError::Cancelled),
            }
        };
        let outcome: Outcome = tokio::select! {
            _ = scope.cancelled() => Err(TaskError::Cancelled),
            outcome = work => outcome,
        };
        if let Err(err) = &outcome {
            debug!(error = %err, "unit failed");
        }
        completer.complete(outcome);
    }
}

impl WorkerPool for TokioPool {
    fn submit(&self, task: &str, job: Job) -> UnitHandle {
        let (completer, handle) = UnitHandle::pending();
        let permits = Arc::clone(&self.permits);
        let scope = self.current_scope();
        let span = debug_span!("unit", task = %task);

        tokio::spawn(Self::run_with_permit(permits, scope, job, completer).instrument(span));
        handle
    }

    fn map_reduce(&self, task: &str, jobs: Vec<Job>, reducer: Reducer) -> UnitHandle {
        let mapped = self.map(task, jobs);
        let (completer, handle) = UnitHandle::pending();
        let permits = Arc::clone(&self.permits);
        let scope = self.current_scope();
        let span = debug_span!("reduce", task = %task, items = mapped.len());

        // The reducer only takes a worker once every mapper has finished, so
        // it never holds a permit the mappers are waiting for.
        tokio::spawn(
            async move {
                let mut values = Vec::with_capacity(mapped.len());
                for unit in &mapped {
                    match unit.result().await {
                        Ok(value) => values.push(value),
                        Err(err) => {
                            completer.complete(Err(err));
                            return;
                        }
                    }
                }
                Self::run_with_permit(permits, scope, reducer(values), completer).await;
            }
            .instrument(span),
        );
        handle
    }

    fn abort(&self) {
        let mut scope = self.scope.lock().unwrap_or_else(PoisonError::into_inner);
        warn!(workers = self.workers, "aborting in-flight units");
        scope.cancel();
        *scope = CancellationToken::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn bounds_concurrent_jobs() {
        let pool = TokioPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..6)
            .map(|i| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                Box::pin(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(json!(i))
                }) as Job
            })
            .collect();

        let handles = pool.map("bounded", jobs);
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(handle.result().await, Ok(json!(i)));
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn closed_pool_cancels_waiting_jobs() {
        let pool = TokioPool::new(1);
        pool.close();
        let job: Job = Box::pin(async { Ok::<_, TaskError>(json!(1)) });
        let handle = pool.submit("late", job);
        assert_eq!(handle.result().await, Err(TaskError::Cancelled));
    }

    #[tokio::test]
    async fn abort_stops_running_and_queued_jobs() {
        let pool = TokioPool::new(1);
        let ran = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..2)
            .map(|_| {
                let ran = Arc::clone(&ran);
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(json!(null))
                }) as Job
            })
            .collect();
        let handles = pool.map("stuck", jobs);

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.abort();
        for handle in &handles {
            assert_eq!(handle.result().await, Err(TaskError::Cancelled));
        }

        // The worker is free again and later work is unaffected.
        let job: Job = Box::pin(async { Ok::<_, TaskError>(json!("fresh")) });
        assert_eq!(pool.submit("fresh", job).result().await, Ok(json!("fresh")));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_job_is_abandoned() {
        let pool = TokioPool::new(1);
        let job: Job = Box::pin(async {
            let explode = true;
            if explode {
                panic!("boom");
            }
            Ok::<_, TaskError>(json!(null))
        });
        let handle = pool.submit("panics", job);
        assert_eq!(handle.result().await, Err(TaskError::Abandoned));
    }
}
