use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dagbatch::dag::ScheduledTask;
use dagbatch::errors::{DagError, Result, TaskError};
use dagbatch::exec::{BatchResults, ExecutorBackend, LocalExecutor};
use dagbatch::future::TaskFuture;

/// What a [`RecordingExecutor`] observed.
#[derive(Debug, Default, Clone)]
pub struct Recording {
    /// Task ids per dispatched batch, in dispatch order.
    pub batches: Vec<Vec<String>>,
    /// Input keys each task was dispatched with.
    pub inputs: HashMap<String, Vec<String>>,
}

impl Recording {
    pub fn dispatched(&self) -> Vec<String> {
        self.batches.iter().flatten().cloned().collect()
    }

    pub fn batch_of(&self, task: &str) -> Option<usize> {
        self.batches.iter().position(|b| b.iter().any(|t| t == task))
    }

    pub fn largest_batch(&self) -> usize {
        self.batches.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// A fake executor that:
/// - records which tasks were dispatched in which batch
/// - runs them on a real [`LocalExecutor`], except for tasks forced to fail
/// - can delay batches or make the backend itself error out.
pub struct RecordingExecutor {
    inner: LocalExecutor,
    recording: Arc<Mutex<Recording>>,
    forced_failures: HashSet<String>,
    broken_on: HashSet<String>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            inner: LocalExecutor::with_workers(workers),
            recording: Arc::new(Mutex::new(Recording::default())),
            forced_failures: HashSet::new(),
            broken_on: HashSet::new(),
            delay: None,
        }
    }

    /// Resolve `task` as failed instead of running it.
    pub fn fail(mut self, task: &str) -> Self {
        self.forced_failures.insert(task.to_string());
        self
    }

    /// Return a backend error for any batch that contains `task`.
    pub fn break_on(mut self, task: &str) -> Self {
        self.broken_on.insert(task.to_string());
        self
    }

    /// Sleep this long before running each batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared handle to the recording; stays valid after the executor is
    /// moved into a scheduler.
    pub fn recording(&self) -> Arc<Mutex<Recording>> {
        Arc::clone(&self.recording)
    }

    pub fn snapshot(&self) -> Recording {
        self.recording.lock().unwrap().clone()
    }
}

impl ExecutorBackend for RecordingExecutor {
    fn run_batch(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<BatchResults>> + Send + '_>> {
        {
            let mut guard = self.recording.lock().unwrap();
            guard.batches.push(tasks.iter().map(|t| t.id.clone()).collect());
            for t in &tasks {
                guard
                    .inputs
                    .insert(t.id.clone(), t.inputs.keys().map(str::to_string).collect());
            }
        }

        let broken = tasks.iter().any(|t| self.broken_on.contains(&t.id));
        let (forced, runnable): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .partition(|t| self.forced_failures.contains(&t.id));
        let delay = self.delay;
        let inner = &mut self.inner;

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if broken {
                return Err(DagError::Other(anyhow::anyhow!("backend unavailable")));
            }

            let mut results = inner.run_batch(runnable).await?;
            for t in forced {
                results.insert(t.id, TaskFuture::rejected(TaskError::failed("forced failure")));
            }
            Ok::<_, DagError>(results)
        })
    }
}
