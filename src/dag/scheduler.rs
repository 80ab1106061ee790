// src/dag/scheduler.rs

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::graph::Dag;
use crate::dag::scheduler_step::{BatchRecord, ExecutionReport};
use crate::dag::selector::{MaxConcurrencySelector, Selector, DEFAULT_MAX_CONCURRENCY};
use crate::dag::state_manager::RunState;
use crate::dag::task_info::{ScheduledTask, TaskState};
use crate::errors::{DagError, Result, TaskError};
use crate::exec::{BatchResults, ExecutorBackend};
use crate::future::TaskFuture;
use crate::types::{FailurePolicy, TaskId};

/// Knobs for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Limit used by the default [`MaxConcurrencySelector`].
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Abandon a batch that takes longer than this.
    pub batch_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            failure_policy: FailurePolicy::default(),
            batch_timeout: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }
}

/// Scheduler holds the DAG, the executor backend and the batch policy.
///
/// It is responsible for:
/// - keeping the ready frontier (roots first, then children whose parents
///   have all finished)
/// - asking the selector which ready tasks form the next batch
/// - dispatching each batch to the executor and waiting for it
/// - folding batch results back into task states and the result table
///
/// One batch is in flight at a time. A scheduler runs its DAG once.
#[derive(Debug)]
pub struct Scheduler<E: ExecutorBackend> {
    dag: Dag,
    executor: E,
    selector: Box<dyn Selector>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    executed: bool,
}

impl<E: ExecutorBackend> Scheduler<E> {
    /// Build a scheduler for `dag`. Fails if the DAG has a cycle.
    pub fn new(dag: Dag, executor: E, config: SchedulerConfig) -> Result<Self> {
        dag.validate()?;
        let selector = Box::new(MaxConcurrencySelector::new(config.max_concurrency));
        Ok(Self {
            dag,
            executor,
            selector,
            config,
            cancel: CancellationToken::new(),
            executed: false,
        })
    }

    /// Replace the default max-concurrency selector.
    pub fn with_selector(mut self, selector: impl Selector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    /// Use `token` to stop the run between batches.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.dag.state_of(task)
    }

    /// Run the whole DAG and return the result table.
    ///
    /// Task failures are reported in the table. The only run-time error is
    /// [`DagError::SchedulingDeadlock`]: the selector admitted nothing while
    /// tasks were ready and none were running.
    pub async fn execute(&mut self) -> Result<ExecutionReport> {
        if self.executed {
            return Err(DagError::AlreadyExecuted);
        }
        self.executed = true;

        info!(
            dag = %self.dag.id(),
            tasks = self.dag.len(),
            policy = ?self.config.failure_policy,
            "starting DAG run"
        );

        let mut state = RunState::seed(&self.dag);
        let mut batches = Vec::new();

        while !state.is_done() {
            if self.cancel.is_cancelled() {
                let cancelled = state.fail_unfinished(&mut self.dag, TaskError::Cancelled)?;
                warn!(
                    dag = %self.dag.id(),
                    cancelled = cancelled.len(),
                    "run cancelled; failing unfinished tasks"
                );
                break;
            }

            let selection = self.selector.select(state.running(), state.ready());
            let batch = state.admit(selection);

            if batch.is_empty() {
                // Every batch is awaited to completion, so nothing is running here.
                return Err(DagError::SchedulingDeadlock {
                    ready: state.ready().len(),
                });
            }

            let index = batches.len();
            info!(batch = index, size = batch.len(), tasks = ?batch, "dispatching batch");

            let scheduled = state.begin_batch(&mut self.dag, &batch, index)?;
            let (results, timed_out) = self.dispatch(index, &batch, scheduled).await;

            let mut record =
                state.complete_batch(&mut self.dag, index, &batch, results, self.config.failure_policy)?;
            record.timed_out = timed_out;

            info!(
                batch = index,
                succeeded = record.succeeded.len(),
                failed = record.failed.len(),
                skipped = record.skipped.len(),
                newly_ready = record.newly_ready.len(),
                "batch finished"
            );
            batches.push(record);
        }

        let report = self.report(state, batches);
        info!(
            dag = %report.dag_id,
            batches = report.batches.len(),
            failed = report.failed_tasks().len(),
            "DAG run finished"
        );
        Ok(report)
    }

    /// Hand a batch to the executor, applying the batch timeout.
    ///
    /// Never fails: backend errors and timeouts become failed handles for
    /// every member of the batch. On timeout the executor's future is dropped,
    /// which is how a backend learns to stop the batch's work.
    async fn dispatch(
        &mut self,
        index: usize,
        batch: &[TaskId],
        scheduled: Vec<ScheduledTask>,
    ) -> (BatchResults, bool) {
        let call = self.executor.run_batch(scheduled);

        let outcome = match self.config.batch_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(batch = index, timeout = ?limit, "batch timed out; failing its tasks");
                    return (reject_all(batch, TaskError::Timeout(limit)), true);
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(results) => {
                debug!(batch = index, handles = results.len(), "executor returned");
                (results, false)
            }
            Err(err) => {
                warn!(batch = index, error = %err, "executor backend failed; failing its tasks");
                (reject_all(batch, TaskError::failed(err.to_string())), false)
            }
        }
    }

    fn report(&self, state: RunState, batches: Vec<BatchRecord>) -> ExecutionReport {
        let states: BTreeMap<TaskId, TaskState> = self
            .dag
            .tasks()
            .map(|t| (t.id().to_string(), t.state()))
            .collect();

        ExecutionReport {
            dag_id: self.dag.id().to_string(),
            results: state.into_results(),
            states,
            batches,
        }
    }
}

fn reject_all(batch: &[TaskId], err: TaskError) -> BatchResults {
    batch
        .iter()
        .map(|id| (id.clone(), TaskFuture::rejected(err.clone())))
        .collect::<HashMap<_, _>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::selector::AllSelector;
    use crate::dag::task_info::TaskNode;
    use crate::exec::LocalExecutor;
    use crate::future::Inputs;
    use crate::operators::CallOperator;
    use serde_json::{json, Value};

    fn echo(id: &str) -> TaskNode {
        let name = id.to_string();
        TaskNode::new(
            id,
            CallOperator::new(move |inputs: Inputs| {
                let name = name.clone();
                async move {
                    let mut seen: Vec<String> = inputs.keys().map(str::to_string).collect();
                    seen.sort();
                    Ok::<_, TaskError>(json!({ "task": name, "inputs": seen }))
                }
            }),
        )
    }

    fn scenario() -> Dag {
        let mut dag = Dag::new("scenario");
        dag.add_tasks(["A", "B", "C", "D", "E"].map(echo)).unwrap();
        dag.chain("A")
            .unwrap()
            .then("B")
            .unwrap()
            .fan_out(["C", "D"])
            .unwrap()
            .then("E")
            .unwrap();
        dag
    }

    #[tokio::test]
    async fn scenario_batches_follow_the_frontier() {
        let config = SchedulerConfig::default().with_max_concurrency(2);
        let mut scheduler = Scheduler::new(scenario(), LocalExecutor::with_workers(2), config).unwrap();
        let report = scheduler.execute().await.unwrap();

        assert_eq!(
            report.batch_tasks(),
            vec![vec!["A"], vec!["B"], vec!["C", "D"], vec!["E"]]
        );
        assert_eq!(report.results.len(), 5);
        assert!(report.succeeded());

        let e = report.result("E").unwrap().result().await.unwrap();
        assert_eq!(e["inputs"], json!(["C", "D"]));
    }

    #[tokio::test]
    async fn zero_limit_deadlocks_before_running_anything() {
        let config = SchedulerConfig::default().with_max_concurrency(0);
        let mut scheduler = Scheduler::new(scenario(), LocalExecutor::with_workers(1), config).unwrap();

        match scheduler.execute().await {
            Err(DagError::SchedulingDeadlock { ready }) => assert_eq!(ready, 1),
            other => panic!("expected deadlock, got {other:?}"),
        }
        assert!(scheduler.dag().tasks().all(|t| t.state() == TaskState::None));
    }

    #[tokio::test]
    async fn root_without_input_gets_empty_mapping() {
        let mut dag = Dag::new("single");
        dag.add_task(echo("solo")).unwrap();
        let mut scheduler =
            Scheduler::new(dag, LocalExecutor::with_workers(1), SchedulerConfig::default()).unwrap();

        let report = scheduler.execute().await.unwrap();
        let value = report.result("solo").unwrap().result().await.unwrap();
        assert_eq!(value["inputs"], json!([]));
    }

    #[tokio::test]
    async fn second_execute_is_rejected() {
        let mut scheduler = Scheduler::new(
            scenario(),
            LocalExecutor::with_workers(2),
            SchedulerConfig::default(),
        )
        .unwrap()
        .with_selector(AllSelector);

        scheduler.execute().await.unwrap();
        assert!(matches!(scheduler.execute().await, Err(DagError::AlreadyExecuted)));
    }

    #[tokio::test]
    async fn cyclic_dag_is_rejected_at_construction() {
        let mut dag = Dag::new("cyclic");
        dag.add_tasks(["a", "b"].map(echo)).unwrap();
        dag.add_dependency("a", "b").unwrap();
        dag.add_dependency("b", "a").unwrap();

        let result = Scheduler::new(dag, LocalExecutor::with_workers(1), SchedulerConfig::default());
        assert!(matches!(result, Err(DagError::DagCycle(_))));
    }

    #[tokio::test]
    async fn empty_dag_finishes_immediately() {
        let mut scheduler = Scheduler::new(
            Dag::new("empty"),
            LocalExecutor::with_workers(1),
            SchedulerConfig::default(),
        )
        .unwrap();
        let report = scheduler.execute().await.unwrap();
        assert!(report.results.is_empty());
        assert!(report.batches.is_empty());
    }

    #[tokio::test]
    async fn timed_out_batch_fails_and_run_continues() {
        let mut dag = Dag::new("slow");
        dag.add_task(TaskNode::new(
            "slow",
            CallOperator::new(|_inputs: Inputs| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, TaskError>(Value::Null)
            }),
        ))
        .unwrap();
        dag.add_task(echo("after")).unwrap();
        dag.add_dependency("slow", "after").unwrap();

        let config = SchedulerConfig::default().with_batch_timeout(Duration::from_millis(20));
        let mut scheduler = Scheduler::new(dag, LocalExecutor::with_workers(1), config).unwrap();
        let report = scheduler.execute().await.unwrap();

        assert!(report.batches[0].timed_out);
        assert_eq!(report.state("slow"), Some(TaskState::Failed));
        assert_eq!(
            report.result("slow").unwrap().error(),
            Some(TaskError::Timeout(Duration::from_millis(20)))
        );
        // Default policy: the child still runs.
        assert_eq!(report.state("after"), Some(TaskState::Success));
    }

    #[tokio::test]
    async fn cancelled_token_fails_everything() {
        let token = CancellationToken::new();
        token.cancel();

        let mut scheduler = Scheduler::new(
            scenario(),
            LocalExecutor::with_workers(1),
            SchedulerConfig::default(),
        )
        .unwrap()
        .with_cancellation(token);

        let report = scheduler.execute().await.unwrap();
        assert!(report.batches.is_empty());
        assert_eq!(report.failed_tasks().len(), 5);
        assert_eq!(report.result("A").unwrap().error(), Some(TaskError::Cancelled));
    }
}
