// src/dag/state_manager.rs

//! Per-run scheduling state: the ready frontier, running and finished sets,
//! and the result table.
//!
//! All mutation goes through [`RunState`] and happens on the scheduler's own
//! task between batches.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::dag::graph::Dag;
use crate::dag::scheduler_step::BatchRecord;
use crate::dag::task_info::{ScheduledTask, TaskState};
use crate::errors::{DagError, Result, TaskError};
use crate::future::{Inputs, TaskFuture};
use crate::types::{FailurePolicy, TaskId};

/// Insertion-ordered set of task ids.
///
/// Order is what selectors see, so it must be deterministic; membership must
/// be set-like so a task is never queued twice.
#[derive(Debug, Default, Clone)]
pub struct ReadySet {
    order: Vec<TaskId>,
    members: HashSet<TaskId>,
}

impl ReadySet {
    /// Returns `false` if the task was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.members.insert(id.to_string()) {
            return false;
        }
        self.order.push(id.to_string());
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if !self.members.remove(id) {
            return false;
        }
        self.order.retain(|t| t != id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn as_slice(&self) -> &[TaskId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Mutable state of a single run.
#[derive(Debug, Default)]
pub struct RunState {
    ready: ReadySet,
    running: ReadySet,
    finished: HashSet<TaskId>,
    results: BTreeMap<TaskId, TaskFuture>,
}

impl RunState {
    /// Initial state: every root task is ready.
    pub fn seed(dag: &Dag) -> Self {
        let mut state = RunState::default();
        for root in dag.root_tasks() {
            state.ready.insert(root);
        }
        debug!(ready = ?state.ready.as_slice(), "seeded ready set with root tasks");
        state
    }

    /// Nothing ready and nothing running.
    pub fn is_done(&self) -> bool {
        self.ready.is_empty() && self.running.is_empty()
    }

    pub fn ready(&self) -> &[TaskId] {
        self.ready.as_slice()
    }

    pub fn running(&self) -> &[TaskId] {
        self.running.as_slice()
    }

    /// Keep only the selected ids that are actually ready, without duplicates,
    /// in selector order.
    pub fn admit(&self, selection: Vec<TaskId>) -> Vec<TaskId> {
        let mut seen = HashSet::new();
        selection
            .into_iter()
            .filter(|id| {
                if !self.ready.contains(id) {
                    warn!(task = %id, "selector returned a task that is not ready; ignoring");
                    return false;
                }
                seen.insert(id.clone())
            })
            .collect()
    }

    /// Move a batch from `ready` to `running` and build what the executor
    /// needs for each member.
    ///
    /// Tasks with parents get one input per parent: that parent's result
    /// handle, keyed by the parent id. Root tasks get their declared input.
    pub fn begin_batch(
        &mut self,
        dag: &mut Dag,
        batch: &[TaskId],
        index: usize,
    ) -> Result<Vec<ScheduledTask>> {
        let mut scheduled = Vec::with_capacity(batch.len());

        for id in batch {
            let inputs = self.inputs_for(dag, id);
            let node = dag
                .task_mut(id)
                .ok_or_else(|| DagError::TaskNotFound(id.clone()))?;

            node.transition(TaskState::Scheduled)?;
            debug!(task = %id, batch = index, inputs = inputs.len(), "task scheduled");

            scheduled.push(ScheduledTask {
                id: id.clone(),
                operator: node.operator().clone(),
                inputs,
                batch: index,
            });
        }

        for id in batch {
            self.ready.remove(id);
            self.running.insert(id);
            if let Some(node) = dag.task_mut(id) {
                node.transition(TaskState::Running)?;
            }
        }

        Ok(scheduled)
    }

    fn inputs_for(&self, dag: &Dag, id: &str) -> Inputs {
        let parents = dag.parents_of(id);
        if parents.is_empty() {
            return dag
                .task(id)
                .map(|node| node.input().to_inputs())
                .unwrap_or_default();
        }

        parents
            .iter()
            .map(|parent| {
                let future = self.results.get(parent).cloned().unwrap_or_else(|| {
                    // Cannot happen for a task admitted from `ready`.
                    warn!(task = %id, parent = %parent, "parent has no result; feeding an abandoned handle");
                    TaskFuture::rejected(TaskError::Abandoned)
                });
                (parent.clone(), future)
            })
            .collect()
    }

    /// Fold a completed batch back in: settle each member's state, record
    /// results, apply the failure policy and recompute the frontier.
    pub fn complete_batch(
        &mut self,
        dag: &mut Dag,
        index: usize,
        batch: &[TaskId],
        mut results: HashMap<TaskId, TaskFuture>,
        policy: FailurePolicy,
    ) -> Result<BatchRecord> {
        let mut record = BatchRecord::new(index, batch.to_vec());

        for id in batch {
            let future = results.remove(id).unwrap_or_else(|| {
                warn!(task = %id, "executor returned no handle for task; marking failed");
                TaskFuture::rejected(TaskError::Abandoned)
            });

            let failed = future.failed();
            if let Some(node) = dag.task_mut(id) {
                if failed {
                    node.transition(TaskState::Failed)?;
                } else {
                    node.transition(TaskState::Success)?;
                    node.set_output(future.clone());
                }
            }

            if failed {
                warn!(task = %id, batch = index, error = ?future.error(), "task failed");
                record.failed.push(id.clone());
            } else {
                debug!(task = %id, batch = index, "task succeeded");
                record.succeeded.push(id.clone());
            }

            self.results.insert(id.clone(), future);
            self.running.remove(id);
            self.finished.insert(id.clone());
        }

        for (id, _) in results {
            warn!(task = %id, "executor returned a handle for a task outside the batch; ignoring");
        }

        if policy == FailurePolicy::SkipDescendants {
            for failed in record.failed.clone() {
                let mut skipped = self.mark_descendants_failed(dag, &failed)?;
                record.skipped.append(&mut skipped);
            }
        }

        record.newly_ready = self.unlock_children(dag, batch);
        Ok(record)
    }

    /// Add every child of `finished_now` whose parents have all finished.
    ///
    /// Set semantics: a child already ready, running or finished is left
    /// alone, so a child shared by several members is queued once.
    pub fn unlock_children(&mut self, dag: &Dag, finished_now: &[TaskId]) -> Vec<TaskId> {
        let mut newly_ready = Vec::new();

        for id in finished_now {
            for child in dag.children_of(id) {
                if self.finished.contains(child) || self.running.contains(child) {
                    continue;
                }
                let all_parents_done = dag
                    .parents_of(child)
                    .iter()
                    .all(|p| self.finished.contains(p));
                if all_parents_done && self.ready.insert(child) {
                    debug!(task = %child, "all parents finished; task is ready");
                    newly_ready.push(child.clone());
                }
            }
        }

        newly_ready
    }

    /// Mark every not-yet-started descendant of `failed_task` as `Failed`
    /// with [`TaskError::UpstreamFailed`].
    ///
    /// Returns the newly failed tasks (excluding `failed_task` itself).
    pub fn mark_descendants_failed(&mut self, dag: &mut Dag, failed_task: &str) -> Result<Vec<TaskId>> {
        let reason = self
            .results
            .get(failed_task)
            .and_then(TaskFuture::error)
            .map(|e| e.to_string())
            .unwrap_or_else(|| "failed".to_string());

        let mut stack: Vec<TaskId> = dag.children_of(failed_task).to_vec();
        let mut newly_failed = Vec::new();

        while let Some(id) = stack.pop() {
            if self.finished.contains(&id) || self.running.contains(&id) {
                continue;
            }
            self.ready.remove(&id);

            if let Some(node) = dag.task_mut(&id) {
                node.transition(TaskState::Failed)?;
            }
            debug!(task = %id, upstream = %failed_task, "skipping task due to upstream failure");

            self.results.insert(
                id.clone(),
                TaskFuture::rejected(TaskError::UpstreamFailed {
                    task: failed_task.to_string(),
                    reason: reason.clone(),
                }),
            );
            self.finished.insert(id.clone());
            stack.extend(dag.children_of(&id).iter().cloned());
            newly_failed.push(id);
        }

        Ok(newly_failed)
    }

    /// Fail every task that has not finished (cancelled run).
    pub fn fail_unfinished(&mut self, dag: &mut Dag, err: TaskError) -> Result<Vec<TaskId>> {
        let pending: Vec<TaskId> = dag
            .task_ids()
            .filter(|id| !self.finished.contains(*id))
            .map(|id| id.to_string())
            .collect();

        for id in &pending {
            if let Some(node) = dag.task_mut(id) {
                node.transition(TaskState::Failed)?;
            }
            self.ready.remove(id);
            self.running.remove(id);
            self.results.insert(id.clone(), TaskFuture::rejected(err.clone()));
            self.finished.insert(id.clone());
        }

        Ok(pending)
    }

    pub fn into_results(self) -> BTreeMap<TaskId, TaskFuture> {
        self.results
    }
}
