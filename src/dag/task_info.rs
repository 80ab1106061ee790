// src/dag/task_info.rs

//! Task nodes, their state machine, and the dispatch description handed to
//! executors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::errors::{DagError, Result};
use crate::future::{Inputs, TaskFuture, ROOT_INPUT_KEY};
use crate::operators::Operator;
use crate::types::TaskId;

/// Lifecycle of a task within one run.
///
/// ```text
/// None -> Scheduled -> Running -> Success
///                              -> Failed
/// None -> Failed   (skipped: failed ancestor or cancelled run)
/// ```
///
/// `Waiting` is reserved for admission control between `Scheduled` and
/// `Running`; the scheduler does not currently use it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    None,
    Scheduled,
    Waiting,
    Running,
    Success,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failed)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (None, Scheduled)
                | (None, Failed)
                | (Scheduled, Waiting)
                | (Scheduled, Running)
                | (Scheduled, Failed)
                | (Waiting, Running)
                | (Waiting, Failed)
                | (Running, Success)
                | (Running, Failed)
        )
    }
}

/// Input a task was declared with. Only consulted for root tasks; tasks with
/// parents are fed their parents' results instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DeclaredInput {
    /// No input: the task runs with an empty input mapping.
    #[default]
    None,
    /// A single raw value, presented under [`ROOT_INPUT_KEY`].
    Value(Value),
    /// Keyed values.
    Map(BTreeMap<String, Value>),
}

impl DeclaredInput {
    /// Present the declared input as immediately-available handles.
    pub fn to_inputs(&self) -> Inputs {
        match self {
            DeclaredInput::None => Inputs::new(),
            DeclaredInput::Value(value) => {
                let mut inputs = Inputs::new();
                inputs.insert(ROOT_INPUT_KEY, TaskFuture::Value(value.clone()));
                inputs
            }
            DeclaredInput::Map(entries) => entries
                .iter()
                .map(|(k, v)| (k.clone(), TaskFuture::Value(v.clone())))
                .collect(),
        }
    }
}

impl From<Value> for DeclaredInput {
    fn from(value: Value) -> Self {
        DeclaredInput::Value(value)
    }
}

/// A task in the DAG.
///
/// Parent/child links are identities resolved through the owning
/// [`Dag`](crate::dag::Dag); only the DAG sets them, and always on both sides.
pub struct TaskNode {
    id: TaskId,
    operator: Arc<dyn Operator>,
    input: DeclaredInput,
    parents: Vec<TaskId>,
    children: Vec<TaskId>,
    state: TaskState,
    output: Option<TaskFuture>,
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("kind", &self.operator.kind())
            .field("input", &self.input)
            .field("parents", &self.parents)
            .field("children", &self.children)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TaskNode {
    pub fn new(id: impl Into<TaskId>, operator: impl Operator + 'static) -> Self {
        Self::from_arc(id, Arc::new(operator))
    }

    pub fn from_arc(id: impl Into<TaskId>, operator: Arc<dyn Operator>) -> Self {
        Self {
            id: id.into(),
            operator,
            input: DeclaredInput::None,
            parents: Vec::new(),
            children: Vec::new(),
            state: TaskState::None,
            output: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<DeclaredInput>) -> Self {
        self.input = input.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operator(&self) -> &Arc<dyn Operator> {
        &self.operator
    }

    pub fn input(&self) -> &DeclaredInput {
        &self.input
    }

    pub fn parents(&self) -> &[TaskId] {
        &self.parents
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Output handle, set once the task finished successfully.
    pub fn output(&self) -> Option<&TaskFuture> {
        self.output.as_ref()
    }

    pub(crate) fn push_parent(&mut self, parent: &str) -> bool {
        if self.parents.iter().any(|p| p == parent) {
            return false;
        }
        self.parents.push(parent.to_string());
        true
    }

    pub(crate) fn push_child(&mut self, child: &str) -> bool {
        if self.children.iter().any(|c| c == child) {
            return false;
        }
        self.children.push(child.to_string());
        true
    }

    pub(crate) fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(DagError::InvalidTransition {
                task: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn set_output(&mut self, output: TaskFuture) {
        debug_assert!(self.output.is_none(), "task output written twice");
        if self.output.is_none() {
            self.output = Some(output);
        }
    }
}

/// Description of a task the scheduler wants an executor to run now.
#[derive(Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub operator: Arc<dyn Operator>,
    pub inputs: Inputs,
    /// Index of the batch this task was admitted in.
    pub batch: usize,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("kind", &self.operator.kind())
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("batch", &self.batch)
            .finish()
    }
}
