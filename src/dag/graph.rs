// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::task_info::{TaskNode, TaskState};
use crate::errors::{DagError, Result};
use crate::types::TaskId;

/// In-memory DAG of tasks keyed by identity.
///
/// Nodes live in an arena (`nodes`) and refer to each other by id. Iteration
/// follows insertion order so that derived views (roots, leaves) and the
/// scheduler's initial ready set are deterministic.
///
/// Acyclicity is not checked on every insertion; [`Dag::validate`] does a
/// topological sort and is run when a scheduler is built.
#[derive(Debug)]
pub struct Dag {
    id: String,
    order: Vec<TaskId>,
    nodes: HashMap<TaskId, TaskNode>,
}

impl Dag {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            order: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Insert a task. Fails if a task with the same id already exists.
    pub fn add_task(&mut self, task: TaskNode) -> Result<()> {
        if self.nodes.contains_key(task.id()) {
            return Err(DagError::DuplicateTask {
                dag: self.id.clone(),
                task: task.id().to_string(),
            });
        }
        debug!(dag = %self.id, task = %task.id(), "adding task");
        self.order.push(task.id().to_string());
        self.nodes.insert(task.id().to_string(), task);
        Ok(())
    }

    /// Insert several tasks in order.
    ///
    /// Fail-fast: on a duplicate, tasks inserted before it stay in the DAG and
    /// the remaining ones are dropped.
    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = TaskNode>) -> Result<()> {
        for task in tasks {
            self.add_task(task)?;
        }
        Ok(())
    }

    /// Declare that `parent` must finish before `child` may start.
    ///
    /// Sets both sides of the relation. Adding an existing edge is a no-op.
    pub fn add_dependency(&mut self, parent: &str, child: &str) -> Result<()> {
        if parent == child {
            return Err(DagError::SelfDependency(child.to_string()));
        }
        for name in [parent, child] {
            if !self.nodes.contains_key(name) {
                return Err(DagError::TaskNotFound(name.to_string()));
            }
        }

        if let Some(node) = self.nodes.get_mut(parent) {
            node.push_child(child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.push_parent(parent);
        }
        Ok(())
    }

    /// Start a chain of dependency declarations at `id`.
    ///
    /// ```ignore
    /// dag.chain("A")?.then("B")?.fan_out(["C", "D"])?.then("E")?;
    /// ```
    pub fn chain(&mut self, id: &str) -> Result<Chain<'_>> {
        if !self.nodes.contains_key(id) {
            return Err(DagError::TaskNotFound(id.to_string()));
        }
        Ok(Chain {
            dag: self,
            tails: vec![id.to_string()],
        })
    }

    pub fn task(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub(crate) fn task_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// All task ids in insertion order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate parents of a task.
    pub fn parents_of(&self, id: &str) -> &[TaskId] {
        self.nodes.get(id).map(|n| n.parents()).unwrap_or(&[])
    }

    /// Immediate children of a task.
    pub fn children_of(&self, id: &str) -> &[TaskId] {
        self.nodes.get(id).map(|n| n.children()).unwrap_or(&[])
    }

    /// Tasks without parents, in insertion order.
    pub fn root_tasks(&self) -> Vec<&str> {
        self.tasks()
            .filter(|t| t.parents().is_empty())
            .map(|t| t.id())
            .collect()
    }

    /// Tasks without children, in insertion order.
    pub fn leaf_tasks(&self) -> Vec<&str> {
        self.tasks()
            .filter(|t| t.children().is_empty())
            .map(|t| t.id())
            .collect()
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.nodes.get(id).map(|n| n.state())
    }

    /// A topological order of all tasks (parents before children).
    ///
    /// Fails with [`DagError::DagCycle`] if the graph has a cycle.
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        // Edge direction: parent -> child.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for id in self.task_ids() {
            graph.add_node(id);
        }
        for node in self.tasks() {
            for child in node.children() {
                graph.add_edge(node.id(), child.as_str(), ());
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            DagError::DagCycle(format!(
                "cycle detected in DAG '{}' involving task '{}'",
                self.id,
                cycle.node_id()
            ))
        })
    }

    /// Check that the DAG is acyclic.
    pub fn validate(&self) -> Result<()> {
        self.topological_order().map(|_| ())
    }
}

/// Cursor for declaring dependencies fluently.
///
/// Holds the "downstream" task(s) of the last step; each method links them
/// and moves the cursor.
#[derive(Debug)]
pub struct Chain<'a> {
    dag: &'a mut Dag,
    tails: Vec<TaskId>,
}

impl<'a> Chain<'a> {
    /// Every current task precedes `id`; the cursor moves to `id`.
    pub fn then(self, id: &str) -> Result<Chain<'a>> {
        self.fan_out([id])
    }

    /// Every current task precedes each of `ids`; the cursor moves to `ids`.
    pub fn fan_out<I, S>(self, ids: I) -> Result<Chain<'a>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next: Vec<TaskId> = ids.into_iter().map(|s| s.as_ref().to_string()).collect();
        for parent in &self.tails {
            for child in &next {
                self.dag.add_dependency(parent, child)?;
            }
        }
        Ok(Chain {
            dag: self.dag,
            tails: next,
        })
    }

    /// Each of `parents` precedes every current task; the cursor stays.
    pub fn after<I, S>(self, parents: I) -> Result<Chain<'a>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for parent in parents {
            for child in &self.tails {
                self.dag.add_dependency(parent.as_ref(), child)?;
            }
        }
        Ok(self)
    }

    /// Tasks the cursor currently points at.
    pub fn tails(&self) -> &[TaskId] {
        &self.tails
    }
}
