// src/config/build.rs

//! Turn a validated [`ConfigFile`] into a runnable [`Dag`] of shell command
//! tasks plus the matching [`SchedulerConfig`].

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::model::{ConfigFile, TaskConfig};
use crate::dag::{Dag, DeclaredInput, SchedulerConfig, TaskNode};
use crate::errors::{Result, TaskError};
use crate::exec::run_command;
use crate::future::Inputs;
use crate::operators::{CallOperator, Job, MapItem, MapOperator, MapReduceOperator, Operator};
use crate::types::TaskKind;

impl ConfigFile {
    /// Build the DAG described by `[task.*]`.
    ///
    /// Tasks are inserted in name order, so roots and the initial ready set
    /// are deterministic.
    pub fn build_dag(&self, id: impl Into<String>) -> Result<Dag> {
        let mut dag = Dag::new(id);

        for (name, tc) in self.task.iter() {
            let mut node = TaskNode::from_arc(name.clone(), command_operator(name, tc));
            if let Some(input) = &tc.input {
                node = node.with_input(declared_input(input));
            }
            dag.add_task(node)?;
        }

        for (name, tc) in self.task.iter() {
            for dep in tc.after.iter() {
                dag.add_dependency(dep, name)?;
            }
        }

        debug!(dag = %dag.id(), tasks = dag.len(), "built DAG from config");
        Ok(dag)
    }

    /// Scheduler knobs from `[config]`.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrency: self.config.max_concurrency,
            failure_policy: self.config.failure_policy,
            batch_timeout: self.batch_timeout(),
        }
    }
}

fn declared_input(input: &Value) -> DeclaredInput {
    match input {
        Value::Object(map) => DeclaredInput::Map(
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        ),
        other => DeclaredInput::Value(other.clone()),
    }
}

fn command_operator(name: &str, tc: &TaskConfig) -> Arc<dyn Operator> {
    let task = name.to_string();
    let cmd = tc.cmd.clone();

    match tc.kind {
        TaskKind::Call => Arc::new(CallOperator::new(move |inputs: Inputs| {
            let (task, cmd) = (task.clone(), cmd.clone());
            async move {
                let payload = inputs.payload().await?;
                run_command(&task, &cmd, &payload).await
            }
        })),
        TaskKind::Map => Arc::new(MapOperator::new(item_command(task, cmd))),
        TaskKind::MapReduce => {
            // Validation guarantees `reduce_cmd` for map_reduce tasks.
            let reduce_cmd = tc.reduce_cmd.clone().unwrap_or_default();
            let reduce_task = task.clone();
            Arc::new(MapReduceOperator::new(
                item_command(task, cmd),
                move |values: Vec<Value>| {
                    let (task, cmd) = (reduce_task.clone(), reduce_cmd.clone());
                    async move { run_command(&task, &cmd, &Value::Array(values)).await }
                },
            ))
        }
    }
}

/// Per-item command: the item's value is the payload.
fn item_command(task: String, cmd: String) -> impl Fn(MapItem) -> Job + Send + Sync + 'static {
    move |item: MapItem| -> Job {
        let (task, cmd) = (task.clone(), cmd.clone());
        Box::pin(async move {
            let value = item
                .value
                .result()
                .await
                .map_err(|err| TaskError::UpstreamFailed {
                    task: item.source.clone(),
                    reason: err.to_string(),
                })?;
            run_command(&task, &cmd, &value).await
        })
    }
}
