#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use dagbatch::config::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
use dagbatch::dag::{Dag, TaskNode};
use dagbatch::errors::TaskError;
use dagbatch::future::Inputs;
use dagbatch::operators::{CallOperator, MapItem, MapOperator, MapReduceOperator};
use dagbatch::types::{FailurePolicy, TaskKind};
use serde_json::{json, Value};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.config.config.max_concurrency = limit;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.config.failure_policy = policy;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: &str) -> Self {
        self.config.config.batch_timeout = Some(timeout.to_string());
        self
    }

    /// The raw config, for tests that want to see validation fail.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                kind: TaskKind::Call,
                cmd: cmd.to_string(),
                reduce_cmd: None,
                after: vec![],
                input: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.task.kind = kind;
        self
    }

    pub fn reduce_cmd(mut self, cmd: &str) -> Self {
        self.task.reduce_cmd = Some(cmd.to_string());
        self
    }

    pub fn input(mut self, value: Value) -> Self {
        self.task.input = Some(value);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

// ---------------------------------------------------------------------------
// Closure-backed tasks for building DAGs in code.
// ---------------------------------------------------------------------------

/// Always produces `value`.
pub fn value_task(id: &str, value: Value) -> TaskNode {
    TaskNode::new(
        id,
        CallOperator::new(move |_inputs: Inputs| {
            let value = value.clone();
            async move { Ok::<_, TaskError>(value) }
        }),
    )
}

/// Produces `{"task": id, "inputs": [sorted input keys]}`.
pub fn echo_task(id: &str) -> TaskNode {
    let name = id.to_string();
    TaskNode::new(
        id,
        CallOperator::new(move |inputs: Inputs| {
            let name = name.clone();
            async move {
                let keys: Vec<String> = inputs.keys().map(str::to_string).collect();
                Ok::<_, TaskError>(json!({ "task": name, "inputs": keys }))
            }
        }),
    )
}

/// Sums every numeric input (arrays are summed element-wise first).
pub fn sum_task(id: &str) -> TaskNode {
    TaskNode::new(
        id,
        CallOperator::new(|inputs: Inputs| async move {
            let values = inputs.values().await?;
            Ok::<_, TaskError>(json!(values.values().map(sum_value).sum::<i64>()))
        }),
    )
}

fn sum_value(value: &Value) -> i64 {
    match value {
        Value::Array(items) => items.iter().map(sum_value).sum(),
        other => other.as_i64().unwrap_or(0),
    }
}

/// Fails with `msg` without reading its inputs.
pub fn failing_task(id: &str, msg: &str) -> TaskNode {
    let msg = msg.to_string();
    TaskNode::new(
        id,
        CallOperator::new(move |_inputs: Inputs| {
            let msg = msg.clone();
            async move { Err::<Value, _>(TaskError::failed(msg)) }
        }),
    )
}

/// Reads every input (so upstream failures surface), then yields `"ok"`.
pub fn strict_task(id: &str) -> TaskNode {
    TaskNode::new(
        id,
        CallOperator::new(|inputs: Inputs| async move {
            inputs.values().await?;
            Ok::<_, TaskError>(json!("ok"))
        }),
    )
}

/// Sleeps for `delay`, then yields its id.
pub fn sleep_task(id: &str, delay: Duration) -> TaskNode {
    let name = id.to_string();
    TaskNode::new(
        id,
        CallOperator::new(move |_inputs: Inputs| {
            let name = name.clone();
            async move {
                tokio::time::sleep(delay).await;
                Ok::<_, TaskError>(json!(name))
            }
        }),
    )
}

/// Doubles every item.
pub fn double_map_task(id: &str) -> TaskNode {
    TaskNode::new(id, MapOperator::new(|item: MapItem| async move { double(item).await }))
}

/// Doubles every item, then sums.
pub fn double_sum_task(id: &str) -> TaskNode {
    TaskNode::new(
        id,
        MapReduceOperator::new(
            |item: MapItem| async move { double(item).await },
            |values: Vec<Value>| async move {
                Ok::<_, TaskError>(json!(values.iter().map(sum_value).sum::<i64>()))
            },
        ),
    )
}

async fn double(item: MapItem) -> Result<Value, TaskError> {
    let value = item.value.result().await?;
    value
        .as_i64()
        .map(|n| json!(n * 2))
        .ok_or_else(|| TaskError::failed(format!("not a number: {value}")))
}

/// `n` echo tasks named `t0..t{n-1}` with edges `t{p} -> t{c}`.
///
/// Edges must point forward (`p < c`) so the result is acyclic.
pub fn layered_dag(n: usize, edges: &[(usize, usize)]) -> Dag {
    let mut dag = Dag::new("layered");
    for i in 0..n {
        dag.add_task(echo_task(&format!("t{i}"))).expect("unique ids");
    }
    for &(p, c) in edges {
        dag.add_dependency(&format!("t{p}"), &format!("t{c}"))
            .expect("known ids");
    }
    dag
}
