// src/operators/map.rs

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::exec::WorkerPool;
use crate::future::{Inputs, Outcome, TaskFuture};
use crate::operators::{Job, Operator};
use crate::types::TaskKind;

type ItemFn = Arc<dyn Fn(MapItem) -> Job + Send + Sync>;

/// One element of a fan-out.
#[derive(Debug, Clone)]
pub struct MapItem {
    /// Input key the item came from (a parent id for non-root tasks).
    pub source: String,
    /// Position of the item in the fan-out.
    pub index: usize,
    pub value: TaskFuture,
}

/// Submits one unit of work per input item.
///
/// Items are the input entries in key order. When the task has exactly one
/// input entry and it has already resolved to a JSON array, the array
/// elements are the items instead.
#[derive(Clone)]
pub struct MapOperator {
    func: ItemFn,
}

impl MapOperator {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(MapItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            func: Arc::new(move |item| Box::pin(func(item))),
        }
    }

    pub(crate) fn jobs(func: &ItemFn, inputs: Inputs) -> Vec<Job> {
        split_items(inputs).into_iter().map(|item| func(item)).collect()
    }

    pub(crate) fn item_fn(&self) -> &ItemFn {
        &self.func
    }
}

/// Split inputs into fan-out items.
pub(crate) fn split_items(inputs: Inputs) -> Vec<MapItem> {
    if inputs.len() == 1 {
        if let Some((source, future)) = inputs.iter().next() {
            if let Some(Ok(Value::Array(elements))) = future.peek() {
                return elements
                    .into_iter()
                    .enumerate()
                    .map(|(index, value)| MapItem {
                        source: source.to_string(),
                        index,
                        value: TaskFuture::Value(value),
                    })
                    .collect();
            }
        }
    }

    inputs
        .into_iter()
        .enumerate()
        .map(|(index, (source, value))| MapItem {
            source,
            index,
            value,
        })
        .collect()
}

impl Operator for MapOperator {
    fn kind(&self) -> TaskKind {
        TaskKind::Map
    }

    fn invoke(&self, task: &str, inputs: Inputs, pool: &dyn WorkerPool) -> TaskFuture {
        TaskFuture::Collection(pool.map(task, Self::jobs(&self.func, inputs)))
    }
}
