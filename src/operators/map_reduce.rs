// src/operators/map_reduce.rs

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::exec::WorkerPool;
use crate::future::{Inputs, Outcome, TaskFuture};
use crate::operators::map::{MapItem, MapOperator};
use crate::operators::{Job, Operator};
use crate::types::TaskKind;

type ReduceFn = Arc<dyn Fn(Vec<Value>) -> Job + Send + Sync>;

/// Fan-out like [`MapOperator`], then one reducer unit over the map results
/// in submission order.
#[derive(Clone)]
pub struct MapReduceOperator {
    map: MapOperator,
    reduce: ReduceFn,
}

impl MapReduceOperator {
    pub fn new<M, MFut, R, RFut>(map: M, reduce: R) -> Self
    where
        M: Fn(MapItem) -> MFut + Send + Sync + 'static,
        MFut: Future<Output = Outcome> + Send + 'static,
        R: Fn(Vec<Value>) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            map: MapOperator::new(map),
            reduce: Arc::new(move |values| Box::pin(reduce(values))),
        }
    }
}

impl Operator for MapReduceOperator {
    fn kind(&self) -> TaskKind {
        TaskKind::MapReduce
    }

    fn invoke(&self, task: &str, inputs: Inputs, pool: &dyn WorkerPool) -> TaskFuture {
        let jobs = MapOperator::jobs(self.map.item_fn(), inputs);
        let reduce = Arc::clone(&self.reduce);
        TaskFuture::Unit(pool.map_reduce(task, jobs, Box::new(move |values| reduce(values))))
    }
}
