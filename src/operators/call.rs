// src/operators/call.rs

use std::future::Future;
use std::sync::Arc;

use crate::exec::WorkerPool;
use crate::future::{Inputs, Outcome, TaskFuture};
use crate::operators::{Job, Operator};
use crate::types::TaskKind;

type CallFn = Arc<dyn Fn(Inputs) -> Job + Send + Sync>;

/// Submits a single unit of work that receives all of the task's inputs.
#[derive(Clone)]
pub struct CallOperator {
    func: CallFn,
}

impl CallOperator {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Inputs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            func: Arc::new(move |inputs| Box::pin(func(inputs))),
        }
    }
}

impl Operator for CallOperator {
    fn kind(&self) -> TaskKind {
        TaskKind::Call
    }

    fn invoke(&self, task: &str, inputs: Inputs, pool: &dyn WorkerPool) -> TaskFuture {
        TaskFuture::Unit(pool.submit(task, (self.func)(inputs)))
    }
}
