// src/operators/mod.rs

//! Task behaviour.
//!
//! Every task carries an [`Operator`]: a named computation with one
//! invocation contract ("given resolved inputs, start the work and hand back
//! a [`TaskFuture`]"). The scheduler only ever talks to this trait.
//!
//! - [`call`]: one unit of work over the whole input.
//! - [`map`]: fan-out, one unit per input item.
//! - [`map_reduce`]: fan-out followed by a single reducer unit.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::exec::WorkerPool;
use crate::future::{Inputs, Outcome, TaskFuture};
use crate::types::TaskKind;

pub mod call;
pub mod map;
pub mod map_reduce;

pub use call::CallOperator;
pub use map::{MapItem, MapOperator};
pub use map_reduce::MapReduceOperator;

/// Boxed, sendable future used for units of work.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// One unit of work, ready to be submitted to a [`WorkerPool`].
pub type Job = BoxFuture<Outcome>;

/// Capability every task kind implements.
pub trait Operator: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Start the task's work on `pool` and return a handle to it.
    ///
    /// Must not block: the returned future resolves as the work completes.
    fn invoke(&self, task: &str, inputs: Inputs, pool: &dyn WorkerPool) -> TaskFuture;
}

impl fmt::Debug for dyn Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}
