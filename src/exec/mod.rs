// src/exec/mod.rs

//! Execution layer.
//!
//! - [`pool`] provides the [`WorkerPool`] capability and the Tokio-backed
//!   [`TokioPool`] that operators submit their units to.
//! - [`backend`] provides the `ExecutorBackend` trait the scheduler dispatches
//!   batches through, and the default [`LocalExecutor`].
//! - [`command`] runs shell commands as units of work.

pub mod backend;
pub mod command;
pub mod pool;

pub use backend::{BatchResults, ExecutorBackend, LocalExecutor};
pub use command::run_command;
pub use pool::{Reducer, TokioPool, WorkerPool};
