// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the task arena and the dependency relation.
//! - [`task_info`] provides task nodes, their state machine and the scheduled
//!   task type handed to executors.
//! - [`selector`] contains the batch selection policies.
//! - [`scheduler`] runs the batch loop over the ready frontier.
//! - [`state_manager`] manages per-run state (ready/running/finished sets).
//! - [`scheduler_step`] defines batch records and the run report.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod selector;
pub mod state_manager;
pub mod task_info;

pub use graph::{Chain, Dag};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use scheduler_step::{BatchRecord, ExecutionReport};
pub use selector::{AllSelector, MaxConcurrencySelector, Selector, DEFAULT_MAX_CONCURRENCY};
pub use task_info::{DeclaredInput, ScheduledTask, TaskNode, TaskState};
