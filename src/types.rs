use std::str::FromStr;
use serde::Deserialize;

/// Canonical task identity type used throughout the crate.
pub type TaskId = String;

/// What happens to the descendants of a task that finished as `FAILED`.
///
/// - `Continue`: a failed task is still "finished", so its children become
///   ready once all their parents are terminal. A child that reads the failed
///   parent's handle gets `TaskError::UpstreamFailed` and decides for itself
///   (default behaviour).
/// - `SkipDescendants`: every descendant of the failed task is marked `FAILED`
///   with `UpstreamFailed` and is never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    Continue,
    SkipDescendants,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Continue
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "skip_descendants" | "skip" => Ok(FailurePolicy::SkipDescendants),
            other => Err(format!(
                "invalid failure_policy: {other} (expected \"continue\" or \"skip_descendants\")"
            )),
        }
    }
}

/// Kind of operator a configured task is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// One unit of work over the whole input.
    Call,
    /// One unit of work per input entry (or per array element).
    Map,
    /// Map units followed by a single reducer unit.
    MapReduce,
}

impl Default for TaskKind {
    fn default() -> Self {
        TaskKind::Call
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "call" => Ok(TaskKind::Call),
            "map" => Ok(TaskKind::Map),
            "map_reduce" | "mapreduce" => Ok(TaskKind::MapReduce),
            other => Err(format!(
                "invalid task kind: {other} (expected \"call\", \"map\" or \"map_reduce\")"
            )),
        }
    }
}
