// src/future.rs

//! Execution handles.
//!
//! A [`UnitHandle`] is the waitable result of one unit of work. It is backed by
//! a `tokio::sync::watch` channel so it can be cloned freely: the same handle
//! sits in the result table and in the inputs of every child.
//!
//! A [`TaskFuture`] is what a task produces. It wraps exactly one of:
//! - a single unit of work,
//! - an ordered collection of units (fan-out),
//! - a value that is already available.
//!
//! [`Inputs`] is the keyed bundle of handles a task is invoked with.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::watch;

use crate::errors::TaskError;

/// Result of one unit of work.
pub type Outcome = std::result::Result<Value, TaskError>;

/// Key under which a root task's single raw input is presented.
pub const ROOT_INPUT_KEY: &str = "input";

/// Waitable, cloneable handle to a single unit of work.
#[derive(Debug, Clone)]
pub struct UnitHandle {
    rx: watch::Receiver<Option<Outcome>>,
}

/// Write side of a [`UnitHandle`]. Consumed on completion.
///
/// Dropping it without calling [`UnitCompleter::complete`] resolves the
/// handle as [`TaskError::Abandoned`].
#[derive(Debug)]
pub struct UnitCompleter {
    tx: watch::Sender<Option<Outcome>>,
}

impl UnitCompleter {
    pub fn complete(self, outcome: Outcome) {
        self.tx.send_replace(Some(outcome));
    }
}

impl UnitHandle {
    /// Create an unresolved handle together with its completer.
    pub fn pending() -> (UnitCompleter, UnitHandle) {
        let (tx, rx) = watch::channel(None);
        (UnitCompleter { tx }, UnitHandle { rx })
    }

    /// Create a handle that is already resolved.
    pub fn resolved(outcome: Outcome) -> Self {
        let (_tx, rx) = watch::channel(Some(outcome));
        UnitHandle { rx }
    }

    /// Wait until the unit resolves and return its outcome.
    pub async fn result(&self) -> Outcome {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(TaskError::Abandoned))
    }

    /// Outcome if already known, without waiting.
    pub fn peek(&self) -> Option<Outcome> {
        if let Some(outcome) = self.rx.borrow().clone() {
            return Some(outcome);
        }
        if self.rx.has_changed().is_err() {
            // Completer dropped without reporting.
            return Some(Err(TaskError::Abandoned));
        }
        None
    }

    pub fn is_resolved(&self) -> bool {
        self.peek().is_some()
    }

    /// Whether the unit is known to have failed.
    pub fn failed(&self) -> bool {
        matches!(self.peek(), Some(Err(_)))
    }
}

/// Handle to everything a task produced.
#[derive(Debug, Clone)]
pub enum TaskFuture {
    /// One unit of work.
    Unit(UnitHandle),
    /// Fan-out: results are aggregated in submission order.
    Collection(Vec<UnitHandle>),
    /// Immediately available value. Never blocks, never fails.
    Value(Value),
}

impl TaskFuture {
    /// A handle that is already resolved as failed.
    pub fn rejected(err: TaskError) -> Self {
        TaskFuture::Unit(UnitHandle::resolved(Err(err)))
    }

    /// Wait for the produced value.
    ///
    /// For a collection this is a JSON array in submission order; the first
    /// failed constituent (in that order) is returned as the error.
    pub async fn result(&self) -> Outcome {
        match self {
            TaskFuture::Unit(handle) => handle.result().await,
            TaskFuture::Collection(handles) => {
                let mut values = Vec::with_capacity(handles.len());
                for handle in handles {
                    values.push(handle.result().await?);
                }
                Ok(Value::Array(values))
            }
            TaskFuture::Value(value) => Ok(value.clone()),
        }
    }

    /// Wait until every constituent has resolved, ignoring outcomes.
    pub async fn wait(&self) {
        match self {
            TaskFuture::Unit(handle) => {
                let _ = handle.result().await;
            }
            TaskFuture::Collection(handles) => {
                for handle in handles {
                    let _ = handle.result().await;
                }
            }
            TaskFuture::Value(_) => {}
        }
    }

    /// Whether any constituent is known to have failed.
    pub fn failed(&self) -> bool {
        match self {
            TaskFuture::Unit(handle) => handle.failed(),
            TaskFuture::Collection(handles) => handles.iter().any(UnitHandle::failed),
            TaskFuture::Value(_) => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        match self {
            TaskFuture::Unit(handle) => handle.is_resolved(),
            TaskFuture::Collection(handles) => handles.iter().all(UnitHandle::is_resolved),
            TaskFuture::Value(_) => true,
        }
    }

    /// Outcome if already known, without waiting.
    ///
    /// A collection reports its first known failure as soon as one exists,
    /// even while other constituents are still running.
    pub fn peek(&self) -> Option<Outcome> {
        match self {
            TaskFuture::Unit(handle) => handle.peek(),
            TaskFuture::Collection(handles) => {
                let mut values = Vec::with_capacity(handles.len());
                let mut pending = false;
                for handle in handles {
                    match handle.peek() {
                        Some(Ok(value)) => values.push(value),
                        Some(Err(err)) => return Some(Err(err)),
                        None => pending = true,
                    }
                }
                if pending { None } else { Some(Ok(Value::Array(values))) }
            }
            TaskFuture::Value(value) => Some(Ok(value.clone())),
        }
    }

    /// The error, if this future resolved as failed.
    pub fn error(&self) -> Option<TaskError> {
        match self.peek() {
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }
}

impl From<Value> for TaskFuture {
    fn from(value: Value) -> Self {
        TaskFuture::Value(value)
    }
}

/// Keyed handles a task is invoked with.
///
/// For a task with parents the keys are the parent ids; for a root task they
/// come from its declared input.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    entries: BTreeMap<String, TaskFuture>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, future: TaskFuture) {
        self.entries.insert(key.into(), future);
    }

    pub fn get(&self, key: &str) -> Option<&TaskFuture> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskFuture)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve every entry.
    ///
    /// Reading a failed entry yields [`TaskError::UpstreamFailed`] naming the
    /// entry key.
    pub async fn values(&self) -> std::result::Result<BTreeMap<String, Value>, TaskError> {
        let mut out = BTreeMap::new();
        for (key, future) in &self.entries {
            let value = future
                .result()
                .await
                .map_err(|err| TaskError::UpstreamFailed {
                    task: key.clone(),
                    reason: err.to_string(),
                })?;
            out.insert(key.clone(), value);
        }
        Ok(out)
    }

    /// Resolve into a single JSON payload.
    ///
    /// - no entries: `null`
    /// - one entry: that entry's value
    /// - several entries: an object keyed by entry key
    pub async fn payload(&self) -> Outcome {
        let mut values = self.values().await?;
        match values.len() {
            0 => Ok(Value::Null),
            1 => Ok(values.pop_first().map(|(_, v)| v).unwrap_or(Value::Null)),
            _ => Ok(Value::Object(values.into_iter().collect())),
        }
    }
}

impl FromIterator<(String, TaskFuture)> for Inputs {
    fn from_iter<I: IntoIterator<Item = (String, TaskFuture)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Inputs {
    type Item = (String, TaskFuture);
    type IntoIter = std::collections::btree_map::IntoIter<String, TaskFuture>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn value_future_never_fails() {
        let fut = TaskFuture::from(json!(3));
        assert!(fut.is_resolved());
        assert!(!fut.failed());
        assert_eq!(fut.result().await, Ok(json!(3)));
    }

    #[tokio::test]
    async fn unit_resolves_after_completion() {
        let (completer, handle) = UnitHandle::pending();
        assert!(!handle.is_resolved());
        assert!(!handle.failed());

        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.result().await }
        });
        completer.complete(Ok(json!("done")));

        assert_eq!(waiter.await.unwrap(), Ok(json!("done")));
        assert!(handle.is_resolved());
    }

    #[tokio::test]
    async fn dropped_completer_is_abandoned() {
        let (completer, handle) = UnitHandle::pending();
        drop(completer);
        assert!(handle.failed());
        assert_eq!(handle.result().await, Err(TaskError::Abandoned));
    }

    #[tokio::test]
    async fn collection_keeps_submission_order_and_reports_any_failure() {
        let ok = TaskFuture::Collection(vec![
            UnitHandle::resolved(Ok(json!(1))),
            UnitHandle::resolved(Ok(json!(2))),
        ]);
        assert_eq!(ok.result().await, Ok(json!([1, 2])));
        assert!(!ok.failed());

        let (_pending_completer, pending) = UnitHandle::pending();
        let mixed = TaskFuture::Collection(vec![
            pending,
            UnitHandle::resolved(Err(TaskError::failed("boom"))),
        ]);
        // Known failure is visible before the other member resolves.
        assert!(mixed.failed());
        assert!(!mixed.is_resolved());
        assert_eq!(mixed.peek(), Some(Err(TaskError::failed("boom"))));
    }

    #[tokio::test]
    async fn payload_shapes() {
        let empty = Inputs::new();
        assert_eq!(empty.payload().await, Ok(Value::Null));

        let mut single = Inputs::new();
        single.insert("a", json!(1).into());
        assert_eq!(single.payload().await, Ok(json!(1)));

        let mut many = Inputs::new();
        many.insert("a", json!(1).into());
        many.insert("b", json!(2).into());
        assert_eq!(many.payload().await, Ok(json!({"a": 1, "b": 2})));
    }

    #[tokio::test]
    async fn reading_failed_entry_names_upstream() {
        let mut inputs = Inputs::new();
        inputs.insert("parent", TaskFuture::rejected(TaskError::failed("exit 1")));

        match inputs.values().await {
            Err(TaskError::UpstreamFailed { task, reason }) => {
                assert_eq!(task, "parent");
                assert!(reason.contains("exit 1"));
            }
            other => panic!("expected UpstreamFailed, got {other:?}"),
        }
    }
}
