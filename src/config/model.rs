// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::dag::selector::DEFAULT_MAX_CONCURRENCY;
use crate::types::{FailurePolicy, TaskKind};

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// max_concurrency = 4
/// failure_policy = "skip_descendants"
///
/// [task.fetch]
/// cmd = "curl -s https://example.com/items.json"
///
/// [task.count]
/// cmd = "jq length"
/// after = ["fetch"]
/// ```
///
/// Use [`ConfigFile::try_from`] to validate it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All tasks from `[task.<name>]`.
    ///
    /// Keys are the task ids (e.g. `"A"`, `"fetch"`).
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>`, so holders can rely on
/// the graph being acyclic and every field being in range.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
    batch_timeout: Option<Duration>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        task: BTreeMap<String, TaskConfig>,
        batch_timeout: Option<Duration>,
    ) -> Self {
        Self {
            config,
            task,
            batch_timeout,
        }
    }

    /// Parsed `[config].batch_timeout`.
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout
    }

    /// Worker pool size: `[config].workers`, or `max_concurrency` if unset.
    pub fn workers(&self) -> usize {
        self.config.workers.unwrap_or(self.config.max_concurrency)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Upper bound on the size of a batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Units of work allowed to execute at once across the whole pool.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Duration string such as `"30s"` or `"500ms"`.
    #[serde(default)]
    pub batch_timeout: Option<String>,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            workers: None,
            failure_policy: FailurePolicy::default(),
            batch_timeout: None,
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub kind: TaskKind,

    /// The command to execute (the per-item command for `map` and
    /// `map_reduce`).
    pub cmd: String,

    /// Reducer command; only for `map_reduce`.
    #[serde(default)]
    pub reduce_cmd: Option<String>,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Declared input of a root task. A table becomes keyed inputs; any other
    /// value is presented as a single input.
    #[serde(default)]
    pub input: Option<Value>,
}
