// src/config/validate.rs

use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DagError, Result};
use crate::types::TaskKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let batch_timeout = match raw.config.batch_timeout.as_deref() {
            Some(s) => Some(parse_duration(s).map_err(DagError::ConfigError)?),
            None => None,
        };
        Ok(ConfigFile::new_unchecked(raw.config, raw.task, batch_timeout))
    }
}

/// Run every check against a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_tasks(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    // failure_policy is strongly typed and validated during deserialization.

    if cfg.config.max_concurrency == 0 {
        return Err(DagError::ConfigError(
            "[config].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.workers == Some(0) {
        return Err(DagError::ConfigError(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(ref timeout) = cfg.config.batch_timeout {
        parse_duration(timeout)
            .map_err(|e| DagError::ConfigError(format!("[config].batch_timeout: {e}")))?;
    }

    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.cmd.trim().is_empty() {
            return Err(DagError::ConfigError(format!(
                "task '{}' has an empty `cmd`",
                name
            )));
        }

        match (task.kind, &task.reduce_cmd) {
            (TaskKind::MapReduce, None) => {
                return Err(DagError::ConfigError(format!(
                    "task '{}' is map_reduce but has no `reduce_cmd`",
                    name
                )));
            }
            (TaskKind::Call | TaskKind::Map, Some(_)) => {
                return Err(DagError::ConfigError(format!(
                    "task '{}' sets `reduce_cmd` but is not map_reduce",
                    name
                )));
            }
            _ => {}
        }

        if task.input.is_some() && !task.after.is_empty() {
            return Err(DagError::ConfigError(format!(
                "task '{}' declares `input` but has dependencies; only root tasks take declared input",
                name
            )));
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(DagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(DagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(DagError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                node
            )))
        }
    }
}

/// Parse durations like `"500ms"`, `"3s"`, `"2m"`, `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{}' is missing a unit suffix", s))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
