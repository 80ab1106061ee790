// src/lib.rs

//! Dependency-graph task scheduler.
//!
//! Tasks form a DAG; the [`Scheduler`](dag::Scheduler) keeps a ready frontier,
//! lets a [`Selector`](dag::Selector) pick each batch, dispatches the batch to
//! an [`ExecutorBackend`](exec::ExecutorBackend) and folds the per-task
//! [`TaskFuture`](future::TaskFuture) handles back in until every task has
//! finished.

pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod future;
pub mod logging;
pub mod operators;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{Dag, Scheduler};
use crate::exec::{LocalExecutor, TokioPool};

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every task succeeded (or `--dry-run`).
    Succeeded,
    /// The run finished but at least one task failed.
    TasksFailed,
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - DAG + scheduler
/// - worker pool + executor
/// - Ctrl-C handling
///
/// The JSON result table is printed to stdout.
pub async fn run(args: CliArgs) -> Result<RunStatus> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config from '{}'", config_path.display()))?;

    let dag = cfg.build_dag(dag_id(&config_path))?;

    if args.dry_run {
        print_dry_run(&cfg, &dag)?;
        return Ok(RunStatus::Succeeded);
    }

    let mut sched_cfg = cfg.scheduler_config();
    if let Some(limit) = args.max_concurrency {
        if limit == 0 {
            bail!("--max-concurrency must be >= 1 (got 0)");
        }
        sched_cfg.max_concurrency = limit;
    }
    let workers = cfg.config.workers.unwrap_or(sched_cfg.max_concurrency);

    let pool = Arc::new(TokioPool::new(workers));
    let executor = LocalExecutor::new(pool.clone());

    // Ctrl-C → stop after the current batch.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; stopping after the current batch");
            cancel.cancel();
        });
    }

    info!(
        max_concurrency = sched_cfg.max_concurrency,
        workers,
        policy = ?sched_cfg.failure_policy,
        "starting dagbatch run"
    );

    let mut scheduler = Scheduler::new(dag, executor, sched_cfg)?.with_cancellation(cancel);
    let report = scheduler.execute().await?;
    pool.close();

    let table = report.to_json().await;
    println!("{}", serde_json::to_string_pretty(&table)?);

    if report.succeeded() {
        Ok(RunStatus::Succeeded)
    } else {
        info!(failed = ?report.failed_tasks(), "run finished with failed tasks");
        Ok(RunStatus::TasksFailed)
    }
}

/// DAG id: the config file stem, e.g. `Dagbatch` for `Dagbatch.toml`.
fn dag_id(config_path: &Path) -> String {
    config_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dagbatch".to_string())
}

/// Dry-run output: tasks, dependencies, roots, leaves and a topological order.
fn print_dry_run(cfg: &ConfigFile, dag: &Dag) -> Result<()> {
    println!("dagbatch dry-run");
    println!("  config.max_concurrency = {}", cfg.config.max_concurrency);
    println!("  config.workers = {}", cfg.workers());
    println!("  config.failure_policy = {:?}", cfg.config.failure_policy);
    if let Some(timeout) = cfg.batch_timeout() {
        println!("  config.batch_timeout = {timeout:?}");
    }
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name} ({:?})", task.kind);
        println!("      cmd: {}", task.cmd);
        if let Some(ref reduce) = task.reduce_cmd {
            println!("      reduce_cmd: {reduce}");
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(ref input) = task.input {
            println!("      input: {input}");
        }
    }
    println!();

    println!("roots: {:?}", dag.root_tasks());
    println!("leaves: {:?}", dag.leaf_tasks());
    println!("order: {:?}", dag.topological_order()?);

    debug!("dry-run complete (no execution)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_id_is_file_stem() {
        assert_eq!(dag_id(Path::new("configs/nightly.toml")), "nightly");
        assert_eq!(dag_id(Path::new("Dagbatch.toml")), "Dagbatch");
    }
}
