use std::io::Write;

use dagbatch::config::{load_and_validate, load_from_path, ConfigFile};
use dagbatch::dag::{Scheduler, TaskState};
use dagbatch::errors::DagError;
use dagbatch::exec::LocalExecutor;
use dagbatch::types::{FailurePolicy, TaskKind};
use serde_json::json;
use tempfile::NamedTempFile;

use dagbatch_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use dagbatch_test_utils::init_tracing;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_a_full_config() {
    let file = write_config(
        r#"
[config]
max_concurrency = 2
workers = 3
failure_policy = "skip_descendants"
batch_timeout = "1m"

[task.fetch]
cmd = "echo '[1, 2, 3]'"

[task.square]
kind = "map"
cmd = "read n; echo $((n * n))"
after = ["fetch"]
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.config.max_concurrency, 2);
    assert_eq!(cfg.workers(), 3);
    assert_eq!(cfg.config.failure_policy, FailurePolicy::SkipDescendants);
    assert_eq!(cfg.batch_timeout(), Some(std::time::Duration::from_secs(60)));
    assert_eq!(cfg.task["square"].kind, TaskKind::Map);
    assert_eq!(cfg.task["square"].after, vec!["fetch".to_string()]);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_from_path("/definitely/not/here/Dagbatch.toml").unwrap_err();
    assert!(matches!(err, DagError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = write_config("[task.a\ncmd = 1");
    assert!(matches!(load_from_path(file.path()), Err(DagError::TomlError(_))));
}

#[test]
fn unknown_kind_is_rejected_on_load() {
    let file = write_config("[task.a]\nkind = \"fan\"\ncmd = \"true\"\n");
    assert!(matches!(load_and_validate(file.path()), Err(DagError::TomlError(_))));
}

#[test]
fn cycles_are_rejected_on_load() {
    let file = write_config(
        "[task.a]\ncmd = \"true\"\nafter = [\"c\"]\n\
         [task.b]\ncmd = \"true\"\nafter = [\"a\"]\n\
         [task.c]\ncmd = \"true\"\nafter = [\"b\"]\n",
    );
    match load_and_validate(file.path()) {
        Err(DagError::DagCycle(msg)) => assert!(msg.contains("cycle detected")),
        other => panic!("expected DagCycle, got {other:?}"),
    }
}

#[test]
fn builder_rejects_unknown_dependency() {
    let raw = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new("true").after("ghost").build())
        .build_raw();
    match ConfigFile::try_from(raw) {
        Err(DagError::ConfigError(msg)) => assert!(msg.contains("ghost")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn builder_rejects_zero_concurrency() {
    let raw = ConfigFileBuilder::new()
        .with_max_concurrency(0)
        .with_task("a", TaskConfigBuilder::new("true").build())
        .build_raw();
    assert!(matches!(ConfigFile::try_from(raw), Err(DagError::ConfigError(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn runs_shell_commands_end_to_end() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_max_concurrency(2)
        .with_task("numbers", TaskConfigBuilder::new("echo '[1, 2, 3]'").build())
        .with_task(
            "squares",
            TaskConfigBuilder::new("read n; echo $((n * n))")
                .kind(TaskKind::Map)
                .after("numbers")
                .build(),
        )
        .with_task(
            "total",
            TaskConfigBuilder::new("read n; echo $((n + 1))")
                .kind(TaskKind::MapReduce)
                .reduce_cmd("tr -cd '0-9,' | tr ',' '\\n' | awk '{ s += $1 } END { print s }'")
                .after("numbers")
                .build(),
        )
        .with_task(
            "greeting",
            TaskConfigBuilder::new("cat").input(json!("hello")).build(),
        )
        .build();

    let dag = cfg.build_dag("e2e").unwrap();
    let mut scheduler = Scheduler::new(
        dag,
        LocalExecutor::with_workers(cfg.workers()),
        cfg.scheduler_config(),
    )
    .unwrap();
    let report = scheduler.execute().await.unwrap();

    assert_eq!(report.result("numbers").unwrap().result().await, Ok(json!([1, 2, 3])));
    assert_eq!(report.result("squares").unwrap().result().await, Ok(json!([1, 4, 9])));
    // (1+1) + (2+1) + (3+1)
    assert_eq!(report.result("total").unwrap().result().await, Ok(json!(9)));
    assert_eq!(report.result("greeting").unwrap().result().await, Ok(json!("hello")));
    assert!(report.succeeded());
}

#[cfg(unix)]
#[tokio::test]
async fn failing_command_is_reported_not_raised() {
    let cfg = ConfigFileBuilder::new()
        .with_failure_policy(FailurePolicy::SkipDescendants)
        .with_task("boom", TaskConfigBuilder::new("exit 4").build())
        .with_task("after", TaskConfigBuilder::new("cat").after("boom").build())
        .build();

    let mut scheduler = Scheduler::new(
        cfg.build_dag("fail").unwrap(),
        LocalExecutor::with_workers(1),
        cfg.scheduler_config(),
    )
    .unwrap();
    let report = scheduler.execute().await.unwrap();

    assert_eq!(report.state("boom"), Some(TaskState::Failed));
    assert_eq!(report.state("after"), Some(TaskState::Failed));
    let err = report.result("boom").unwrap().error().unwrap();
    assert!(err.to_string().contains("status 4"));
}
