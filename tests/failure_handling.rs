use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dagbatch::dag::{Dag, Scheduler, SchedulerConfig, TaskNode, TaskState};
use dagbatch::errors::TaskError;
use dagbatch::future::Inputs;
use dagbatch::operators::CallOperator;
use dagbatch::types::FailurePolicy;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use dagbatch_test_utils::builders::{echo_task, failing_task, sleep_task, strict_task};
use dagbatch_test_utils::{init_tracing, with_timeout, RecordingExecutor};

/// bad -> child -> grandchild, plus an independent `other` root.
fn failing_branch() -> Dag {
    let mut dag = Dag::new("failing");
    dag.add_tasks([
        failing_task("bad", "exit 1"),
        strict_task("child"),
        echo_task("grandchild"),
        echo_task("other"),
    ])
    .unwrap();
    dag.chain("bad").unwrap().then("child").unwrap().then("grandchild").unwrap();
    dag
}

#[tokio::test]
async fn continue_policy_runs_children_and_they_see_the_failure() {
    init_tracing();

    let exec = RecordingExecutor::new(2);
    let recording = exec.recording();
    let mut scheduler = Scheduler::new(failing_branch(), exec, SchedulerConfig::default()).unwrap();
    let report = with_timeout(scheduler.execute()).await.unwrap();

    assert_eq!(report.state("bad"), Some(TaskState::Failed));
    assert_eq!(report.state("other"), Some(TaskState::Success));

    // The child was dispatched and failed when it read its parent.
    assert!(recording.lock().unwrap().dispatched().contains(&"child".to_string()));
    match report.result("child").unwrap().error() {
        Some(TaskError::UpstreamFailed { task, reason }) => {
            assert_eq!(task, "bad");
            assert!(reason.contains("exit 1"));
        }
        other => panic!("expected UpstreamFailed, got {other:?}"),
    }

    // The grandchild ignores its inputs, so it still succeeds.
    assert_eq!(report.state("grandchild"), Some(TaskState::Success));
    assert_eq!(report.results.len(), 4);
}

#[tokio::test]
async fn skip_policy_never_dispatches_descendants() {
    init_tracing();

    let exec = RecordingExecutor::new(2);
    let recording = exec.recording();
    let config = SchedulerConfig::default().with_failure_policy(FailurePolicy::SkipDescendants);
    let mut scheduler = Scheduler::new(failing_branch(), exec, config).unwrap();
    let report = scheduler.execute().await.unwrap();

    let dispatched = recording.lock().unwrap().dispatched();
    assert!(!dispatched.contains(&"child".to_string()));
    assert!(!dispatched.contains(&"grandchild".to_string()));

    assert_eq!(report.state("child"), Some(TaskState::Failed));
    assert_eq!(report.state("grandchild"), Some(TaskState::Failed));
    assert_eq!(report.state("other"), Some(TaskState::Success));
    assert!(matches!(
        report.result("grandchild").unwrap().error(),
        Some(TaskError::UpstreamFailed { ref task, .. }) if task == "bad"
    ));

    let mut skipped = report.batches[0].skipped.clone();
    skipped.sort();
    assert_eq!(skipped, vec!["child", "grandchild"]);
}

#[tokio::test]
async fn forced_failure_is_isolated_to_its_task() {
    let mut dag = Dag::new("pair");
    dag.add_tasks([echo_task("a"), echo_task("b")]).unwrap();

    let exec = RecordingExecutor::new(2).fail("a");
    let mut scheduler = Scheduler::new(dag, exec, SchedulerConfig::default()).unwrap();
    let report = scheduler.execute().await.unwrap();

    assert_eq!(report.failed_tasks(), vec!["a"]);
    assert_eq!(report.state("b"), Some(TaskState::Success));
    assert_eq!(report.batches[0].failed, vec!["a".to_string()]);
}

#[tokio::test]
async fn backend_error_fails_the_batch_and_run_continues() {
    init_tracing();

    let mut dag = Dag::new("broken");
    dag.add_tasks([echo_task("a"), echo_task("b")]).unwrap();
    dag.add_dependency("a", "b").unwrap();

    let exec = RecordingExecutor::new(1).break_on("a");
    let mut scheduler = Scheduler::new(dag, exec, SchedulerConfig::default()).unwrap();
    let report = scheduler.execute().await.unwrap();

    assert_eq!(report.state("a"), Some(TaskState::Failed));
    let err = report.result("a").unwrap().error().unwrap();
    assert!(err.to_string().contains("backend unavailable"));
    // Default policy: the child still runs.
    assert_eq!(report.state("b"), Some(TaskState::Success));
}

#[tokio::test]
async fn batch_timeout_fails_only_that_batch() {
    init_tracing();

    let mut dag = Dag::new("slow");
    dag.add_tasks([sleep_task("slow", Duration::from_secs(10)), echo_task("next")])
        .unwrap();
    dag.add_dependency("slow", "next").unwrap();

    let config = SchedulerConfig::default().with_batch_timeout(Duration::from_millis(50));
    let mut scheduler = Scheduler::new(dag, RecordingExecutor::new(1), config).unwrap();
    let report = with_timeout(scheduler.execute()).await.unwrap();

    assert!(report.batches[0].timed_out);
    assert!(!report.batches[1].timed_out);
    assert_eq!(
        report.result("slow").unwrap().error(),
        Some(TaskError::Timeout(Duration::from_millis(50)))
    );
    assert_eq!(report.state("next"), Some(TaskState::Success));
}

#[tokio::test]
async fn timed_out_batch_leaves_no_work_behind() {
    init_tracing();

    let finished = Arc::new(AtomicUsize::new(0));
    let counting = |id: &str| {
        let finished = Arc::clone(&finished);
        TaskNode::new(
            id,
            CallOperator::new(move |_inputs: Inputs| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(json!("late"))
                }
            }),
        )
    };

    let mut dag = Dag::new("abandoned");
    dag.add_tasks([counting("running"), counting("queued")]).unwrap();

    let config = SchedulerConfig::default().with_batch_timeout(Duration::from_millis(50));
    let mut scheduler = Scheduler::new(dag, RecordingExecutor::new(1), config).unwrap();
    let report = with_timeout(scheduler.execute()).await.unwrap();

    assert_eq!(report.state("running"), Some(TaskState::Failed));
    assert_eq!(report.state("queued"), Some(TaskState::Failed));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_between_batches_fails_the_rest() {
    init_tracing();

    let token = CancellationToken::new();
    let trigger = token.clone();

    let mut dag = Dag::new("cancel");
    dag.add_task(TaskNode::new(
        "first",
        CallOperator::new(move |_inputs: Inputs| {
            let trigger = trigger.clone();
            async move {
                trigger.cancel();
                Ok::<_, TaskError>(json!("done"))
            }
        }),
    ))
    .unwrap();
    dag.add_tasks([echo_task("second"), echo_task("third")]).unwrap();
    dag.chain("first").unwrap().then("second").unwrap().then("third").unwrap();

    let exec = RecordingExecutor::new(1);
    let recording = exec.recording();
    let mut scheduler = Scheduler::new(dag, exec, SchedulerConfig::default())
        .unwrap()
        .with_cancellation(token);
    let report = scheduler.execute().await.unwrap();

    assert_eq!(recording.lock().unwrap().batches.len(), 1);
    assert_eq!(report.state("first"), Some(TaskState::Success));
    assert_eq!(report.state("second"), Some(TaskState::Failed));
    assert_eq!(report.result("third").unwrap().error(), Some(TaskError::Cancelled));
    assert_eq!(report.results.len(), 3);
}

#[tokio::test]
async fn json_table_reports_values_and_errors() {
    let mut dag = Dag::new("table");
    dag.add_tasks([failing_task("bad", "nope"), echo_task("good")]).unwrap();

    let mut scheduler =
        Scheduler::new(dag, RecordingExecutor::new(1), SchedulerConfig::default()).unwrap();
    let report = scheduler.execute().await.unwrap();
    let table = report.to_json().await;

    assert_eq!(table["good"]["state"], json!("success"));
    assert_eq!(table["good"]["value"]["task"], json!("good"));
    assert_eq!(table["bad"]["state"], json!("failed"));
    assert!(table["bad"]["error"].as_str().unwrap().contains("nope"));
}
