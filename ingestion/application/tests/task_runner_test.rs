mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{InMemoryTaskRuns, RecordingTransactions, TxEvent};
use media_ingestion_application::tasks::EmptyInput;
use media_ingestion_application::{
    TaskContext, TaskDefinition, TaskError, TaskHandler, TaskRegistry, TaskRunError, TaskRunState,
    TaskRunner, TransactionError,
};
use media_ingestion_domain::{StepStatus, TaskStatus, TaskVisibility};
use serde::Deserialize;
use serde_json::json;

/// Step A commits its transaction, step B fails inside its own one.
struct TwoSteps {
    transactions: Arc<RecordingTransactions>,
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskHandler for TwoSteps {
    type Input = EmptyInput;

    async fn handle(&self, ctx: &TaskContext, _input: EmptyInput) -> Result<(), TaskError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let written = ctx
            .transactional_step("A", self.transactions.as_ref(), |_tx| async {
                Ok::<_, TaskError>(3_u64)
            })
            .await?;
        ctx.metric("a.written", written as f64);

        ctx.transactional_step("B", self.transactions.as_ref(), |_tx| async {
            Err::<(), _>(TaskError::Transaction(TransactionError::Backend(
                "constraint violated".to_string(),
            )))
        })
        .await?;

        ctx.metric("b.written", 1.0);
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LimitInput {
    limit: u32,
}

struct Counting {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskHandler for Counting {
    type Input = LimitInput;

    async fn handle(&self, ctx: &TaskContext, input: LimitInput) -> Result<(), TaskError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        for i in 0..input.limit {
            ctx.step(&format!("count-{}", i), || async { Ok::<_, TaskError>(()) })
                .await?;
            ctx.metric("counted", 1.0);
        }
        Ok(())
    }
}

struct Slow;

#[async_trait]
impl TaskHandler for Slow {
    type Input = EmptyInput;

    async fn handle(&self, ctx: &TaskContext, _input: EmptyInput) -> Result<(), TaskError> {
        ctx.step("fast", || async { Ok::<_, TaskError>(()) }).await?;
        ctx.step("slow", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, TaskError>(())
        })
        .await?;
        Ok(())
    }
}

/// Holds its only step open for `secs` of tokio time.
struct Parked {
    secs: u64,
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskHandler for Parked {
    type Input = EmptyInput;

    async fn handle(&self, ctx: &TaskContext, _input: EmptyInput) -> Result<(), TaskError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let secs = self.secs;
        ctx.step("refresh-manga", || async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            Ok::<_, TaskError>(())
        })
        .await
    }
}

struct Fixture {
    runner: TaskRunner,
    runs: Arc<InMemoryTaskRuns>,
    transactions: Arc<RecordingTransactions>,
    invocations: Arc<AtomicUsize>,
}

fn fixture() -> Fixture {
    let runs = Arc::new(InMemoryTaskRuns::default());
    let transactions = Arc::new(RecordingTransactions::default());
    let invocations = Arc::new(AtomicUsize::new(0));

    let mut registry = TaskRegistry::new();
    registry
        .register(TaskDefinition::new(
            "two-steps",
            "commits A then fails B",
            TaskVisibility::Admin,
            TwoSteps {
                transactions: transactions.clone(),
                invocations: invocations.clone(),
            },
        ))
        .unwrap();
    registry
        .register(
            TaskDefinition::new(
                "counting",
                "counts",
                TaskVisibility::Public,
                Counting {
                    invocations: invocations.clone(),
                },
            )
            .exclusive(false),
        )
        .unwrap();
    registry
        .register(TaskDefinition::new(
            "slow",
            "never finishes in time",
            TaskVisibility::Admin,
            Slow,
        ))
        .unwrap();
    registry
        .register(TaskDefinition::new(
            "parked",
            "one long step",
            TaskVisibility::Admin,
            Parked {
                secs: 150,
                invocations: invocations.clone(),
            },
        ))
        .unwrap();

    Fixture {
        runner: TaskRunner::new(Arc::new(registry), runs.clone()),
        runs,
        transactions,
        invocations,
    }
}

#[tokio::test]
async fn failing_step_does_not_undo_earlier_commit() {
    let fx = fixture();

    let report = fx.runner.run("two-steps", json!({})).await.unwrap();

    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.step("A").unwrap().status, StepStatus::Succeeded);
    assert_eq!(report.step("B").unwrap().status, StepStatus::Failed);
    assert!(report.step("B").unwrap().error.is_some());
    assert_eq!(report.metric("a.written"), Some(3.0));
    assert_eq!(report.metric("b.written"), None);
    assert!(report.error.is_some());

    assert_eq!(
        fx.transactions.events(),
        vec![
            TxEvent::Begin(1),
            TxEvent::Commit(1),
            TxEvent::Begin(2),
            TxEvent::Rollback(2),
        ]
    );
}

#[tokio::test]
async fn invalid_input_never_reaches_handler() {
    let fx = fixture();

    let err = fx
        .runner
        .run("counting", json!({ "limit": 2, "verbose": true }))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskRunError::Validation(_)));

    let err = fx
        .runner
        .run("counting", json!({ "limit": "two" }))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskRunError::Validation(_)));

    assert_eq!(fx.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_input_schema_rejects_extra_fields() {
    let fx = fixture();

    let err = fx
        .runner
        .run("two-steps", json!({ "force": true }))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskRunError::Validation(_)));
    assert!(fx.transactions.events().is_empty());
    assert!(fx.runs.snapshot("two-steps").await.is_none());
}

#[tokio::test]
async fn null_input_counts_as_empty_object() {
    let fx = fixture();

    let report = fx
        .runner
        .run("two-steps", serde_json::Value::Null)
        .await
        .unwrap();

    assert_eq!(report.step_log.len(), 2);
}

#[tokio::test]
async fn unknown_task_is_rejected() {
    let fx = fixture();

    let err = fx.runner.run("nope", json!({})).await.unwrap_err();

    assert!(matches!(err, TaskRunError::UnknownTask(name) if name == "nope"));
}

#[tokio::test]
async fn successful_run_reports_steps_and_metrics() {
    let fx = fixture();

    let report = fx
        .runner
        .run("counting", json!({ "limit": 3 }))
        .await
        .unwrap();

    assert_eq!(report.status, TaskStatus::Succeeded);
    assert_eq!(report.step_log.len(), 3);
    assert_eq!(report.metric("counted"), Some(3.0));
    assert!(report.finished_at.is_some());
    assert!(report.error.is_none());
    // Non-exclusive tasks leave no run state behind.
    assert!(fx.runs.snapshot("counting").await.is_none());
}

#[tokio::test]
async fn exclusive_run_persists_report_and_heartbeats() {
    let fx = fixture();

    let report = fx.runner.run("two-steps", json!({})).await.unwrap();

    let state = fx.runs.snapshot("two-steps").await.unwrap();
    assert_eq!(state.run_id, report.run_id);
    assert_eq!(state.status, TaskStatus::Failed);
    assert_eq!(state.report.as_ref(), Some(&report));
    assert_eq!(fx.runs.heartbeat_count(), 2);
}

#[tokio::test]
async fn live_run_blocks_second_run() {
    let fx = fixture();
    fx.runs
        .insert(TaskRunState::new(
            "two-steps",
            "other-run".to_string(),
            TaskStatus::Running,
            Utc::now() - chrono::Duration::seconds(30),
        ))
        .await;

    let err = fx.runner.run("two-steps", json!({})).await.unwrap_err();

    assert!(matches!(err, TaskRunError::AlreadyRunning(name) if name == "two-steps"));
    assert_eq!(fx.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stale_run_is_taken_over() {
    let fx = fixture();
    fx.runs
        .insert(TaskRunState::new(
            "two-steps",
            "crashed-run".to_string(),
            TaskStatus::Running,
            Utc::now() - chrono::Duration::seconds(600),
        ))
        .await;

    let report = fx.runner.run("two-steps", json!({})).await.unwrap();

    assert_ne!(report.run_id, "crashed-run");
    let state = fx.runs.snapshot("two-steps").await.unwrap();
    assert_eq!(state.run_id, report.run_id);
    assert_eq!(fx.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn finished_run_does_not_block() {
    let fx = fixture();
    let mut previous = TaskRunState::new(
        "two-steps",
        "done-run".to_string(),
        TaskStatus::Succeeded,
        Utc::now(),
    );
    previous.heartbeat_at = Utc::now();
    fx.runs.insert(previous).await;

    assert!(fx.runner.run("two-steps", json!({})).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_of_exclusive_task_admit_one() {
    let fx = fixture();

    let (a, b) = tokio::join!(
        fx.runner.run("parked", json!({})),
        fx.runner.run("parked", json!({}))
    );

    let (admitted, refused) = match (a, b) {
        (Ok(report), Err(err)) | (Err(err), Ok(report)) => (report, err),
        (a, b) => panic!("expected exactly one admitted run, got {:?} and {:?}", a, b),
    };
    assert_eq!(admitted.status, TaskStatus::Succeeded);
    assert!(matches!(refused, TaskRunError::AlreadyRunning(name) if name == "parked"));
    assert_eq!(fx.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn long_step_keeps_heartbeating() {
    let fx = fixture();

    let report = fx.runner.run("parked", json!({})).await.unwrap();

    assert_eq!(report.status, TaskStatus::Succeeded);
    // One beat when the step starts, then one per minute while it runs.
    assert_eq!(fx.runs.heartbeat_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_stop_with_the_run() {
    let fx = fixture();

    fx.runner.run("parked", json!({})).await.unwrap();
    let beats = fx.runs.heartbeat_count();
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(fx.runs.heartbeat_count(), beats);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_is_recorded_as_failed() {
    let fx = fixture();

    let report = fx
        .runner
        .run_until_cancelled(
            "parked",
            json!({}),
            tokio::time::sleep(Duration::from_secs(10)),
        )
        .await
        .unwrap();

    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.step("refresh-manga").unwrap().status, StepStatus::Failed);
    let state = fx.runs.snapshot("parked").await.unwrap();
    assert_eq!(state.status, TaskStatus::Failed);

    // The cancelled run does not hold the task.
    let next = fx.runner.run("parked", json!({})).await.unwrap();
    assert_eq!(next.status, TaskStatus::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn deadline_fails_run_with_partial_step_log() {
    let fx = fixture();

    let report = fx
        .runner
        .run_with_deadline("slow", json!({}), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.step("fast").unwrap().status, StepStatus::Succeeded);
    let slow = report.step("slow").unwrap();
    assert_eq!(slow.status, StepStatus::Failed);
    assert!(slow.error.as_deref().unwrap().contains("deadline"));
    assert!(report.error.as_deref().unwrap().contains("deadline"));
}

#[tokio::test(start_paused = true)]
async fn deadline_is_irrelevant_for_fast_tasks() {
    let fx = fixture();

    let report = fx
        .runner
        .run_with_deadline("counting", json!({ "limit": 1 }), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(report.status, TaskStatus::Succeeded);
}
