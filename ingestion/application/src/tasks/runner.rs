use chrono::{Duration as ChronoDuration, Utc};
use media_ingestion_domain::{TaskReport, TaskStatus};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::TaskContext;
use super::definition::{TaskDefinition, TaskRegistry};
use super::error::{TaskError, TaskRunError};
use crate::task_state::{ClaimOutcome, RunId, TaskRunRepository, TaskRunState, TaskRunStateError};

/// A run whose heartbeat is older than this is considered dead.
pub const HEARTBEAT_TIMEOUT_SECS: i64 = 300;

/// Period of the background heartbeat kept up for the whole of an exclusive
/// run, so a single long step never looks dead.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

pub struct TaskRunner {
    registry: Arc<TaskRegistry>,
    runs: Arc<dyn TaskRunRepository>,
}

impl TaskRunner {
    pub fn new(registry: Arc<TaskRegistry>, runs: Arc<dyn TaskRunRepository>) -> Self {
        Self { registry, runs }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub async fn run(&self, name: &str, input: Value) -> Result<TaskReport, TaskRunError> {
        self.execute(name, input, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but the task is cut off after `deadline` and
    /// reported as failed with whatever steps completed.
    pub async fn run_with_deadline(
        &self,
        name: &str,
        input: Value,
        deadline: Duration,
    ) -> Result<TaskReport, TaskRunError> {
        let stop = async move {
            tokio::time::sleep(deadline).await;
            TaskError::DeadlineExceeded(deadline)
        };
        self.execute(name, input, stop).await
    }

    /// Like [`run`](Self::run), but the task is cut off once `shutdown`
    /// resolves. The run is still finished and recorded as failed.
    pub async fn run_until_cancelled<S>(
        &self,
        name: &str,
        input: Value,
        shutdown: S,
    ) -> Result<TaskReport, TaskRunError>
    where
        S: Future<Output = ()>,
    {
        let stop = async move {
            shutdown.await;
            TaskError::Cancelled
        };
        self.execute(name, input, stop).await
    }

    async fn execute<S>(&self, name: &str, input: Value, stop: S) -> Result<TaskReport, TaskRunError>
    where
        S: Future<Output = TaskError>,
    {
        let definition = self
            .registry
            .get(name)
            .ok_or_else(|| TaskRunError::UnknownTask(name.to_string()))?;

        let input = definition.validate(input)?;

        let run_id = Uuid::new_v4().to_string();
        let mut ctx = TaskContext::new(definition.name(), run_id.clone());
        let mut ticker = None;
        if definition.is_exclusive() {
            self.claim(definition, &run_id).await?;
            ctx = ctx.with_heartbeat(self.runs.clone());
            ticker = Some(spawn_heartbeat(
                self.runs.clone(),
                definition.name().to_string(),
                run_id.clone(),
            ));
        }

        info!("Starting task {} (run {})", definition.name(), run_id);

        let outcome = tokio::select! {
            outcome = definition.invoke(&ctx, input) => outcome,
            reason = stop => {
                ctx.abandon_in_flight(&reason.to_string());
                Err(reason)
            }
        };

        if let Some(ticker) = ticker {
            ticker.abort();
        }

        let report = ctx.into_report(outcome);
        log_report(&report);

        if definition.is_exclusive() {
            if let Err(e) = self.runs.finish(definition.name(), &run_id, &report).await {
                error!(
                    "Failed to persist result of task {} (run {}): {}",
                    definition.name(),
                    run_id,
                    e
                );
            }
        }

        Ok(report)
    }

    async fn claim(&self, definition: &TaskDefinition, run_id: &RunId) -> Result<(), TaskRunError> {
        let name = definition.name();
        let state = TaskRunState::new(name, run_id.clone(), TaskStatus::Running, Utc::now());

        match self
            .runs
            .try_claim(name, &state, ChronoDuration::seconds(HEARTBEAT_TIMEOUT_SECS))
            .await?
        {
            ClaimOutcome::Claimed => Ok(()),
            ClaimOutcome::TakenOver { previous_run_id } => {
                warn!(
                    "Took over task {} from stale run {} (no heartbeat for over {}s)",
                    name, previous_run_id, HEARTBEAT_TIMEOUT_SECS
                );
                Ok(())
            }
            ClaimOutcome::Held { run_id: owner } => {
                debug!("Task {} is held by run {}", name, owner);
                Err(TaskRunError::AlreadyRunning(name.to_string()))
            }
        }
    }
}

/// Beats every [`HEARTBEAT_INTERVAL`] until aborted. Stops on its own once
/// another run owns the task; the next step of this run then fails.
fn spawn_heartbeat(
    runs: Arc<dyn TaskRunRepository>,
    task_name: String,
    run_id: RunId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + HEARTBEAT_INTERVAL;
        let mut interval = tokio::time::interval_at(start, HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match runs.heartbeat(&task_name, &run_id, Utc::now()).await {
                Ok(()) => {}
                Err(TaskRunStateError::Backend(e)) => {
                    warn!("Heartbeat for task {} (run {}) failed: {}", task_name, run_id, e)
                }
                Err(e) => {
                    warn!("Heartbeat for task {} (run {}) stopped: {}", task_name, run_id, e);
                    return;
                }
            }
        }
    })
}

fn log_report(report: &TaskReport) {
    let failed_steps = report.failed_steps().count();
    match report.status {
        TaskStatus::Succeeded => info!(
            "Task {} (run {}) succeeded: {} steps, metrics {:?}",
            report.task_name,
            report.run_id,
            report.step_log.len(),
            report.metrics
        ),
        _ => warn!(
            "Task {} (run {}) {}: {} steps ({} failed), metrics {:?}, error: {}",
            report.task_name,
            report.run_id,
            report.status.as_str(),
            report.step_log.len(),
            failed_steps,
            report.metrics,
            report.error.as_deref().unwrap_or("none")
        ),
    }
}
