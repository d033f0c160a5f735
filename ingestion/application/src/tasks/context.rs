use chrono::{DateTime, Utc};
use media_ingestion_domain::{StepRecord, StepStatus, TaskReport, TaskStatus};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

use super::error::TaskError;
use crate::task_state::{RunId, TaskRunRepository};
use crate::transaction::{with_transaction, TransactionContext, TransactionError, TransactionManager};

#[derive(Default)]
struct ExecutionState {
    step_log: Vec<StepRecord>,
    metrics: BTreeMap<String, f64>,
    in_flight: Vec<(String, DateTime<Utc>, Instant)>,
}

/// Per-invocation step log and metrics handed to a task handler.
pub struct TaskContext {
    task_name: String,
    run_id: RunId,
    started_at: DateTime<Utc>,
    state: Mutex<ExecutionState>,
    heartbeat: Option<Arc<dyn TaskRunRepository>>,
}

impl TaskContext {
    pub fn new(task_name: impl Into<String>, run_id: RunId) -> Self {
        Self {
            task_name: task_name.into(),
            run_id,
            started_at: Utc::now(),
            state: Mutex::new(ExecutionState::default()),
            heartbeat: None,
        }
    }

    /// Writes a heartbeat for `run_id` at the start of every step.
    pub fn with_heartbeat(mut self, runs: Arc<dyn TaskRunRepository>) -> Self {
        self.heartbeat = Some(runs);
        self
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn state(&self) -> MutexGuard<'_, ExecutionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` as a named step and records its outcome in the step log.
    ///
    /// The error is returned to the handler, which decides whether the rest
    /// of the task continues.
    pub async fn step<T, E, F, Fut>(&self, name: &str, f: F) -> Result<T, TaskError>
    where
        E: Into<TaskError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.state()
            .in_flight
            .push((name.to_string(), started_at, clock));
        debug!("Task {} step {} started", self.task_name, name);

        let result = match self.beat().await {
            Ok(()) => f().await.map_err(Into::into),
            Err(e) => Err(e),
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        let mut state = self.state();
        if let Some(pos) = state.in_flight.iter().rposition(|(n, _, _)| n == name) {
            state.in_flight.remove(pos);
        }
        let (status, error) = match &result {
            Ok(_) => (StepStatus::Succeeded, None),
            Err(e) => {
                warn!("Task {} step {} failed: {}", self.task_name, name, e);
                (StepStatus::Failed, Some(e.to_string()))
            }
        };
        state.step_log.push(StepRecord {
            name: name.to_string(),
            status,
            started_at,
            duration_ms,
            error,
        });
        drop(state);

        debug!(
            "Task {} step {} finished in {}ms",
            self.task_name, name, duration_ms
        );
        result
    }

    /// A step whose storage writes share one transaction: committed when `f`
    /// returns `Ok`, rolled back otherwise.
    pub async fn transactional_step<T, E, F, Fut>(
        &self,
        name: &str,
        transactions: &dyn TransactionManager,
        f: F,
    ) -> Result<T, TaskError>
    where
        E: From<TransactionError> + Into<TaskError>,
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.step(name, || with_transaction(transactions, f)).await
    }

    /// Adds `value` to the named metric.
    pub fn metric(&self, name: impl Into<String>, value: f64) {
        *self.state().metrics.entry(name.into()).or_insert(0.0) += value;
    }

    async fn beat(&self) -> Result<(), TaskError> {
        if let Some(runs) = &self.heartbeat {
            runs.heartbeat(&self.task_name, &self.run_id, Utc::now())
                .await?;
        }
        Ok(())
    }

    /// Marks steps still running as failed, e.g. when the task was cut off.
    pub(crate) fn abandon_in_flight(&self, reason: &str) {
        let mut state = self.state();
        let in_flight = std::mem::take(&mut state.in_flight);
        for (name, started_at, clock) in in_flight {
            state.step_log.push(StepRecord {
                name,
                status: StepStatus::Failed,
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
                error: Some(reason.to_string()),
            });
        }
    }

    pub(crate) fn into_report(self, outcome: Result<(), TaskError>) -> TaskReport {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let (status, error) = match outcome {
            Ok(()) => (TaskStatus::Succeeded, None),
            Err(e) => (TaskStatus::Failed, Some(e.to_string())),
        };

        TaskReport {
            run_id: self.run_id,
            task_name: self.task_name,
            status,
            started_at: self.started_at,
            finished_at: Some(Utc::now()),
            step_log: state.step_log,
            metrics: state.metrics,
            error,
        }
    }
}
