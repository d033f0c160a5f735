use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use media_ingestion_application::{
    ClaimOutcome, RunId, TaskRunRepository, TaskRunState, TaskRunStateError,
};
use media_ingestion_domain::TaskReport;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Single-process run state, for the `memory` backend and tests.
#[derive(Default)]
pub struct InMemoryTaskRunRepository {
    states: Mutex<HashMap<String, TaskRunState>>,
}

impl InMemoryTaskRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_with<F>(
        &self,
        task_name: &str,
        run_id: &RunId,
        updater: F,
    ) -> Result<(), TaskRunStateError>
    where
        F: FnOnce(&mut TaskRunState),
    {
        let mut states = self.states.lock().await;
        let state = states
            .get_mut(task_name)
            .ok_or_else(|| TaskRunStateError::NotFound(task_name.to_string()))?;
        if &state.run_id != run_id {
            return Err(TaskRunStateError::StaleInstance(task_name.to_string()));
        }
        updater(state);
        Ok(())
    }
}

#[async_trait]
impl TaskRunRepository for InMemoryTaskRunRepository {
    async fn get(&self, task_name: &str) -> Result<Option<TaskRunState>, TaskRunStateError> {
        Ok(self.states.lock().await.get(task_name).cloned())
    }

    async fn upsert(&self, task_name: &str, state: &TaskRunState) -> Result<(), TaskRunStateError> {
        self.states
            .lock()
            .await
            .insert(task_name.to_string(), state.clone());
        Ok(())
    }

    async fn try_claim(
        &self,
        task_name: &str,
        state: &TaskRunState,
        stale_after: Duration,
    ) -> Result<ClaimOutcome, TaskRunStateError> {
        let mut states = self.states.lock().await;
        let outcome = ClaimOutcome::decide(states.get(task_name), Utc::now(), stale_after);
        if outcome.is_claimed() {
            states.insert(task_name.to_string(), state.clone());
        }
        Ok(outcome)
    }

    async fn heartbeat(
        &self,
        task_name: &str,
        run_id: &RunId,
        heartbeat_at: DateTime<Utc>,
    ) -> Result<(), TaskRunStateError> {
        self.update_with(task_name, run_id, |state| {
            state.heartbeat_at = heartbeat_at;
        })
        .await
    }

    async fn finish(
        &self,
        task_name: &str,
        run_id: &RunId,
        report: &TaskReport,
    ) -> Result<(), TaskRunStateError> {
        self.update_with(task_name, run_id, |state| {
            state.status = report.status;
            state.heartbeat_at = report.finished_at.unwrap_or_else(Utc::now);
            state.last_error = report.error.clone();
            state.report = Some(report.clone());
        })
        .await
    }
}
