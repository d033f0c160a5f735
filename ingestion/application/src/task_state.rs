use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use media_ingestion_domain::{TaskReport, TaskStatus};
use serde::{Deserialize, Serialize};
use shaku::Interface;

pub type RunId = String;

/// Last known run of an exclusive task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunState {
    pub task_name: String,
    pub run_id: RunId,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub report: Option<TaskReport>,
}

impl TaskRunState {
    pub fn new(
        task_name: impl Into<String>,
        run_id: RunId,
        status: TaskStatus,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            run_id,
            status,
            started_at,
            heartbeat_at: started_at,
            last_error: None,
            report: None,
        }
    }
}

/// Result of [`TaskRunRepository::try_claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// The previous run stopped heartbeating and was replaced.
    TakenOver { previous_run_id: RunId },
    /// A live run owns the task; nothing was written.
    Held { run_id: RunId },
}

impl ClaimOutcome {
    /// Decides a claim against the currently stored state. A `RUNNING` state
    /// whose heartbeat is younger than `stale_after` holds the task.
    pub fn decide(
        existing: Option<&TaskRunState>,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Self {
        match existing {
            Some(state) if state.status == TaskStatus::Running => {
                if now - state.heartbeat_at < stale_after {
                    ClaimOutcome::Held {
                        run_id: state.run_id.clone(),
                    }
                } else {
                    ClaimOutcome::TakenOver {
                        previous_run_id: state.run_id.clone(),
                    }
                }
            }
            _ => ClaimOutcome::Claimed,
        }
    }

    pub fn is_claimed(&self) -> bool {
        !matches!(self, ClaimOutcome::Held { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaskRunStateError {
    #[error("Task run state not found: {0}")]
    NotFound(String),
    #[error("Task {0} was taken over by another run")]
    StaleInstance(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// `try_claim` must check and write in one atomic operation. Writes other
/// than `upsert` and `try_claim` must be rejected with `StaleInstance` when
/// `run_id` no longer owns the task.
#[async_trait]
pub trait TaskRunRepository: Interface {
    async fn get(&self, task_name: &str) -> Result<Option<TaskRunState>, TaskRunStateError>;
    async fn upsert(&self, task_name: &str, state: &TaskRunState) -> Result<(), TaskRunStateError>;
    /// Stores `state` unless a live run owns `task_name`.
    async fn try_claim(
        &self,
        task_name: &str,
        state: &TaskRunState,
        stale_after: Duration,
    ) -> Result<ClaimOutcome, TaskRunStateError>;
    async fn heartbeat(
        &self,
        task_name: &str,
        run_id: &RunId,
        heartbeat_at: DateTime<Utc>,
    ) -> Result<(), TaskRunStateError>;
    async fn finish(
        &self,
        task_name: &str,
        run_id: &RunId,
        report: &TaskReport,
    ) -> Result<(), TaskRunStateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(heartbeat_age_secs: i64, now: DateTime<Utc>) -> TaskRunState {
        let mut state = TaskRunState::new(
            "bulk-media-refresh",
            "previous".to_string(),
            TaskStatus::Running,
            now - Duration::seconds(3600),
        );
        state.heartbeat_at = now - Duration::seconds(heartbeat_age_secs);
        state
    }

    #[test]
    fn test_claim_decisions() {
        let now = Utc::now();
        let stale_after = Duration::seconds(300);

        assert_eq!(ClaimOutcome::decide(None, now, stale_after), ClaimOutcome::Claimed);
        assert_eq!(
            ClaimOutcome::decide(Some(&running(30, now)), now, stale_after),
            ClaimOutcome::Held {
                run_id: "previous".to_string()
            }
        );
        assert_eq!(
            ClaimOutcome::decide(Some(&running(300, now)), now, stale_after),
            ClaimOutcome::TakenOver {
                previous_run_id: "previous".to_string()
            }
        );

        let mut finished = running(0, now);
        finished.status = TaskStatus::Failed;
        assert!(ClaimOutcome::decide(Some(&finished), now, stale_after).is_claimed());
    }
}
