use std::time::Duration;

use crate::change_feed::ChangeFeedError;
use crate::media_service::MediaServiceError;
use crate::provider::ProviderError;
use crate::repositories::RepositoryError;
use crate::task_state::TaskRunStateError;
use crate::transaction::TransactionError;

/// Failure inside a task handler or one of its steps.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Media service error: {0}")]
    MediaService(#[from] MediaServiceError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Change feed error: {0}")]
    ChangeFeed(#[from] ChangeFeedError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Task run state error: {0}")]
    RunState(#[from] TaskRunStateError),

    #[error("Task exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Task cancelled by shutdown")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid input for task {task}: {message}")]
pub struct ValidationError {
    pub task: String,
    pub message: String,
}

/// Reasons a run is refused before its handler starts.
#[derive(Debug, thiserror::Error)]
pub enum TaskRunError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Task {0} is already running")]
    AlreadyRunning(String),

    #[error("Task {0} registered twice")]
    DuplicateTask(String),

    #[error("Task run state error: {0}")]
    RunState(#[from] TaskRunStateError),
}
