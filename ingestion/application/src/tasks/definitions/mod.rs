mod bulk_refresh;
mod refresh_media;
mod remove_orphans;

pub use bulk_refresh::{BulkMediaRefresh, BULK_MEDIA_REFRESH};
pub use refresh_media::{RefreshMedia, RefreshMediaInput, REFRESH_MEDIA};
pub use remove_orphans::{RemoveAllOrphansMedia, REMOVE_ALL_ORPHANS_MEDIA};

use serde::Deserialize;
use std::sync::Arc;

use super::definition::TaskRegistry;
use super::error::TaskRunError;
use crate::registry::ProviderServiceRegistry;
use crate::repositories::MediaActivityRepository;
use crate::transaction::TransactionManager;

/// Input of tasks that take no parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyInput {}

#[derive(Clone)]
pub struct TaskDependencies {
    pub providers: Arc<ProviderServiceRegistry>,
    pub activity: Arc<dyn MediaActivityRepository>,
    pub transactions: Arc<dyn TransactionManager>,
}

/// Registry with every built-in maintenance task.
pub fn standard_tasks(deps: TaskDependencies) -> Result<TaskRegistry, TaskRunError> {
    let mut registry = TaskRegistry::new();
    registry.register(RemoveAllOrphansMedia::definition(deps.clone()))?;
    registry.register(BulkMediaRefresh::definition(deps.clone()))?;
    registry.register(RefreshMedia::definition(deps))?;
    Ok(registry)
}
