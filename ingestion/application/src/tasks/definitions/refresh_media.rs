use async_trait::async_trait;
use media_ingestion_domain::{MediaType, TaskVisibility};
use serde::Deserialize;
use tracing::debug;

use super::TaskDependencies;
use crate::tasks::context::TaskContext;
use crate::tasks::definition::{TaskDefinition, TaskHandler};
use crate::tasks::error::TaskError;

pub const REFRESH_MEDIA: &str = "refresh-media";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshMediaInput {
    pub media_type: MediaType,
    pub api_id: String,
}

/// Refreshes a single item on demand.
pub struct RefreshMedia {
    deps: TaskDependencies,
}

impl RefreshMedia {
    pub fn new(deps: TaskDependencies) -> Self {
        Self { deps }
    }

    pub fn definition(deps: TaskDependencies) -> TaskDefinition {
        TaskDefinition::new(
            REFRESH_MEDIA,
            "Refresh one media item from its provider",
            TaskVisibility::Public,
            Self::new(deps),
        )
        .exclusive(false)
    }
}

#[async_trait]
impl TaskHandler for RefreshMedia {
    type Input = RefreshMediaInput;

    async fn handle(&self, ctx: &TaskContext, input: RefreshMediaInput) -> Result<(), TaskError> {
        if input.api_id.trim().is_empty() {
            return Err(TaskError::Failed("api_id must not be empty".to_string()));
        }

        let service = self.deps.providers.get(input.media_type)?;
        let step = format!("refresh-{}-{}", input.media_type, input.api_id);
        let id = ctx
            .step(&step, || {
                service.refresh_details(self.deps.transactions.as_ref(), &input.api_id)
            })
            .await?;

        ctx.metric(format!("{}.refreshed", input.media_type), 1.0);
        debug!(
            "Refresh of {} {} stored as row {}",
            input.media_type, input.api_id, id
        );
        Ok(())
    }
}
