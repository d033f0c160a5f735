use async_trait::async_trait;
use media_ingestion_domain::{MediaType, TaskVisibility};
use tracing::info;

use super::{EmptyInput, TaskDependencies};
use crate::tasks::context::TaskContext;
use crate::tasks::definition::{TaskDefinition, TaskHandler};
use crate::tasks::error::TaskError;
use crate::transaction::TransactionContext;

pub const REMOVE_ALL_ORPHANS_MEDIA: &str = "remove-all-orphans-media";

/// Deletes media no user list or collection references, one transaction per
/// media type. A failing type does not stop the others.
pub struct RemoveAllOrphansMedia {
    deps: TaskDependencies,
}

impl RemoveAllOrphansMedia {
    pub fn new(deps: TaskDependencies) -> Self {
        Self { deps }
    }

    pub fn definition(deps: TaskDependencies) -> TaskDefinition {
        TaskDefinition::new(
            REMOVE_ALL_ORPHANS_MEDIA,
            "Remove media not referenced by any list or collection",
            TaskVisibility::Admin,
            Self::new(deps),
        )
    }

    async fn remove_orphans(
        &self,
        tx: TransactionContext,
        media_type: MediaType,
    ) -> Result<u64, TaskError> {
        let service = self.deps.providers.get(media_type)?;
        let repository = service.repository();

        let ids = repository.orphaned_media_ids(&tx, media_type).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        self.deps
            .activity
            .delete_media_updates(&tx, media_type, &ids)
            .await?;
        self.deps
            .activity
            .delete_media_notifications(&tx, media_type, &ids)
            .await?;
        let removed = repository.remove_media_by_ids(&tx, media_type, &ids).await?;
        Ok(removed)
    }
}

#[async_trait]
impl TaskHandler for RemoveAllOrphansMedia {
    type Input = EmptyInput;

    async fn handle(&self, ctx: &TaskContext, _input: EmptyInput) -> Result<(), TaskError> {
        let mut failed = Vec::new();

        for media_type in self.deps.providers.media_types() {
            let step = format!("remove-orphans-{}", media_type);
            let result = ctx
                .transactional_step(&step, self.deps.transactions.as_ref(), |tx| {
                    self.remove_orphans(tx, media_type)
                })
                .await;

            match result {
                Ok(removed) => {
                    ctx.metric(format!("{}.removed", media_type), removed as f64);
                    if removed > 0 {
                        info!("Removed {} orphaned {}", removed, media_type);
                    }
                }
                Err(_) => failed.push(media_type.as_str()),
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(TaskError::Failed(format!(
                "orphan removal failed for: {}",
                failed.join(", ")
            )))
        }
    }
}
