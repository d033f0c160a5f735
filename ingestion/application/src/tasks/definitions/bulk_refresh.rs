use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use media_ingestion_domain::{MediaType, TaskVisibility};
use std::sync::Arc;
use tracing::{info, warn};

use super::{EmptyInput, TaskDependencies};
use crate::media_service::MediaProviderService;
use crate::tasks::context::TaskContext;
use crate::tasks::definition::{TaskDefinition, TaskHandler};
use crate::tasks::error::TaskError;

pub const BULK_MEDIA_REFRESH: &str = "bulk-media-refresh";

const REFRESH_CONCURRENCY: usize = 4;

#[derive(Debug, Default, Clone, Copy)]
struct RefreshOutcome {
    refreshed: u64,
    failed: u64,
    complete: bool,
}

/// Re-fetches stored media whose upstream data changed or went stale.
pub struct BulkMediaRefresh {
    deps: TaskDependencies,
    concurrency: usize,
}

impl BulkMediaRefresh {
    pub fn new(deps: TaskDependencies) -> Self {
        Self {
            deps,
            concurrency: REFRESH_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn definition(deps: TaskDependencies) -> TaskDefinition {
        TaskDefinition::new(
            BULK_MEDIA_REFRESH,
            "Refresh stored media from their providers",
            TaskVisibility::Admin,
            Self::new(deps),
        )
    }

    async fn refresh_type(&self, service: &Arc<MediaProviderService>) -> Result<RefreshOutcome, TaskError> {
        let media_type = service.media_type();
        let ids = service.ids_for_bulk_refresh().await?;
        let transactions = self.deps.transactions.as_ref();

        let results: Vec<bool> = stream::iter(ids.api_ids.into_iter())
            .map(|api_id| async move {
                match service.refresh_details(transactions, &api_id).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Failed to refresh {} {}: {}", media_type, api_id, e);
                        false
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let refreshed = results.iter().filter(|ok| **ok).count() as u64;
        Ok(RefreshOutcome {
            refreshed,
            failed: results.len() as u64 - refreshed,
            complete: ids.complete,
        })
    }

    fn record(ctx: &TaskContext, media_type: MediaType, outcome: RefreshOutcome) {
        ctx.metric(format!("{}.refreshed", media_type), outcome.refreshed as f64);
        ctx.metric(format!("{}.failed", media_type), outcome.failed as f64);
        if !outcome.complete {
            ctx.metric(format!("{}.partial_feed", media_type), 1.0);
        }
    }
}

#[async_trait]
impl TaskHandler for BulkMediaRefresh {
    type Input = EmptyInput;

    async fn handle(&self, ctx: &TaskContext, _input: EmptyInput) -> Result<(), TaskError> {
        let mut failed = Vec::new();

        for media_type in self.deps.providers.media_types() {
            let service = self.deps.providers.get(media_type)?;
            let step = format!("refresh-{}", media_type);

            match ctx.step(&step, || self.refresh_type(service)).await {
                Ok(outcome) => {
                    Self::record(ctx, media_type, outcome);
                    info!(
                        "Refreshed {} {} ({} failed)",
                        outcome.refreshed, media_type, outcome.failed
                    );
                }
                Err(_) => failed.push(media_type.as_str()),
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(TaskError::Failed(format!(
                "bulk refresh failed for: {}",
                failed.join(", ")
            )))
        }
    }
}
