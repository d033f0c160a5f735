use media_ingestion_domain::MediaType;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::change_feed::{ChangeFeed, ChangeFeedError};
use crate::provider::{
    DetailsSource, DetailsTransformer, MediaRecord, ProviderError, RecordEnricher, TransformError,
};
use crate::repositories::{MediaRepository, RepositoryError};
use crate::transaction::{with_transaction, TransactionError, TransactionManager};

/// How a media type decides which stored items a bulk refresh revisits.
pub enum RefreshPolicy {
    /// Stored items whose upstream id shows up in the provider's change feed.
    ChangeFeed(Arc<ChangeFeed>),
    /// Stored items not refreshed within the given age.
    Stale { after: chrono::Duration },
    Never,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkRefreshIds {
    pub api_ids: Vec<String>,
    /// False when the upstream change feed was only partially read.
    pub complete: bool,
}

/// Client, transformer and repository for one media type.
pub struct MediaProviderService {
    media_type: MediaType,
    details: Arc<dyn DetailsSource>,
    transformer: Arc<dyn DetailsTransformer>,
    repository: Arc<dyn MediaRepository>,
    refresh_policy: RefreshPolicy,
    enricher: Option<Arc<dyn RecordEnricher>>,
}

impl MediaProviderService {
    pub fn new(
        media_type: MediaType,
        details: Arc<dyn DetailsSource>,
        transformer: Arc<dyn DetailsTransformer>,
        repository: Arc<dyn MediaRepository>,
        refresh_policy: RefreshPolicy,
    ) -> Self {
        Self {
            media_type,
            details,
            transformer,
            repository,
            refresh_policy,
            enricher: None,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn RecordEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn repository(&self) -> &Arc<dyn MediaRepository> {
        &self.repository
    }

    /// Fetches and normalizes details without touching storage.
    pub async fn fetch_media(&self, api_id: &str) -> Result<MediaRecord, MediaServiceError> {
        let raw = self.details.fetch_details(api_id).await?;
        let mut record = self.transformer.transform(&raw)?;

        if let Some(enricher) = &self.enricher {
            if let Err(e) = enricher.enrich(&mut record).await {
                warn!(
                    "Enrichment failed for {} {}, storing without it: {}",
                    self.media_type, api_id, e
                );
            }
        }

        Ok(record)
    }

    /// Fetch outside the transaction, then upsert inside its own one.
    pub async fn refresh_details(
        &self,
        transactions: &dyn TransactionManager,
        api_id: &str,
    ) -> Result<i64, MediaServiceError> {
        let record = self.fetch_media(api_id).await?;
        let media_type = self.media_type;
        let repository = &self.repository;

        let id = with_transaction(transactions, |tx| async move {
            repository
                .upsert_media(&tx, media_type, &record)
                .await
                .map_err(MediaServiceError::from)
        })
        .await?;

        debug!("Refreshed {} {} (row {})", media_type, api_id, id);
        Ok(id)
    }

    pub async fn ids_for_bulk_refresh(&self) -> Result<BulkRefreshIds, MediaServiceError> {
        match &self.refresh_policy {
            RefreshPolicy::Never => Ok(BulkRefreshIds {
                api_ids: Vec::new(),
                complete: true,
            }),
            RefreshPolicy::Stale { after } => Ok(BulkRefreshIds {
                api_ids: self
                    .repository
                    .api_ids_to_refresh(self.media_type, *after)
                    .await?,
                complete: true,
            }),
            RefreshPolicy::ChangeFeed(feed) => {
                let changes = feed.changed_ids().await?;
                if changes.is_empty() {
                    return Ok(BulkRefreshIds {
                        api_ids: Vec::new(),
                        complete: changes.complete,
                    });
                }

                let changed: HashSet<String> = changes.ids.iter().map(i64::to_string).collect();
                let api_ids = self
                    .repository
                    .stored_api_ids(self.media_type)
                    .await?
                    .into_iter()
                    .filter(|api_id| changed.contains(api_id))
                    .collect();

                Ok(BulkRefreshIds {
                    api_ids,
                    complete: changes.complete,
                })
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaServiceError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Change feed error: {0}")]
    ChangeFeed(#[from] ChangeFeedError),

    #[error("No provider service registered for {0}")]
    NotRegistered(MediaType),

    #[error("Provider service for {0} registered twice")]
    DuplicateRegistration(MediaType),
}
