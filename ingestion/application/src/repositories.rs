use async_trait::async_trait;
use chrono::Duration;
use media_ingestion_domain::MediaType;
use shaku::Interface;

use crate::provider::MediaRecord;
use crate::transaction::{TransactionContext, TransactionError};

#[async_trait]
pub trait MediaRepository: Interface {
    /// Media rows referenced by no user list and no collection.
    async fn orphaned_media_ids(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
    ) -> Result<Vec<i64>, RepositoryError>;

    async fn remove_media_by_ids(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        ids: &[i64],
    ) -> Result<u64, RepositoryError>;

    /// Inserts or updates by `(media_type, api_id)`, returning the row id.
    async fn upsert_media(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        record: &MediaRecord,
    ) -> Result<i64, RepositoryError>;

    async fn stored_api_ids(&self, media_type: MediaType) -> Result<Vec<String>, RepositoryError>;

    /// Api ids never refreshed or last refreshed longer than `stale_after` ago.
    async fn api_ids_to_refresh(
        &self,
        media_type: MediaType,
        stale_after: Duration,
    ) -> Result<Vec<String>, RepositoryError>;
}

/// Per-user activity rows that reference media.
#[async_trait]
pub trait MediaActivityRepository: Interface {
    async fn delete_media_updates(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        ids: &[i64],
    ) -> Result<u64, RepositoryError>;

    async fn delete_media_notifications(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        ids: &[i64],
    ) -> Result<u64, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
