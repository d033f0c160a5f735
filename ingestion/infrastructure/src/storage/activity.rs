use async_trait::async_trait;
use media_ingestion_application::{MediaActivityRepository, RepositoryError, TransactionContext};
use media_ingestion_domain::MediaType;

use super::delete_in_chunks;

/// Activity rows live in the same database as media, so deletes only need
/// the step's transaction.
#[derive(Default)]
pub struct SqliteActivityRepository;

impl SqliteActivityRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaActivityRepository for SqliteActivityRepository {
    async fn delete_media_updates(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        ids: &[i64],
    ) -> Result<u64, RepositoryError> {
        delete_in_chunks(tx, "user_updates", "media_id", media_type, ids).await
    }

    async fn delete_media_notifications(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        ids: &[i64],
    ) -> Result<u64, RepositoryError> {
        delete_in_chunks(tx, "notifications", "media_id", media_type, ids).await
    }
}
