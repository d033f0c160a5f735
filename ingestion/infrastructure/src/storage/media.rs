use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use media_ingestion_application::{
    MediaRecord, MediaRepository, RepositoryError, TransactionContext,
};
use media_ingestion_domain::MediaType;
use sqlx::SqlitePool;
use tracing::debug;

use super::{backend, delete_in_chunks, SqliteTransaction};

pub struct SqliteMediaRepository {
    pool: SqlitePool,
}

impl SqliteMediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl MediaRepository for SqliteMediaRepository {
    async fn orphaned_media_ids(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
    ) -> Result<Vec<i64>, RepositoryError> {
        let mut guard = tx.acquire().await;
        let conn = guard.downcast_mut::<SqliteTransaction>()?.connection();

        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT m.id FROM media m
            WHERE m.media_type = ?1
              AND NOT EXISTS (
                  SELECT 1 FROM media_list l
                  WHERE l.media_type = m.media_type AND l.media_id = m.id
              )
              AND NOT EXISTS (
                  SELECT 1 FROM collection_items c
                  WHERE c.media_type = m.media_type AND c.media_id = m.id
              )
            ORDER BY m.id
            "#,
        )
        .bind(media_type.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(backend)
    }

    async fn remove_media_by_ids(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        ids: &[i64],
    ) -> Result<u64, RepositoryError> {
        let removed = delete_in_chunks(tx, "media", "id", media_type, ids).await?;
        debug!("Removed {} {} media rows", removed, media_type);
        Ok(removed)
    }

    async fn upsert_media(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        record: &MediaRecord,
    ) -> Result<i64, RepositoryError> {
        let genres = serde_json::to_string(&record.genres)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        let mut guard = tx.acquire().await;
        let conn = guard.downcast_mut::<SqliteTransaction>()?.connection();

        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO media
                (media_type, api_id, name, release_date, synopsis, genres, payload, last_api_update)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (media_type, api_id) DO UPDATE SET
                name = excluded.name,
                release_date = excluded.release_date,
                synopsis = excluded.synopsis,
                genres = excluded.genres,
                payload = excluded.payload,
                last_api_update = excluded.last_api_update
            RETURNING id
            "#,
        )
        .bind(media_type.as_str())
        .bind(&record.api_id)
        .bind(&record.name)
        .bind(record.release_date.as_deref())
        .bind(record.synopsis.as_deref())
        .bind(genres)
        .bind(payload)
        .bind(timestamp(Utc::now()))
        .fetch_one(&mut *conn)
        .await
        .map_err(backend)
    }

    async fn stored_api_ids(&self, media_type: MediaType) -> Result<Vec<String>, RepositoryError> {
        sqlx::query_scalar::<_, String>(
            "SELECT api_id FROM media WHERE media_type = ?1 ORDER BY id",
        )
        .bind(media_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn api_ids_to_refresh(
        &self,
        media_type: MediaType,
        stale_after: Duration,
    ) -> Result<Vec<String>, RepositoryError> {
        let cutoff = timestamp(Utc::now() - stale_after);

        sqlx::query_scalar::<_, String>(
            r#"
            SELECT api_id FROM media
            WHERE media_type = ?1
              AND (last_api_update IS NULL OR last_api_update < ?2)
            ORDER BY id
            "#,
        )
        .bind(media_type.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }
}
