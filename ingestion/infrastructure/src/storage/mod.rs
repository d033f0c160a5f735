pub mod activity;
pub mod media;
pub mod sqlite;

pub use activity::SqliteActivityRepository;
pub use media::SqliteMediaRepository;
pub use sqlite::{SqliteStorage, SqliteTransaction};

use media_ingestion_application::{RepositoryError, TransactionContext};
use media_ingestion_domain::MediaType;
use sqlx::{QueryBuilder, Sqlite};

/// Upper bound on bound ids per DELETE statement.
pub const DELETE_CHUNK_SIZE: usize = 500;

fn backend(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

/// `DELETE FROM {table} WHERE media_type = ? AND {id_column} IN (...)`, run
/// in chunks inside the step's transaction.
async fn delete_in_chunks(
    tx: &TransactionContext,
    table: &str,
    id_column: &str,
    media_type: MediaType,
    ids: &[i64],
) -> Result<u64, RepositoryError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut guard = tx.acquire().await;
    let conn = guard.downcast_mut::<SqliteTransaction>()?.connection();
    let mut deleted = 0;

    for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
        let mut query =
            QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE media_type = ", table));
        query.push_bind(media_type.as_str());
        query.push(format!(" AND {} IN (", id_column));
        let mut separated = query.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        deleted += query
            .build()
            .execute(&mut *conn)
            .await
            .map_err(backend)?
            .rows_affected();
    }

    Ok(deleted)
}
