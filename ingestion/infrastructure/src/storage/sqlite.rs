use async_trait::async_trait;
use media_ingestion_application::{RepositoryError, Transaction, TransactionError, TransactionManager};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::any::Any;
use std::str::FromStr;
use tracing::info;

use super::{backend, SqliteActivityRepository, SqliteMediaRepository};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS media (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        media_type TEXT NOT NULL,
        api_id TEXT NOT NULL,
        name TEXT NOT NULL,
        release_date TEXT,
        synopsis TEXT,
        genres TEXT NOT NULL DEFAULT '[]',
        payload TEXT NOT NULL DEFAULT '{}',
        last_api_update TEXT,
        UNIQUE (media_type, api_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS media_list (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        media_type TEXT NOT NULL,
        media_id INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collection_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id INTEGER NOT NULL,
        media_type TEXT NOT NULL,
        media_id INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_updates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        media_type TEXT NOT NULL,
        media_id INTEGER NOT NULL,
        payload TEXT,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        media_type TEXT NOT NULL,
        media_id INTEGER NOT NULL,
        payload TEXT,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_media_list_media ON media_list (media_type, media_id)",
    "CREATE INDEX IF NOT EXISTS idx_collection_items_media ON collection_items (media_type, media_id)",
    "CREATE INDEX IF NOT EXISTS idx_user_updates_media ON user_updates (media_type, media_id)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_media ON notifications (media_type, media_id)",
];

/// SQLite pool plus the transaction boundary used by task steps.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(backend)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        info!("SQLite schema ready");
        Ok(())
    }

    pub fn media_repository(&self) -> SqliteMediaRepository {
        SqliteMediaRepository::new(self.pool.clone())
    }

    pub fn activity_repository(&self) -> SqliteActivityRepository {
        SqliteActivityRepository::new()
    }
}

#[async_trait]
impl TransactionManager for SqliteStorage {
    async fn begin(&self) -> Result<Box<dyn Transaction>, TransactionError> {
        let inner = self
            .pool
            .begin()
            .await
            .map_err(|e| TransactionError::Begin(e.to_string()))?;
        Ok(Box::new(SqliteTransaction { inner }))
    }
}

pub struct SqliteTransaction {
    inner: sqlx::Transaction<'static, Sqlite>,
}

impl SqliteTransaction {
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.inner
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        self.inner
            .commit()
            .await
            .map_err(|e| TransactionError::Commit(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        self.inner
            .rollback()
            .await
            .map_err(|e| TransactionError::Rollback(e.to_string()))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
