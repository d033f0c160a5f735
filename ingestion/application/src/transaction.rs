use async_trait::async_trait;
use shaku::Interface;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

#[async_trait]
pub trait TransactionManager: Interface {
    async fn begin(&self) -> Result<Box<dyn Transaction>, TransactionError>;
}

/// A storage transaction handle. Dropping it without commit must roll back.
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> Result<(), TransactionError>;
    async fn rollback(self: Box<Self>) -> Result<(), TransactionError>;

    /// Lets a repository reach its backend's concrete transaction type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("Failed to begin transaction: {0}")]
    Begin(String),

    #[error("Failed to commit transaction: {0}")]
    Commit(String),

    #[error("Failed to roll back transaction: {0}")]
    Rollback(String),

    #[error("Transaction already committed or rolled back")]
    Closed,

    #[error("Transaction backend error: {0}")]
    Backend(String),
}

/// Step-scoped handle to one open transaction.
///
/// Clones share the same transaction. Once committed or rolled back every
/// clone fails with [`TransactionError::Closed`]. If the last clone is dropped
/// while still open, the backend transaction is dropped and rolls back.
#[derive(Clone)]
pub struct TransactionContext {
    id: String,
    inner: Arc<Mutex<Option<Box<dyn Transaction>>>>,
}

impl TransactionContext {
    pub async fn begin(manager: &dyn TransactionManager) -> Result<Self, TransactionError> {
        let transaction = manager.begin().await?;
        let id = Uuid::new_v4().to_string();
        debug!("Opened transaction {}", id);
        Ok(Self {
            id,
            inner: Arc::new(Mutex::new(Some(transaction))),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Exclusive access for the duration of one storage call.
    pub async fn acquire(&self) -> TransactionGuard<'_> {
        TransactionGuard {
            guard: self.inner.lock().await,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub async fn commit(&self) -> Result<(), TransactionError> {
        let transaction = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(TransactionError::Closed)?;
        transaction.commit().await?;
        debug!("Committed transaction {}", self.id);
        Ok(())
    }

    /// Rolling back an already closed transaction is a no-op.
    pub async fn rollback(&self) -> Result<(), TransactionError> {
        let transaction = self.inner.lock().await.take();
        if let Some(transaction) = transaction {
            transaction.rollback().await?;
            debug!("Rolled back transaction {}", self.id);
        }
        Ok(())
    }
}

pub struct TransactionGuard<'a> {
    guard: MutexGuard<'a, Option<Box<dyn Transaction>>>,
}

impl TransactionGuard<'_> {
    pub fn downcast_mut<T: Transaction + 'static>(&mut self) -> Result<&mut T, TransactionError> {
        let transaction = self.guard.as_mut().ok_or(TransactionError::Closed)?;
        transaction.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
            TransactionError::Backend(
                "transaction was opened by a different storage backend".to_string(),
            )
        })
    }
}

/// Runs `f` inside a fresh transaction: commit on `Ok`, roll back on `Err`.
pub async fn with_transaction<T, E, F, Fut>(manager: &dyn TransactionManager, f: F) -> Result<T, E>
where
    E: From<TransactionError>,
    F: FnOnce(TransactionContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let tx = TransactionContext::begin(manager).await?;
    match f(tx.clone()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback of transaction {} failed: {}", tx.id(), rollback_err);
            }
            Err(err)
        }
    }
}
