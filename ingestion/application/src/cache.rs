use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shaku::Interface;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Process-external key/value store with per-entry expiry.
///
/// Implementations must treat an entry read after its expiry as absent.
#[async_trait]
pub trait CacheStore: Interface {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// JSON-typed view over a [`CacheStore`].
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Compute-if-absent.
    ///
    /// A live entry is returned without calling `compute`. Otherwise `compute`
    /// runs and its value is stored for `ttl`. Errors from `compute` propagate
    /// and leave nothing behind. Concurrent callers racing on the same absent
    /// key may each run `compute`.
    pub async fn wrap<T, E, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(raw) = self.store.get(key).await? {
            match serde_json::from_slice::<T>(&raw) {
                Ok(value) => {
                    debug!("Cache hit for {}", key);
                    return Ok(value);
                }
                Err(e) => warn!("Discarding unreadable cache entry {}: {}", key, e),
            }
        }

        debug!("Cache miss for {}, computing", key);
        let value = compute().await?;

        match serde_json::to_vec(&value) {
            Ok(payload) => {
                if let Err(e) = self.store.set(key, payload, ttl).await {
                    warn!("Failed to store cache entry {}: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to serialize cache entry {}: {}", key, e),
        }

        Ok(value)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.store.get(key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| CacheError::Serialization(e.to_string())),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let payload =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.store.set(key, payload, ttl).await
    }

    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.store.delete(key).await
    }
}
