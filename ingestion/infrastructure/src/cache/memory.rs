use async_trait::async_trait;
use media_ingestion_application::{CacheError, CacheStore};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Process-local [`CacheStore`]. Expired entries are evicted when read and
/// swept on every write.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.entries.lock().await;
        let live = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.expires_at > Instant::now(),
        };
        if live {
            Ok(entries.get(key).map(|entry| entry.value.clone()))
        } else {
            entries.remove(key);
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_ingestion_application::CacheManager;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let store = InMemoryCacheStore::new();
        store
            .set("tmdb:tvChangedIds", b"[1,2]".to_vec(), Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(
            store.get("tmdb:tvChangedIds").await.unwrap(),
            Some(b"[1,2]".to_vec())
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("tmdb:tvChangedIds").await.unwrap(), None);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrap_recomputes_after_ttl() {
        let cache = CacheManager::new(Arc::new(InMemoryCacheStore::new()));
        let computes = AtomicUsize::new(0);
        let ttl = Duration::from_secs(300);
        let counter = &computes;
        let compute = move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) as i64;
            Ok::<_, CacheError>(vec![n, 42])
        };

        let first = cache.wrap("tmdb:movieChangedIds", ttl, compute).await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;
        let second = cache.wrap("tmdb:movieChangedIds", ttl, compute).await.unwrap();
        assert_eq!(first, vec![0, 42]);
        assert_eq!(second, first);
        assert_eq!(computes.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(181)).await;
        let third = cache.wrap("tmdb:movieChangedIds", ttl, compute).await.unwrap();
        assert_eq!(third, vec![1, 42]);
        assert_eq!(computes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_sweeps_expired_entries() {
        let store = InMemoryCacheStore::new();
        for key in ["a", "b", "c"] {
            store
                .set(key, b"v".to_vec(), Duration::from_secs(10))
                .await
                .unwrap();
        }
        tokio::time::advance(Duration::from_secs(11)).await;

        store
            .set("d", b"v".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryCacheStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
