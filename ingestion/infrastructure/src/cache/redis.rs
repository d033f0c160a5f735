use async_trait::async_trait;
use media_ingestion_application::{CacheError, CacheStore};
use redis::aio::MultiplexedConnection;
use shaku::Component;
use std::sync::Arc;
use std::time::Duration;

use crate::connection::RedisConnection;

const KEY_PREFIX: &str = "cache:";

#[derive(Component)]
#[shaku(interface = CacheStore)]
pub struct RedisCacheStore {
    #[shaku(inject)]
    redis: Arc<dyn RedisConnection>,
}

impl RedisCacheStore {
    pub fn new(redis: Arc<dyn RedisConnection>) -> Self {
        Self { redis }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        self.redis
            .get_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}

fn redis_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("GET")
            .arg(redis_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        redis::cmd("SET")
            .arg(redis_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("DEL")
            .arg(redis_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
            .map(|_: i64| ())
    }
}
