use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::RedisResult;
use shaku::{Component, Interface};
use tokio::sync::OnceCell;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1";

#[async_trait]
pub trait RedisConnection: Interface {
    async fn get_connection(&self) -> RedisResult<MultiplexedConnection>;
}

fn default_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string())
}

/// Opens one multiplexed connection on first use and hands out clones of it.
#[derive(Component)]
#[shaku(interface = RedisConnection)]
pub struct RedisConnectionManager {
    #[shaku(default = default_redis_url())]
    redis_url: String,

    #[shaku(default)]
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisConnectionManager {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            connection: OnceCell::new(),
        }
    }

    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }
}

#[async_trait]
impl RedisConnection for RedisConnectionManager {
    async fn get_connection(&self) -> RedisResult<MultiplexedConnection> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let client = redis::Client::open(self.redis_url.as_str())?;
                client.get_multiplexed_async_connection().await
            })
            .await?;
        Ok(connection.clone())
    }
}
