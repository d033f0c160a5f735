pub mod cache;
pub mod connection;
pub mod providers;
pub mod rate_limiting;
pub mod state;
pub mod storage;

pub use cache::{InMemoryCacheStore, RedisCacheStore};
pub use connection::{RedisConnection, RedisConnectionManager, DEFAULT_REDIS_URL};
pub use rate_limiting::{InMemoryRateLimiter, RedisRateLimiter};
pub use state::{InMemoryTaskRunRepository, RedisTaskRunRepository};
pub use storage::{SqliteActivityRepository, SqliteMediaRepository, SqliteStorage};
