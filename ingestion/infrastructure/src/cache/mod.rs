pub mod memory;
pub mod redis;

pub use memory::InMemoryCacheStore;
pub use redis::RedisCacheStore;
