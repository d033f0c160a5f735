pub mod memory;
pub mod redis;

pub use memory::InMemoryTaskRunRepository;
pub use redis::RedisTaskRunRepository;
