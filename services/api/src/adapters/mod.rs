pub mod db;
pub mod memory;
pub mod redis_counter;
pub mod storage;

pub use db::DbAdapter;
pub use memory::InMemoryCounterStore;
pub use redis_counter::RedisCounterStore;
pub use storage::LocalObjectStore;
