//! State store backends.
//!
//! Each backend only moves raw strings; key layout and value encoding come
//! from `authgate_auth::store`, so every backend reads and writes the same
//! shapes.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryStateStore;
#[cfg(feature = "redis")]
pub use redis::RedisStateStore;
