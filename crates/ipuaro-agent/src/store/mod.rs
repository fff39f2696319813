//! Durable state: the key-value transport seam and the typed index store.

mod index_store;
mod kv;
mod redis;

pub use index_store::IndexStore;
pub use kv::{Kv, KvError, KvResult, KvWriteOp, MemoryKv};
pub use redis::RedisKv;
