//! Redis-backed [`Kv`] transport.
//!
//! Uses a `ConnectionManager` so reconnects are transparent; every failure
//! surfaces as [`KvError::Unavailable`] with the underlying reason.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;

use super::kv::{Kv, KvError, KvResult, KvWriteOp};

pub struct RedisKv {
    manager: ConnectionManager,
}

impl RedisKv {
    /// Connect to `redis://host:port/`. Fails fast when the server is down.
    pub async fn connect(url: &str) -> KvResult<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(unavailable)?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn unavailable(e: redis::RedisError) -> KvError {
    KvError::Unavailable(e.to_string())
}

#[async_trait]
impl Kv for RedisKv {
    async fn ping(&self) -> KvResult<()> {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(unavailable)
    }

    async fn get_string(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(unavailable)
    }

    async fn set_string(&self, key: &str, value: &str) -> KvResult<()> {
        let mut conn = self.conn();
        conn.set::<_, _, ()>(key, value).await.map_err(unavailable)
    }

    async fn get_hash(&self, key: &str) -> KvResult<Option<HashMap<String, String>>> {
        let mut conn = self.conn();
        let map: HashMap<String, String> = conn.hgetall(key).await.map_err(unavailable)?;
        // HGETALL returns an empty map for missing keys.
        Ok((!map.is_empty()).then_some(map))
    }

    async fn set_hash(&self, key: &str, fields: Vec<(String, String)>) -> KvResult<()> {
        let mut conn = self.conn();
        conn.hset_multiple::<_, _, _, ()>(key, &fields)
            .await
            .map_err(unavailable)
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.conn();
        let removed: usize = conn.del(key).await.map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.conn();
        conn.exists(key).await.map_err(unavailable)
    }

    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        // KEYS is acceptable here: namespaces are project-scoped and the
        // store holds one project index, not a shared production dataset.
        let mut conn = self.conn();
        let mut keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        keys.sort();
        Ok(keys)
    }

    async fn list_push_right(&self, key: &str, value: &str) -> KvResult<usize> {
        let mut conn = self.conn();
        conn.rpush(key, value).await.map_err(unavailable)
    }

    async fn list_pop_right(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn();
        conn.rpop(key, None).await.map_err(unavailable)
    }

    async fn list_range(&self, key: &str) -> KvResult<Vec<String>> {
        let mut conn = self.conn();
        conn.lrange(key, 0, -1).await.map_err(unavailable)
    }

    async fn list_len(&self, key: &str) -> KvResult<usize> {
        let mut conn = self.conn();
        conn.llen(key).await.map_err(unavailable)
    }

    async fn list_trim_to_last(&self, key: &str, keep: usize) -> KvResult<()> {
        let mut conn = self.conn();
        conn.ltrim::<_, ()>(key, -(keep as isize), -1)
            .await
            .map_err(unavailable)
    }

    async fn batch(&self, ops: Vec<KvWriteOp>) -> KvResult<()> {
        let mut pipe = redis::pipe();
        for op in &ops {
            match op {
                KvWriteOp::SetString { key, value } => {
                    pipe.set(key, value).ignore();
                }
                KvWriteOp::SetHash { key, fields } => {
                    pipe.hset_multiple(key, fields).ignore();
                }
                KvWriteOp::Delete { key } => {
                    pipe.del(key).ignore();
                }
                KvWriteOp::PushRight { key, value } => {
                    pipe.rpush(key, value).ignore();
                }
                KvWriteOp::TrimToLast { key, keep } => {
                    pipe.ltrim(key, -(*keep as isize), -1).ignore();
                }
                KvWriteOp::ListRemove { key, value } => {
                    pipe.cmd("LREM").arg(key).arg(0).arg(value).ignore();
                }
            }
        }
        let mut conn = self.conn();
        pipe.query_async::<()>(&mut conn).await.map_err(unavailable)
    }
}
