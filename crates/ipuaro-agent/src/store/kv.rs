//! Transport seam for the durable key-value store.
//!
//! Three value kinds are enough for the whole data model: strings (JSON
//! blobs), hashes (field maps) and lists (stacks and registries). `batch`
//! applies a group of writes in one pipelined round trip; it is not a
//! transaction and readers may observe intermediate states.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type KvResult<T> = Result<T, KvError>;

/// A single write in a pipelined batch.
#[derive(Debug, Clone)]
pub enum KvWriteOp {
    SetString { key: String, value: String },
    SetHash { key: String, fields: Vec<(String, String)> },
    Delete { key: String },
    PushRight { key: String, value: String },
    /// Keep only the last `keep` list elements.
    TrimToLast { key: String, keep: usize },
    /// Remove every occurrence of `value` from the list.
    ListRemove { key: String, value: String },
}

/// Async key-value transport. Hash writes merge fields (HSET semantics);
/// list push/pop operate on the right end so lists behave as stacks.
#[async_trait]
pub trait Kv: Send + Sync {
    async fn ping(&self) -> KvResult<()>;

    async fn get_string(&self, key: &str) -> KvResult<Option<String>>;
    async fn set_string(&self, key: &str, value: &str) -> KvResult<()>;

    /// Returns `None` for a missing key; a stored hash always has fields.
    async fn get_hash(&self, key: &str) -> KvResult<Option<HashMap<String, String>>>;
    async fn set_hash(&self, key: &str, fields: Vec<(String, String)>) -> KvResult<()>;

    async fn delete(&self, key: &str) -> KvResult<bool>;
    async fn exists(&self, key: &str) -> KvResult<bool>;

    /// Keys matching a glob pattern (`*` matches any run of characters).
    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>>;

    /// Returns the list length after the push.
    async fn list_push_right(&self, key: &str, value: &str) -> KvResult<usize>;
    async fn list_pop_right(&self, key: &str) -> KvResult<Option<String>>;
    async fn list_range(&self, key: &str) -> KvResult<Vec<String>>;
    async fn list_len(&self, key: &str) -> KvResult<usize>;
    async fn list_trim_to_last(&self, key: &str, keep: usize) -> KvResult<()>;

    async fn batch(&self, ops: Vec<KvWriteOp>) -> KvResult<()>;
}

/// Glob match where `*` matches any run of characters, including `/`.
/// Mirrors the store's KEYS pattern semantics for the in-memory fake.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let mut segments = pattern.split('*');
    let Some(first) = segments.next() else {
        return pattern == text;
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    let mut last_segment: Option<&str> = None;
    for segment in segments {
        if let Some(prev) = last_segment.take() {
            match rest.find(prev) {
                Some(pos) => rest = &rest[pos + prev.len()..],
                None => return false,
            }
        }
        last_segment = Some(segment);
    }
    match last_segment {
        // Pattern had no '*' at all.
        None => rest.is_empty(),
        Some("") => true,
        Some(tail) => rest.ends_with(tail),
    }
}

#[derive(Debug, Clone)]
enum MemoryValue {
    Str(String),
    Hash(HashMap<String, String>),
    List(Vec<String>),
}

/// In-process store used by unit tests and as a no-Redis fallback. Not
/// durable; contents die with the process.
#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<HashMap<String, MemoryValue>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn ping(&self) -> KvResult<()> {
        Ok(())
    }

    async fn get_string(&self, key: &str) -> KvResult<Option<String>> {
        match self.data.lock().get(key) {
            Some(MemoryValue::Str(s)) => Ok(Some(s.clone())),
            _ => Ok(None),
        }
    }

    async fn set_string(&self, key: &str, value: &str) -> KvResult<()> {
        self.data
            .lock()
            .insert(key.to_string(), MemoryValue::Str(value.to_string()));
        Ok(())
    }

    async fn get_hash(&self, key: &str) -> KvResult<Option<HashMap<String, String>>> {
        match self.data.lock().get(key) {
            Some(MemoryValue::Hash(h)) => Ok(Some(h.clone())),
            _ => Ok(None),
        }
    }

    async fn set_hash(&self, key: &str, fields: Vec<(String, String)>) -> KvResult<()> {
        let mut data = self.data.lock();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| MemoryValue::Hash(HashMap::new()));
        if let MemoryValue::Hash(h) = entry {
            h.extend(fields);
        } else {
            *entry = MemoryValue::Hash(fields.into_iter().collect());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self.data.lock().contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let data = self.data.lock();
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn list_push_right(&self, key: &str, value: &str) -> KvResult<usize> {
        let mut data = self.data.lock();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| MemoryValue::List(Vec::new()));
        if let MemoryValue::List(list) = entry {
            list.push(value.to_string());
            Ok(list.len())
        } else {
            *entry = MemoryValue::List(vec![value.to_string()]);
            Ok(1)
        }
    }

    async fn list_pop_right(&self, key: &str) -> KvResult<Option<String>> {
        let mut data = self.data.lock();
        match data.get_mut(key) {
            Some(MemoryValue::List(list)) => Ok(list.pop()),
            _ => Ok(None),
        }
    }

    async fn list_range(&self, key: &str) -> KvResult<Vec<String>> {
        match self.data.lock().get(key) {
            Some(MemoryValue::List(list)) => Ok(list.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn list_len(&self, key: &str) -> KvResult<usize> {
        match self.data.lock().get(key) {
            Some(MemoryValue::List(list)) => Ok(list.len()),
            _ => Ok(0),
        }
    }

    async fn list_trim_to_last(&self, key: &str, keep: usize) -> KvResult<()> {
        let mut data = self.data.lock();
        if let Some(MemoryValue::List(list)) = data.get_mut(key)
            && list.len() > keep
        {
            let drop = list.len() - keep;
            list.drain(..drop);
        }
        Ok(())
    }

    async fn batch(&self, ops: Vec<KvWriteOp>) -> KvResult<()> {
        for op in ops {
            match op {
                KvWriteOp::SetString { key, value } => self.set_string(&key, &value).await?,
                KvWriteOp::SetHash { key, fields } => self.set_hash(&key, fields).await?,
                KvWriteOp::Delete { key } => {
                    self.delete(&key).await?;
                }
                KvWriteOp::PushRight { key, value } => {
                    self.list_push_right(&key, &value).await?;
                }
                KvWriteOp::TrimToLast { key, keep } => self.list_trim_to_last(&key, keep).await?,
                KvWriteOp::ListRemove { key, value } => {
                    let mut data = self.data.lock();
                    if let Some(MemoryValue::List(list)) = data.get_mut(&key) {
                        list.retain(|v| v != &value);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_match_covers_store_patterns() {
        assert!(glob_match("ipuaro:p:file:*", "ipuaro:p:file:src/a.ts"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("ipuaro:session:*:undo", "ipuaro:session:abc:undo"));
        assert!(!glob_match("ipuaro:p:file:*", "ipuaro:p:ast:src/a.ts"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn string_and_hash_kinds() {
        let kv = MemoryKv::new();
        kv.set_string("k", "v").await.unwrap();
        assert_eq!(kv.get_string("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(kv.get_hash("k").await.unwrap(), None);

        kv.set_hash("h", vec![("a".into(), "1".into())]).await.unwrap();
        kv.set_hash("h", vec![("b".into(), "2".into())]).await.unwrap();
        let hash = kv.get_hash("h").await.unwrap().unwrap();
        assert_eq!(hash.len(), 2, "hash writes merge fields");
    }

    #[tokio::test]
    async fn list_behaves_as_stack() {
        let kv = MemoryKv::new();
        for i in 0..3 {
            kv.list_push_right("stack", &i.to_string()).await.unwrap();
        }
        assert_eq!(kv.list_len("stack").await.unwrap(), 3);
        assert_eq!(kv.list_pop_right("stack").await.unwrap().as_deref(), Some("2"));
        assert_eq!(kv.list_len("stack").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn trim_keeps_newest() {
        let kv = MemoryKv::new();
        for i in 0..5 {
            kv.list_push_right("l", &i.to_string()).await.unwrap();
        }
        kv.list_trim_to_last("l", 3).await.unwrap();
        assert_eq!(kv.list_range("l").await.unwrap(), vec!["2", "3", "4"]);
    }

    #[tokio::test]
    async fn batch_applies_in_order() {
        let kv = MemoryKv::new();
        kv.batch(vec![
            KvWriteOp::SetString {
                key: "a".into(),
                value: "1".into(),
            },
            KvWriteOp::PushRight {
                key: "l".into(),
                value: "x".into(),
            },
            KvWriteOp::PushRight {
                key: "l".into(),
                value: "y".into(),
            },
            KvWriteOp::TrimToLast {
                key: "l".into(),
                keep: 1,
            },
        ])
        .await
        .unwrap();
        assert_eq!(kv.get_string("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(kv.list_range("l").await.unwrap(), vec!["y"]);
    }
}
