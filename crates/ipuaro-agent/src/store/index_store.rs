//! Typed facade over the key-value transport.
//!
//! Owns every persisted entity and the key layout:
//!
//! ```text
//! ipuaro:{project}:file:{path}   hash  (lines, hash, size, mtime)
//! ipuaro:{project}:ast:{path}    string (FileAst JSON)
//! ipuaro:{project}:meta:{path}   string (FileMeta JSON)
//! ipuaro:{project}:symbols       string (SymbolIndex JSON)
//! ipuaro:{project}:deps          string (DepsGraph JSON)
//! ipuaro:{project}:config:{k}    string
//! ipuaro:session:{id}            hash  (project, created_at, …)
//! ipuaro:session:{id}:undo       list  (push-right / pop-right stack)
//! ipuaro:sessions:list           list  (session ids)
//! ```
//!
//! Single-operation atomicity only; multi-field session saves use one
//! pipelined batch. Readers must tolerate missing entries during a reindex.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{AgentError, AgentResult};
use crate::index::types::{DepsGraph, FileAst, FileMeta, FileRecord, SymbolIndex};
use crate::session::domain::{Session, UndoEntry, UNDO_STACK_CAP};
use crate::store::kv::{Kv, KvError, KvWriteOp};

const NS: &str = "ipuaro";

#[derive(Clone)]
pub struct IndexStore {
    kv: Arc<dyn Kv>,
    project: String,
}

impl IndexStore {
    pub fn new(kv: Arc<dyn Kv>, project: impl Into<String>) -> Self {
        Self {
            kv,
            project: project.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub async fn ping(&self) -> AgentResult<()> {
        Ok(self.kv.ping().await?)
    }

    fn file_key(&self, path: &str) -> String {
        format!("{NS}:{}:file:{path}", self.project)
    }

    fn ast_key(&self, path: &str) -> String {
        format!("{NS}:{}:ast:{path}", self.project)
    }

    fn meta_key(&self, path: &str) -> String {
        format!("{NS}:{}:meta:{path}", self.project)
    }

    fn symbols_key(&self) -> String {
        format!("{NS}:{}:symbols", self.project)
    }

    fn deps_key(&self) -> String {
        format!("{NS}:{}:deps", self.project)
    }

    fn config_key(&self, k: &str) -> String {
        format!("{NS}:{}:config:{k}", self.project)
    }

    fn session_key(id: &str) -> String {
        format!("{NS}:session:{id}")
    }

    fn undo_key(id: &str) -> String {
        format!("{NS}:session:{id}:undo")
    }

    fn sessions_list_key() -> String {
        format!("{NS}:sessions:list")
    }

    // ── files ────────────────────────────────────────────────────────────

    pub async fn get_file(&self, path: &str) -> AgentResult<Option<FileRecord>> {
        let key = self.file_key(path);
        let Some(fields) = self.kv.get_hash(&key).await? else {
            return Ok(None);
        };
        Ok(Some(decode_file_record(&key, path, &fields)?))
    }

    pub async fn set_file(&self, record: &FileRecord) -> AgentResult<()> {
        let key = self.file_key(&record.path);
        self.kv.set_hash(&key, encode_file_record(record)?).await?;
        Ok(())
    }

    pub async fn delete_file(&self, path: &str) -> AgentResult<()> {
        self.kv.delete(&self.file_key(path)).await?;
        Ok(())
    }

    pub async fn get_all_files(&self) -> AgentResult<BTreeMap<String, FileRecord>> {
        let prefix = format!("{NS}:{}:file:", self.project);
        let keys = self.kv.keys(&format!("{prefix}*")).await?;
        let mut out = BTreeMap::new();
        for key in keys {
            let path = key[prefix.len()..].to_string();
            if let Some(fields) = self.kv.get_hash(&key).await? {
                out.insert(path.clone(), decode_file_record(&key, &path, &fields)?);
            }
        }
        Ok(out)
    }

    pub async fn get_file_count(&self) -> AgentResult<usize> {
        let keys = self
            .kv
            .keys(&format!("{NS}:{}:file:*", self.project))
            .await?;
        Ok(keys.len())
    }

    // ── asts ─────────────────────────────────────────────────────────────

    pub async fn get_ast(&self, path: &str) -> AgentResult<Option<FileAst>> {
        self.get_json(&self.ast_key(path)).await
    }

    pub async fn set_ast(&self, path: &str, ast: &FileAst) -> AgentResult<()> {
        self.set_json(&self.ast_key(path), ast).await
    }

    pub async fn delete_ast(&self, path: &str) -> AgentResult<()> {
        self.kv.delete(&self.ast_key(path)).await?;
        Ok(())
    }

    pub async fn get_all_asts(&self) -> AgentResult<BTreeMap<String, FileAst>> {
        self.get_all_json(&format!("{NS}:{}:ast:", self.project)).await
    }

    // ── metas ────────────────────────────────────────────────────────────

    pub async fn get_meta(&self, path: &str) -> AgentResult<Option<FileMeta>> {
        self.get_json(&self.meta_key(path)).await
    }

    pub async fn set_meta(&self, path: &str, meta: &FileMeta) -> AgentResult<()> {
        self.set_json(&self.meta_key(path), meta).await
    }

    pub async fn delete_meta(&self, path: &str) -> AgentResult<()> {
        self.kv.delete(&self.meta_key(path)).await?;
        Ok(())
    }

    pub async fn get_all_metas(&self) -> AgentResult<BTreeMap<String, FileMeta>> {
        self.get_all_json(&format!("{NS}:{}:meta:", self.project)).await
    }

    // ── aggregates ───────────────────────────────────────────────────────

    pub async fn get_symbol_index(&self) -> AgentResult<Option<SymbolIndex>> {
        self.get_json(&self.symbols_key()).await
    }

    pub async fn set_symbol_index(&self, index: &SymbolIndex) -> AgentResult<()> {
        self.set_json(&self.symbols_key(), index).await
    }

    pub async fn get_deps_graph(&self) -> AgentResult<Option<DepsGraph>> {
        self.get_json(&self.deps_key()).await
    }

    pub async fn set_deps_graph(&self, graph: &DepsGraph) -> AgentResult<()> {
        self.set_json(&self.deps_key(), graph).await
    }

    // ── project config ───────────────────────────────────────────────────

    pub async fn get_project_config(&self, k: &str) -> AgentResult<Option<String>> {
        Ok(self.kv.get_string(&self.config_key(k)).await?)
    }

    pub async fn set_project_config(&self, k: &str, v: &str) -> AgentResult<()> {
        Ok(self.kv.set_string(&self.config_key(k), v).await?)
    }

    // ── sessions ─────────────────────────────────────────────────────────

    /// Persist every session field in one pipelined batch and register the
    /// id in the sessions list (deduplicated, most recent last).
    pub async fn save_session(&self, session: &Session) -> AgentResult<()> {
        let key = Self::session_key(&session.id);
        let ops = vec![
            KvWriteOp::SetHash {
                key,
                fields: encode_session(session)?,
            },
            KvWriteOp::ListRemove {
                key: Self::sessions_list_key(),
                value: session.id.clone(),
            },
            KvWriteOp::PushRight {
                key: Self::sessions_list_key(),
                value: session.id.clone(),
            },
        ];
        Ok(self.kv.batch(ops).await?)
    }

    pub async fn load_session(&self, id: &str) -> AgentResult<Option<Session>> {
        let key = Self::session_key(id);
        let Some(fields) = self.kv.get_hash(&key).await? else {
            return Ok(None);
        };
        Ok(Some(decode_session(&key, id, &fields)?))
    }

    pub async fn delete_session(&self, id: &str) -> AgentResult<()> {
        let ops = vec![
            KvWriteOp::Delete {
                key: Self::session_key(id),
            },
            KvWriteOp::Delete {
                key: Self::undo_key(id),
            },
            KvWriteOp::ListRemove {
                key: Self::sessions_list_key(),
                value: id.to_string(),
            },
        ];
        Ok(self.kv.batch(ops).await?)
    }

    pub async fn session_exists(&self, id: &str) -> AgentResult<bool> {
        Ok(self.kv.exists(&Self::session_key(id)).await?)
    }

    /// All sessions, optionally filtered by project, newest activity first.
    pub async fn list_sessions(&self, project: Option<&str>) -> AgentResult<Vec<Session>> {
        let ids = self.kv.list_range(&Self::sessions_list_key()).await?;
        let mut sessions = Vec::new();
        for id in ids {
            if let Some(session) = self.load_session(&id).await?
                && project.is_none_or(|p| session.project_name == p)
            {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(sessions)
    }

    pub async fn get_latest_session(&self, project: &str) -> AgentResult<Option<Session>> {
        Ok(self.list_sessions(Some(project)).await?.into_iter().next())
    }

    /// Bump `last_activity_at` without rewriting history.
    pub async fn touch_session(&self, id: &str) -> AgentResult<()> {
        let key = Self::session_key(id);
        let Some(fields) = self.kv.get_hash(&key).await? else {
            return Err(AgentError::NotFound(format!("session {id}")));
        };
        let previous = fields
            .get("last_activity")
            .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let mut now = OffsetDateTime::now_utc();
        if now <= previous {
            now = previous + time::Duration::nanoseconds(1);
        }
        let encoded = now
            .format(&Rfc3339)
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        self.kv
            .set_hash(&key, vec![("last_activity".to_string(), encoded)])
            .await?;
        Ok(())
    }

    pub async fn clear_all_sessions(&self) -> AgentResult<usize> {
        let ids = self.kv.list_range(&Self::sessions_list_key()).await?;
        let count = ids.len();
        let mut ops = Vec::with_capacity(count * 2 + 1);
        for id in ids {
            ops.push(KvWriteOp::Delete {
                key: Self::session_key(&id),
            });
            ops.push(KvWriteOp::Delete {
                key: Self::undo_key(&id),
            });
        }
        ops.push(KvWriteOp::Delete {
            key: Self::sessions_list_key(),
        });
        self.kv.batch(ops).await?;
        Ok(count)
    }

    // ── undo stack ───────────────────────────────────────────────────────

    /// Push an entry and trim the oldest past the cap, pipelined so there is
    /// no read-modify-write window.
    pub async fn push_undo_entry(&self, session_id: &str, entry: &UndoEntry) -> AgentResult<()> {
        let value = serde_json::to_string(entry).map_err(|e| AgentError::Internal(e.to_string()))?;
        let key = Self::undo_key(session_id);
        let ops = vec![
            KvWriteOp::PushRight {
                key: key.clone(),
                value,
            },
            KvWriteOp::TrimToLast {
                key,
                keep: UNDO_STACK_CAP,
            },
        ];
        Ok(self.kv.batch(ops).await?)
    }

    pub async fn pop_undo_entry(&self, session_id: &str) -> AgentResult<Option<UndoEntry>> {
        let key = Self::undo_key(session_id);
        let Some(raw) = self.kv.list_pop_right(&key).await? else {
            return Ok(None);
        };
        let entry = serde_json::from_str(&raw).map_err(|e| {
            AgentError::from(KvError::Corrupt {
                key,
                reason: e.to_string(),
            })
        })?;
        Ok(Some(entry))
    }

    /// Oldest first; the last element is the next to pop.
    pub async fn get_undo_stack(&self, session_id: &str) -> AgentResult<Vec<UndoEntry>> {
        let key = Self::undo_key(session_id);
        let raw = self.kv.list_range(&key).await?;
        raw.iter()
            .map(|s| {
                serde_json::from_str(s).map_err(|e| {
                    AgentError::from(KvError::Corrupt {
                        key: key.clone(),
                        reason: e.to_string(),
                    })
                })
            })
            .collect()
    }

    // ── helpers ──────────────────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> AgentResult<Option<T>> {
        let Some(raw) = self.kv.get_string(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw).map_err(|e| {
            AgentError::from(KvError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(Some(value))
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> AgentResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| AgentError::Internal(e.to_string()))?;
        Ok(self.kv.set_string(key, &raw).await?)
    }

    async fn get_all_json<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> AgentResult<BTreeMap<String, T>> {
        let keys = self.kv.keys(&format!("{prefix}*")).await?;
        let mut out = BTreeMap::new();
        for key in keys {
            let path = key[prefix.len()..].to_string();
            if let Some(value) = self.get_json(&key).await? {
                out.insert(path, value);
            }
        }
        Ok(out)
    }
}

fn corrupt(key: &str, reason: impl Into<String>) -> AgentError {
    AgentError::from(KvError::Corrupt {
        key: key.to_string(),
        reason: reason.into(),
    })
}

fn encode_file_record(record: &FileRecord) -> AgentResult<Vec<(String, String)>> {
    let lines =
        serde_json::to_string(&record.lines).map_err(|e| AgentError::Internal(e.to_string()))?;
    Ok(vec![
        ("lines".to_string(), lines),
        ("hash".to_string(), record.hash.clone()),
        ("size".to_string(), record.size.to_string()),
        ("mtime".to_string(), record.mtime.to_string()),
    ])
}

fn decode_file_record(
    key: &str,
    path: &str,
    fields: &HashMap<String, String>,
) -> AgentResult<FileRecord> {
    let lines = fields
        .get("lines")
        .ok_or_else(|| corrupt(key, "missing lines field"))?;
    let lines: Vec<String> =
        serde_json::from_str(lines).map_err(|e| corrupt(key, e.to_string()))?;
    Ok(FileRecord {
        path: path.to_string(),
        lines,
        hash: fields.get("hash").cloned().unwrap_or_default(),
        size: fields
            .get("size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        mtime: fields
            .get("mtime")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    })
}

fn to_json<T: Serialize>(value: &T) -> AgentResult<String> {
    serde_json::to_string(value).map_err(|e| AgentError::Internal(e.to_string()))
}

fn encode_session(session: &Session) -> AgentResult<Vec<(String, String)>> {
    let fmt = |t: &OffsetDateTime| -> AgentResult<String> {
        t.format(&Rfc3339)
            .map_err(|e| AgentError::Internal(e.to_string()))
    };
    Ok(vec![
        ("project".to_string(), session.project_name.clone()),
        ("created_at".to_string(), fmt(&session.created_at)?),
        ("last_activity".to_string(), fmt(&session.last_activity_at)?),
        ("history".to_string(), to_json(&session.history)?),
        ("context".to_string(), to_json(&session.context)?),
        ("stats".to_string(), to_json(&session.stats)?),
        ("input_history".to_string(), to_json(&session.input_history)?),
    ])
}

fn decode_session(key: &str, id: &str, fields: &HashMap<String, String>) -> AgentResult<Session> {
    let parse_time = |field: &str| -> AgentResult<OffsetDateTime> {
        let raw = fields
            .get(field)
            .ok_or_else(|| corrupt(key, format!("missing {field} field")))?;
        OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| corrupt(key, e.to_string()))
    };
    let history = match fields.get("history") {
        Some(raw) => serde_json::from_str(raw).map_err(|e| corrupt(key, e.to_string()))?,
        None => Vec::new(),
    };
    let context = match fields.get("context") {
        Some(raw) => serde_json::from_str(raw).map_err(|e| corrupt(key, e.to_string()))?,
        None => Default::default(),
    };
    let stats = match fields.get("stats") {
        Some(raw) => serde_json::from_str(raw).map_err(|e| corrupt(key, e.to_string()))?,
        None => Default::default(),
    };
    let input_history = match fields.get("input_history") {
        Some(raw) => serde_json::from_str(raw).map_err(|e| corrupt(key, e.to_string()))?,
        None => Vec::new(),
    };

    Ok(Session {
        id: id.to_string(),
        project_name: fields.get("project").cloned().unwrap_or_default(),
        created_at: parse_time("created_at")?,
        last_activity_at: parse_time("last_activity")?,
        history,
        context,
        stats,
        input_history,
    })
}
