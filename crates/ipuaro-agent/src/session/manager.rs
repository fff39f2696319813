//! Session lifecycle: start/resume, history appends, stats and undo.
//!
//! The manager owns the in-memory [`Session`] during a run and flushes to
//! the store on every mutation, so a crash never loses more than the
//! mutation in flight.

use std::path::Path;

use crate::error::{AgentError, AgentResult};
use crate::index::ast::parse_source;
use crate::index::types::{FileRecord, Lang};
use crate::safety::contain_path;
use crate::session::domain::{ChatMessage, Session, UndoEntry};
use crate::store::IndexStore;
use crate::tools::edit::write_atomic;

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Resume this exact session.
    pub session_id: Option<String>,
    /// Always create a fresh session.
    pub force_new: bool,
}

#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session: Session,
    pub is_new: bool,
}

/// Outcome of [`SessionManager::undo_last`].
#[derive(Debug, Clone)]
pub struct UndoOutcome {
    pub file_path: String,
    pub description: String,
    /// False when the undo removed a created file instead of rewriting it.
    pub restored_content: bool,
}

#[derive(Clone)]
pub struct SessionManager {
    store: IndexStore,
}

impl SessionManager {
    pub fn new(store: IndexStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Open a session for `project_name`:
    ///
    /// - `force_new` creates a fresh session;
    /// - an explicit existing `session_id` is loaded and touched;
    /// - otherwise the project's most recent session is resumed;
    /// - with nothing to resume, a fresh session is created.
    pub async fn start_session(
        &self,
        project_name: &str,
        opts: StartOptions,
    ) -> AgentResult<StartedSession> {
        if opts.force_new {
            let session = Session::new(project_name);
            self.store.save_session(&session).await?;
            log::info!("session: created {} for {project_name}", session.id);
            return Ok(StartedSession {
                session,
                is_new: true,
            });
        }

        if let Some(id) = &opts.session_id {
            // An unknown id falls through to the resume/create chain below.
            match self.store.load_session(id).await? {
                Some(mut session) => {
                    session.touch();
                    self.store.save_session(&session).await?;
                    return Ok(StartedSession {
                        session,
                        is_new: false,
                    });
                }
                None => log::warn!("session: {id} not found, falling back"),
            }
        }

        if let Some(mut session) = self.store.get_latest_session(project_name).await? {
            session.touch();
            self.store.save_session(&session).await?;
            log::debug!("session: resumed {}", session.id);
            return Ok(StartedSession {
                session,
                is_new: false,
            });
        }

        let session = Session::new(project_name);
        self.store.save_session(&session).await?;
        log::info!("session: created {} for {project_name}", session.id);
        Ok(StartedSession {
            session,
            is_new: true,
        })
    }

    /// Append to history and persist. Messages are append-only; order in the
    /// store matches call order.
    pub async fn append_message(
        &self,
        session: &mut Session,
        message: ChatMessage,
    ) -> AgentResult<()> {
        session.history.push(message);
        session.touch();
        self.store.save_session(session).await
    }

    /// Record a line of user input for prompt history.
    pub async fn record_input(&self, session: &mut Session, line: &str) -> AgentResult<()> {
        session.input_history.push(line.to_string());
        self.store.save_session(session).await
    }

    /// Persist after a stats/context mutation done by the caller.
    pub async fn flush(&self, session: &mut Session) -> AgentResult<()> {
        session.touch();
        self.store.save_session(session).await
    }

    pub async fn push_undo(&self, session: &Session, entry: &UndoEntry) -> AgentResult<()> {
        self.store.push_undo_entry(&session.id, entry).await
    }

    pub async fn undo_stack(&self, session: &Session) -> AgentResult<Vec<UndoEntry>> {
        self.store.get_undo_stack(&session.id).await
    }

    /// Revert the most recent accepted edit.
    ///
    /// Restores the previous content atomically (or deletes a file the entry
    /// created), refreshes the stored record, and decrements
    /// `stats.edits_applied`. Returns `None` when the stack is empty.
    pub async fn undo_last(
        &self,
        session: &mut Session,
        root: &Path,
    ) -> AgentResult<Option<UndoOutcome>> {
        let Some(entry) = self.store.pop_undo_entry(&session.id).await? else {
            return Ok(None);
        };

        let abs = contain_path(root, &entry.file_path)?;
        let restored_content = if entry.created_file() {
            if abs.exists() {
                std::fs::remove_file(&abs)
                    .map_err(|e| AgentError::Internal(format!("remove {}: {e}", abs.display())))?;
            }
            self.store.delete_file(&entry.file_path).await?;
            self.store.delete_ast(&entry.file_path).await?;
            self.store.delete_meta(&entry.file_path).await?;
            false
        } else {
            write_atomic(&abs, &entry.previous_content)
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            let content = entry.previous_content.join("\n");
            let size = std::fs::metadata(&abs).map(|m| m.len()).unwrap_or(0);
            let mtime = time::OffsetDateTime::now_utc().unix_timestamp();
            let record = FileRecord::from_content(&entry.file_path, &content, size, mtime);
            self.store.set_file(&record).await?;
            if let Some(lang) = Lang::from_path(&entry.file_path) {
                self.store
                    .set_ast(&entry.file_path, &parse_source(&content, lang))
                    .await?;
            }
            true
        };

        session.stats.edits_applied = session.stats.edits_applied.saturating_sub(1);
        self.flush(session).await?;

        log::info!("undo: reverted {} ({})", entry.file_path, entry.description);
        Ok(Some(UndoOutcome {
            file_path: entry.file_path,
            description: entry.description,
            restored_content,
        }))
    }

    pub async fn list_sessions(&self, project: Option<&str>) -> AgentResult<Vec<Session>> {
        self.store.list_sessions(project).await
    }

    pub async fn delete_session(&self, id: &str) -> AgentResult<()> {
        self.store.delete_session(id).await
    }

    pub async fn clear_all_sessions(&self) -> AgentResult<usize> {
        self.store.clear_all_sessions().await
    }
}
