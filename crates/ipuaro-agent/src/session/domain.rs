//! Session domain types: dialogue history, stats, context state and undo.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum retained undo entries per session; the oldest is discarded on
/// overflow.
pub const UNDO_STACK_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A tool call as logged in session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub name: String,
    pub params: Value,
}

/// Outcome of one tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, data: Value, execution_time_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            data: Some(data),
            error: None,
            suggestion: None,
            execution_time_ms,
        }
    }

    pub fn failed(
        call_id: impl Into<String>,
        error: impl Into<String>,
        suggestion: Option<String>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            suggestion,
            execution_time_ms,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_deref() == Some("cancelled")
    }
}

/// One entry in the append-only session dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            tool_call: None,
            tool_result: None,
        }
    }

    pub fn tool(call: ToolCallRecord, result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: String::new(),
            timestamp: OffsetDateTime::now_utc(),
            tool_call: Some(call),
            tool_result: Some(result),
        }
    }
}

/// Everything needed to revert one accepted edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub file_path: String,
    pub previous_content: Vec<String>,
    pub new_content: Vec<String>,
    pub description: String,
}

impl UndoEntry {
    pub fn new(
        file_path: impl Into<String>,
        previous_content: Vec<String>,
        new_content: Vec<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: OffsetDateTime::now_utc(),
            file_path: file_path.into(),
            previous_content,
            new_content,
            description: description.into(),
        }
    }

    /// True when this entry recorded a file creation; undoing it removes the
    /// file instead of writing empty content.
    pub fn created_file(&self) -> bool {
        self.previous_content.is_empty() && self.description.starts_with("create_file")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub files_in_context: Vec<String>,
    pub token_usage: u64,
    pub needs_compression: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_tokens: u64,
    pub total_time_ms: u64,
    pub tool_calls: u32,
    pub edits_applied: u32,
    pub edits_rejected: u32,
}

/// An append-only dialogue plus derived state, keyed by id.
///
/// The undo stack is persisted separately as a store list (bounded at
/// [`UNDO_STACK_CAP`]) and is not part of this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_at: OffsetDateTime,
    pub history: Vec<ChatMessage>,
    pub context: SessionContext,
    pub stats: SessionStats,
    pub input_history: Vec<String>,
}

impl Session {
    pub fn new(project_name: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            project_name: project_name.into(),
            created_at: now,
            last_activity_at: now,
            history: Vec::new(),
            context: SessionContext::default(),
            stats: SessionStats::default(),
            input_history: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        let now = OffsetDateTime::now_utc();
        // lastActivityAt must strictly increase even on sub-tick calls.
        self.last_activity_at = if now > self.last_activity_at {
            now
        } else {
            self.last_activity_at + time::Duration::nanoseconds(1)
        };
    }
}
