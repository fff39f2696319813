//! Sessions: the append-only dialogue domain model and its manager.

pub mod domain;
pub mod manager;

pub use domain::{
    ChatMessage, Role, Session, SessionContext, SessionStats, ToolCallRecord, ToolResult,
    UNDO_STACK_CAP, UndoEntry,
};
pub use manager::{SessionManager, StartOptions, StartedSession, UndoOutcome};
