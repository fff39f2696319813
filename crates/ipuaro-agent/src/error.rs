//! Structured error type for the agent core.
//!
//! Recoverable tool failures never travel through this type — they become
//! `ToolResult { success: false, .. }` values inside the loop. `AgentError`
//! is for failures that terminate the current operation (indexing, message
//! cycle, session load).

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("model missing: {0}")]
    ModelMissing(String),

    #[error("path escapes project root: {0}")]
    PathEscape(String),

    #[error("command blocked: {0}")]
    CommandBlocked(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl From<crate::store::KvError> for AgentError {
    fn from(e: crate::store::KvError) -> Self {
        match e {
            crate::store::KvError::Unavailable(msg) => AgentError::StoreUnavailable(msg),
            crate::store::KvError::Corrupt { key, reason } => {
                AgentError::Internal(format!("corrupt store value at {key}: {reason}"))
            }
        }
    }
}

impl From<ipuaro_llm::LlmError> for AgentError {
    fn from(e: ipuaro_llm::LlmError) -> Self {
        use ipuaro_llm::LlmError;
        match e {
            LlmError::ProviderUnavailable(name) => AgentError::ProviderUnavailable(name),
            LlmError::ModelMissing(model) => AgentError::ModelMissing(model),
            LlmError::Cancelled => AgentError::Cancelled,
            other => AgentError::ProviderUnavailable(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KvError;

    #[test]
    fn kv_unavailable_maps_to_store_unavailable() {
        let err: AgentError = KvError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, AgentError::StoreUnavailable(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn llm_model_missing_maps_through() {
        let err: AgentError = ipuaro_llm::LlmError::ModelMissing("llama3".into()).into();
        assert!(matches!(err, AgentError::ModelMissing(_)));
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(
            AgentError::PathEscape("../etc/passwd".into()).to_string(),
            "path escapes project root: ../etc/passwd"
        );
        assert_eq!(AgentError::Cancelled.to_string(), "cancelled");
    }
}
