//! Error type shared by all chat providers.

use thiserror::Error;

/// Errors surfaced by [`crate::ChatProvider`] implementations.
///
/// Transport failures carry the URL they hit; response-shape failures carry
/// the raw payload so callers can log what the backend actually sent.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("provider '{0}' is not reachable")]
    ProviderUnavailable(String),

    #[error("model '{0}' is not available on the provider")]
    ModelMissing(String),

    #[error("unexpected response format: {message}")]
    ResponseFormat { message: String, raw: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("stream cancelled")]
    Cancelled,

    #[error("operation not supported by this provider: {0}")]
    NotSupported(String),
}

impl LlmError {
    pub(crate) fn http(url: impl Into<String>, err: &reqwest::Error) -> Self {
        LlmError::Http {
            url: url.into(),
            reason: err.to_string(),
        }
    }
}
