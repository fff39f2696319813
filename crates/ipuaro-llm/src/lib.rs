//! Streaming chat client for local and OpenAI-compatible LLM backends.
//!
//! The crate exposes one seam, [`ChatProvider`], and two implementations:
//! [`ollama::Ollama`] (local HTTP, NDJSON streaming) and
//! [`openai::OpenAi`] (OpenAI-compatible HTTPS, SSE streaming). Both emit a
//! uniform [`Delta`] stream so callers never branch on the backend.

pub mod chat;
pub mod error;
pub mod ollama;
pub mod openai;

pub use chat::{
    ChatMessage, ChatOptions, ChatProvider, ChatRole, Delta, DeltaStream, FunctionTool,
    PullProgress, Tool, ToolCall, Usage,
};
pub use error::LlmError;
