//! Chat message, tool and stream-delta types plus the provider trait.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::error::LlmError;

/// Role of a chat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the conversation sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool calls the assistant requested (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Which call this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    /// Assistant message that requested tool calls.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// The result of one tool call, fed back to the model.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id, or synthesized when the backend sends none.
    pub call_id: String,
    pub name: String,
    /// Parsed JSON arguments. Invalid argument JSON from the backend is
    /// preserved as a string under `{"_raw": …}` so the caller can report it.
    pub params: Value,
}

/// Function-tool definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    /// JSON schema for the parameters object.
    pub parameters: Value,
}

/// A tool as carried on the wire (`{"type":"function","function":{…}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionTool,
}

impl Tool {
    pub fn function(function: FunctionTool) -> Self {
        Self {
            tool_type: "function".to_string(),
            function,
        }
    }
}

/// Token usage reported by the backend at end of stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// One streamed event from a chat backend.
///
/// Text and tool-call deltas arrive in generation order; `Done` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delta {
    Text(String),
    ToolCall(ToolCall),
    Done { usage: Usage },
}

/// Stream of deltas. Dropping the stream closes the transport; no further
/// deltas are delivered after the caller stops consuming.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, LlmError>> + Send>>;

/// Progress of a model pull (ollama only).
#[derive(Debug, Clone, Default)]
pub struct PullProgress {
    pub status: String,
    pub completed: u64,
    pub total: u64,
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Overrides the provider's configured temperature when set.
    pub temperature: Option<f32>,
}

/// Uniform interface over chat backends.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider name ("ollama", "openai").
    fn name(&self) -> &str;

    /// The model this provider is configured to use.
    fn model(&self) -> &str;

    /// Whether the backend answers at all.
    async fn is_available(&self) -> bool;

    /// Whether the configured backend has the named model locally.
    ///
    /// Remote providers that cannot enumerate models return `Ok(true)`.
    async fn has_model(&self, model: &str) -> Result<bool, LlmError>;

    /// Download a model, reporting progress. Only meaningful for ollama;
    /// other providers return [`LlmError::NotSupported`].
    async fn pull_model(
        &self,
        model: &str,
        on_progress: &(dyn Fn(PullProgress) + Send + Sync),
    ) -> Result<(), LlmError>;

    /// Stream a chat completion with tool definitions attached.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
        opts: &ChatOptions,
    ) -> Result<DeltaStream, LlmError>;
}
