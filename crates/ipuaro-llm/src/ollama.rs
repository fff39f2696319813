//! Ollama provider: local HTTP API with NDJSON streaming.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::chat::{
    ChatMessage, ChatOptions, ChatProvider, ChatRole, Delta, DeltaStream, PullProgress, Tool,
    ToolCall, Usage,
};
use crate::error::LlmError;

/// Client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct Ollama {
    base_url: Url,
    model: String,
    temperature: Option<f32>,
    http: reqwest::Client,
}

impl Ollama {
    pub const DEFAULT_HOST: &'static str = "http://127.0.0.1:11434";

    pub fn new(host: Option<&str>, model: impl Into<String>, temperature: Option<f32>) -> Result<Self, LlmError> {
        let base = host.unwrap_or(Self::DEFAULT_HOST);
        let base_url = Url::parse(base)
            .map_err(|e| LlmError::InvalidRequest(format!("invalid ollama host '{base}': {e}")))?;
        Ok(Self {
            base_url,
            model: model.into(),
            temperature,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, LlmError> {
        self.base_url
            .join(path)
            .map_err(|e| LlmError::InvalidRequest(format!("invalid ollama endpoint '{path}': {e}")))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = self.endpoint("/api/tags")?;
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LlmError::http(url.as_str(), &e))?;
        if !resp.status().is_success() {
            return Err(LlmError::ProviderUnavailable("ollama".into()));
        }
        let tags: OllamaTags = resp
            .json()
            .await
            .map_err(|e| LlmError::http(url.as_str(), &e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaTagEntry>,
}

#[derive(Deserialize)]
struct OllamaTagEntry {
    name: String,
}

/// Request payload for `/api/chat`.
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaRequestOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
}

#[derive(Serialize)]
struct OllamaRequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct OllamaChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<Value>>,
}

fn to_wire_message(msg: &ChatMessage) -> OllamaChatMessage {
    let role = match msg.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    };
    let tool_calls = if msg.tool_calls.is_empty() {
        None
    } else {
        Some(
            msg.tool_calls
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "function": { "name": c.name, "arguments": c.params }
                    })
                })
                .collect(),
        )
    };
    OllamaChatMessage {
        role,
        content: msg.content.clone(),
        tool_calls,
    }
}

/// One NDJSON line from `/api/chat`.
#[derive(Deserialize)]
struct OllamaStreamLine {
    #[serde(default)]
    message: Option<OllamaStreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaStreamMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaStreamToolCall>,
}

#[derive(Deserialize)]
struct OllamaStreamToolCall {
    function: OllamaStreamFunction,
}

#[derive(Deserialize)]
struct OllamaStreamFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct OllamaPullLine {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ChatProvider for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        self.list_models().await.is_ok()
    }

    async fn has_model(&self, model: &str) -> Result<bool, LlmError> {
        let names = self.list_models().await?;
        // "llama3" matches the locally tagged "llama3:latest".
        Ok(names
            .iter()
            .any(|n| n == model || n.strip_suffix(":latest") == Some(model)))
    }

    async fn pull_model(
        &self,
        model: &str,
        on_progress: &(dyn Fn(PullProgress) + Send + Sync),
    ) -> Result<(), LlmError> {
        let url = self.endpoint("/api/pull")?;
        let resp = self
            .http
            .post(url.clone())
            .json(&serde_json::json!({ "name": model, "stream": true }))
            .send()
            .await
            .map_err(|e| LlmError::http(url.as_str(), &e))?;
        if !resp.status().is_success() {
            return Err(LlmError::ModelMissing(model.to_string()));
        }

        let mut body = resp.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| LlmError::http(url.as_str(), &e))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let parsed: OllamaPullLine =
                    serde_json::from_str(line).map_err(|e| LlmError::ResponseFormat {
                        message: format!("bad pull progress line: {e}"),
                        raw: line.to_string(),
                    })?;
                if let Some(err) = parsed.error {
                    return Err(LlmError::ModelMissing(format!("{model}: {err}")));
                }
                on_progress(PullProgress {
                    status: parsed.status,
                    completed: parsed.completed.unwrap_or(0),
                    total: parsed.total.unwrap_or(0),
                });
            }
        }
        Ok(())
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
        opts: &ChatOptions,
    ) -> Result<DeltaStream, LlmError> {
        let url = self.endpoint("/api/chat")?;
        let temperature = opts.temperature.or(self.temperature);
        let request = OllamaChatRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire_message).collect(),
            stream: true,
            options: temperature.map(|t| OllamaRequestOptions {
                temperature: Some(t),
            }),
            tools: (!tools.is_empty()).then_some(tools),
        };

        let resp = self
            .http
            .post(url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::http(url.as_str(), &e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let raw = resp.text().await.unwrap_or_default();
            return Err(LlmError::ResponseFormat {
                message: format!("ollama chat returned {status}"),
                raw,
            });
        }

        let url_str = url.to_string();
        let stream = try_stream! {
            let mut body = resp.bytes_stream();
            let mut buffer = String::new();
            let mut usage = Usage::default();
            'outer: while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| LlmError::http(url_str.as_str(), &e))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let parsed: OllamaStreamLine = serde_json::from_str(line)
                        .map_err(|e| LlmError::ResponseFormat {
                            message: format!("bad chat stream line: {e}"),
                            raw: line.to_string(),
                        })?;
                    if let Some(message) = parsed.message {
                        if !message.content.is_empty() {
                            yield Delta::Text(message.content);
                        }
                        for call in message.tool_calls {
                            // Ollama sends complete calls and no ids.
                            yield Delta::ToolCall(ToolCall {
                                call_id: uuid::Uuid::new_v4().to_string(),
                                name: call.function.name,
                                params: call.function.arguments,
                            });
                        }
                    }
                    if parsed.done {
                        usage.prompt_tokens = parsed.prompt_eval_count.unwrap_or(0);
                        usage.completion_tokens = parsed.eval_count.unwrap_or(0);
                        yield Delta::Done { usage };
                        break 'outer;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_host() {
        assert!(Ollama::new(Some("not a url"), "llama3", None).is_err());
    }

    #[test]
    fn stream_line_parses_tool_call() {
        let line = r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"get_lines","arguments":{"path":"src/a.ts"}}}]},"done":false}"#;
        let parsed: OllamaStreamLine = serde_json::from_str(line).unwrap();
        let msg = parsed.message.unwrap();
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].function.name, "get_lines");
        assert!(!parsed.done);
    }

    #[test]
    fn stream_line_parses_final_counts() {
        let line = r#"{"done":true,"prompt_eval_count":12,"eval_count":34}"#;
        let parsed: OllamaStreamLine = serde_json::from_str(line).unwrap();
        assert!(parsed.done);
        assert_eq!(parsed.prompt_eval_count, Some(12));
        assert_eq!(parsed.eval_count, Some(34));
    }

    #[test]
    fn wire_message_maps_tool_role() {
        let msg = ChatMessage::tool_result("call-1", "{\"ok\":true}");
        let wire = to_wire_message(&msg);
        assert_eq!(wire.role, "tool");
        assert!(wire.tool_calls.is_none());
    }
}
