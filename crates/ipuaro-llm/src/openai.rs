//! OpenAI-compatible provider: SSE streaming against a configurable base URL.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::chat::{
    ChatMessage, ChatOptions, ChatProvider, ChatRole, Delta, DeltaStream, PullProgress, Tool,
    ToolCall, Usage,
};
use crate::error::LlmError;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAi {
    api_base: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    http: reqwest::Client,
}

impl OpenAi {
    /// `api_key` falls back to the `OPENAI_API_KEY` environment variable.
    pub fn new(
        api_base: Option<&str>,
        api_key: Option<&str>,
        model: impl Into<String>,
        temperature: Option<f32>,
    ) -> Result<Self, LlmError> {
        let key = match api_key {
            Some(k) if !k.is_empty() => k.to_string(),
            _ => std::env::var("OPENAI_API_KEY").map_err(|_| {
                LlmError::InvalidRequest(
                    "no API key: set llm.apiKey in config or OPENAI_API_KEY in the environment"
                        .into(),
                )
            })?,
        };
        Ok(Self {
            api_base: api_base
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            api_key: key,
            model: model.into(),
            temperature,
            http: reqwest::Client::new(),
        })
    }
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiWireMessage>,
    stream: bool,
    stream_options: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
}

#[derive(Serialize)]
struct OpenAiWireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

fn to_wire_message(msg: &ChatMessage) -> OpenAiWireMessage {
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
                        "id": c.call_id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.params.to_string(),
                        }
                    })
                })
                .collect(),
        )
    };
    OpenAiWireMessage {
        role,
        content: msg.content.clone(),
        tool_calls,
        tool_call_id: msg.tool_call_id.clone(),
    }
}

/// Streaming response chunk.
#[derive(Deserialize, Debug)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiRawUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct OpenAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

/// Tool-call fragment; fields are optional because arguments arrive
/// incrementally keyed by `index`.
#[derive(Deserialize, Debug)]
struct OpenAiStreamToolCall {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    function: OpenAiStreamFunction,
}

#[derive(Deserialize, Debug)]
struct OpenAiStreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize, Debug)]
struct OpenAiRawUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Accumulates one tool call across argument fragments.
#[derive(Default, Debug)]
struct ToolCallState {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallState {
    fn into_call(self) -> ToolCall {
        let params = serde_json::from_str(&self.arguments)
            .unwrap_or_else(|_| serde_json::json!({ "_raw": self.arguments }));
        ToolCall {
            call_id: if self.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                self.id
            },
            name: self.name,
            params,
        }
    }
}

/// Events produced while folding SSE data lines.
enum SseEvent {
    Text(String),
    Usage(Usage),
    Finished,
}

/// Parse one SSE `data:` payload, updating the per-index assembly state.
fn parse_sse_data(
    data: &str,
    states: &mut HashMap<usize, ToolCallState>,
) -> Result<Vec<SseEvent>, LlmError> {
    if data == "[DONE]" {
        return Ok(vec![SseEvent::Finished]);
    }

    let chunk: OpenAiStreamChunk =
        serde_json::from_str(data).map_err(|e| LlmError::ResponseFormat {
            message: format!("bad SSE chunk: {e}"),
            raw: data.to_string(),
        })?;

    let mut events = Vec::new();
    for choice in &chunk.choices {
        if let Some(content) = &choice.delta.content
            && !content.is_empty()
        {
            events.push(SseEvent::Text(content.clone()));
        }
        if let Some(fragments) = &choice.delta.tool_calls {
            for fragment in fragments {
                let state = states.entry(fragment.index.unwrap_or(0)).or_default();
                if let Some(id) = &fragment.id {
                    state.id = id.clone();
                }
                if let Some(name) = &fragment.function.name {
                    state.name = name.clone();
                }
                state.arguments.push_str(&fragment.function.arguments);
            }
        }
        if choice.finish_reason.is_some() {
            events.push(SseEvent::Finished);
        }
    }
    if let Some(usage) = chunk.usage {
        events.push(SseEvent::Usage(Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }));
    }
    Ok(events)
}

/// Drain assembled tool-call states in index order.
fn drain_tool_calls(states: &mut HashMap<usize, ToolCallState>) -> Vec<ToolCall> {
    let mut indices: Vec<usize> = states.keys().copied().collect();
    indices.sort_unstable();
    indices
        .into_iter()
        .filter_map(|i| states.remove(&i))
        .filter(|s| !s.name.is_empty())
        .map(ToolCallState::into_call)
        .collect()
}

#[async_trait]
impl ChatProvider for OpenAi {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.api_base);
        match self.http.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn has_model(&self, _model: &str) -> Result<bool, LlmError> {
        // Remote catalogs are authoritative; presence is checked at request time.
        Ok(true)
    }

    async fn pull_model(
        &self,
        _model: &str,
        _on_progress: &(dyn Fn(PullProgress) + Send + Sync),
    ) -> Result<(), LlmError> {
        Err(LlmError::NotSupported(
            "openai models cannot be pulled locally".into(),
        ))
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
        opts: &ChatOptions,
    ) -> Result<DeltaStream, LlmError> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = OpenAiChatRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire_message).collect(),
            stream: true,
            stream_options: serde_json::json!({ "include_usage": true }),
            temperature: opts.temperature.or(self.temperature),
            tools: (!tools.is_empty()).then_some(tools),
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::http(&url, &e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let raw = resp.text().await.unwrap_or_default();
            return Err(LlmError::ResponseFormat {
                message: format!("chat completions returned {status}"),
                raw,
            });
        }

        let stream = try_stream! {
            let mut body = resp.bytes_stream();
            let mut buffer = String::new();
            let mut states: HashMap<usize, ToolCallState> = HashMap::new();
            let mut usage = Usage::default();
            let mut finished = false;
            'outer: while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| LlmError::http(&url, &e))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let Some(data) = line.trim().strip_prefix("data: ") else {
                        continue;
                    };
                    for event in parse_sse_data(data, &mut states)? {
                        match event {
                            SseEvent::Text(text) => yield Delta::Text(text),
                            SseEvent::Usage(u) => usage = u,
                            SseEvent::Finished => {
                                for call in drain_tool_calls(&mut states) {
                                    yield Delta::ToolCall(call);
                                }
                                finished = true;
                            }
                        }
                    }
                    // Usage arrives in a trailing chunk after finish_reason;
                    // stop once the buffer has no more complete lines.
                    if finished && !buffer.contains('\n') && buffer.trim().is_empty() {
                        break 'outer;
                    }
                }
            }
            yield Delta::Done { usage };
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_tool_call_across_fragments() {
        let mut states = HashMap::new();
        let first = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_lines","arguments":"{\"pa"}}]}}]}"#;
        let second = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"th\":\"src/a.ts\"}"}}]}}]}"#;
        let finish = r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#;

        parse_sse_data(first, &mut states).unwrap();
        parse_sse_data(second, &mut states).unwrap();
        let events = parse_sse_data(finish, &mut states).unwrap();
        assert!(matches!(events.as_slice(), [SseEvent::Finished]));

        let calls = drain_tool_calls(&mut states);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "call_1");
        assert_eq!(calls[0].name, "get_lines");
        assert_eq!(calls[0].params["path"], "src/a.ts");
    }

    #[test]
    fn malformed_arguments_preserved_as_raw() {
        let state = ToolCallState {
            id: "call_2".into(),
            name: "run_command".into(),
            arguments: "{not json".into(),
        };
        let call = state.into_call();
        assert_eq!(call.params["_raw"], "{not json");
    }

    #[test]
    fn done_sentinel_finishes() {
        let mut states = HashMap::new();
        let events = parse_sse_data("[DONE]", &mut states).unwrap();
        assert!(matches!(events.as_slice(), [SseEvent::Finished]));
    }

    #[test]
    fn usage_chunk_parsed() {
        let mut states = HashMap::new();
        let data = r#"{"choices":[],"usage":{"prompt_tokens":7,"completion_tokens":3}}"#;
        let events = parse_sse_data(data, &mut states).unwrap();
        match events.as_slice() {
            [SseEvent::Usage(u)] => {
                assert_eq!(u.prompt_tokens, 7);
                assert_eq!(u.completion_tokens, 3);
            }
            _ => panic!("expected usage event"),
        }
    }

    #[test]
    fn text_deltas_pass_through() {
        let mut states = HashMap::new();
        let data = r#"{"choices":[{"delta":{"content":"hello"}}]}"#;
        let events = parse_sse_data(data, &mut states).unwrap();
        match events.as_slice() {
            [SseEvent::Text(t)] => assert_eq!(t, "hello"),
            _ => panic!("expected text event"),
        }
    }
}
