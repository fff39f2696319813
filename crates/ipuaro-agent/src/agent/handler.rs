//! The agent loop: one cooperative cycle per user message.
//!
//! Per cycle: persist the user message, build the lazy context, stream the
//! model, dispatch any tool calls (results are appended to history before
//! the next round starts), and repeat until the model answers in plain
//! text. Never concurrent within a session.

use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use ipuaro_llm::{ChatOptions, ChatProvider, Delta, ToolCall};

use crate::agent::context::{build_context, estimate_tokens};
use crate::error::{AgentError, AgentResult};
use crate::session::domain::{ChatMessage, Role, Session, ToolCallRecord, ToolResult};
use crate::session::manager::SessionManager;
use crate::store::IndexStore;
use crate::tools::{Confirmation, ToolCategory, ToolCtx, ToolRegistry};

/// Upper bound on tool rounds per user message; guards runaway models.
pub const MAX_TOOL_ROUNDS: usize = 25;

/// Context block budget, in estimated tokens.
pub const CONTEXT_TOKEN_BUDGET: usize = 4_000;

/// History size (estimated tokens) past which compression is requested.
pub const COMPRESSION_THRESHOLD: u64 = 24_000;

/// Per-message options supplied by the embedding client.
pub struct MessageOptions<'a> {
    pub cancel: CancellationToken,
    /// Receives text deltas as they stream, for live display.
    pub on_text: Option<&'a (dyn Fn(&str) + Send + Sync)>,
}

impl Default for MessageOptions<'_> {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            on_text: None,
        }
    }
}

pub struct Agent {
    store: IndexStore,
    provider: Arc<dyn ChatProvider>,
    registry: ToolRegistry,
    sessions: SessionManager,
    root: PathBuf,
    auto_apply: bool,
    confirm: Arc<dyn Confirmation>,
}

impl Agent {
    pub fn new(
        store: IndexStore,
        provider: Arc<dyn ChatProvider>,
        root: PathBuf,
        auto_apply: bool,
        confirm: Arc<dyn Confirmation>,
    ) -> Self {
        Self {
            sessions: SessionManager::new(store.clone()),
            registry: ToolRegistry::with_builtins(),
            store,
            provider,
            root,
            auto_apply,
            confirm,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one user message to completion and return the final answer.
    pub async fn handle_message(
        &self,
        session: &mut Session,
        user_text: &str,
        opts: &MessageOptions<'_>,
    ) -> AgentResult<String> {
        let started = Instant::now();
        self.sessions.record_input(session, user_text).await?;
        self.sessions
            .append_message(session, ChatMessage::new(Role::User, user_text))
            .await?;

        let context = build_context(&self.store, &self.root, CONTEXT_TOKEN_BUDGET).await?;
        let definitions = self.registry.definitions();

        let mut final_text = String::new();
        for round in 0..MAX_TOOL_ROUNDS {
            if opts.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let messages = to_llm_messages(&context, &session.history);
            let mut stream = self
                .provider
                .chat_stream(&messages, &definitions, &ChatOptions::default())
                .await?;

            let mut text = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();
            while let Some(delta) = stream.next().await {
                // Cancellation is observed at every delta boundary; dropping
                // the stream closes the provider transport.
                if opts.cancel.is_cancelled() {
                    drop(stream);
                    self.sessions.flush(session).await?;
                    return Err(AgentError::Cancelled);
                }
                match delta? {
                    Delta::Text(chunk) => {
                        if let Some(on_text) = opts.on_text {
                            on_text(&chunk);
                        }
                        text.push_str(&chunk);
                    }
                    Delta::ToolCall(call) => calls.push(call),
                    Delta::Done { usage } => {
                        session.stats.total_tokens += usage.total();
                    }
                }
            }

            if calls.is_empty() {
                final_text = text;
                self.sessions
                    .append_message(session, ChatMessage::new(Role::Assistant, &final_text))
                    .await?;
                break;
            }

            if !text.is_empty() {
                self.sessions
                    .append_message(session, ChatMessage::new(Role::Assistant, &text))
                    .await?;
            }

            for call in calls {
                let result = self.run_tool(session, &call, opts).await?;
                let record = ToolCallRecord {
                    call_id: result.call_id.clone(),
                    name: call.name.clone(),
                    params: call.params.clone(),
                };
                self.sessions
                    .append_message(session, ChatMessage::tool(record, result))
                    .await?;
            }

            if round + 1 == MAX_TOOL_ROUNDS {
                log::warn!(
                    "agent: tool round budget ({MAX_TOOL_ROUNDS}) exhausted for session {}",
                    session.id
                );
                final_text = text;
            }
        }

        let history_tokens: u64 = session
            .history
            .iter()
            .map(|m| estimate_tokens(&m.content) + 16)
            .sum();
        session.context.token_usage = history_tokens;
        if history_tokens > COMPRESSION_THRESHOLD {
            session.context.needs_compression = true;
        }
        session.stats.total_time_ms += started.elapsed().as_millis() as u64;
        self.sessions.flush(session).await?;

        Ok(final_text)
    }

    async fn run_tool(
        &self,
        session: &mut Session,
        call: &ToolCall,
        opts: &MessageOptions<'_>,
    ) -> AgentResult<ToolResult> {
        let ctx = ToolCtx::new(
            self.root.clone(),
            self.store.clone(),
            session.id.clone(),
            self.auto_apply,
            Arc::clone(&self.confirm),
            opts.cancel.clone(),
        );
        let result = self.registry.dispatch(&call.name, &call.params, &ctx).await?;

        session.stats.tool_calls += 1;
        if result.success
            && let Some(path) = call.params.get("path").and_then(|v| v.as_str())
            && !session.context.files_in_context.iter().any(|p| p == path)
        {
            session.context.files_in_context.push(path.to_string());
        }
        let is_edit = self
            .registry
            .find(&call.name)
            .is_some_and(|t| t.category() == ToolCategory::Edit);
        if is_edit {
            if result.success {
                session.stats.edits_applied += 1;
            } else if result.is_cancelled() {
                session.stats.edits_rejected += 1;
            }
        }
        Ok(result)
    }
}

/// Project session history onto the provider message format. Tool history
/// entries become an assistant tool-call/tool-result pair so the wire
/// protocol sees the exchange it expects.
fn to_llm_messages(context: &str, history: &[ChatMessage]) -> Vec<ipuaro_llm::ChatMessage> {
    let mut messages = vec![ipuaro_llm::ChatMessage::system(format!(
        "You are ipuaro, a coding agent with tool access to an indexed project.\n\n{context}"
    ))];
    for entry in history {
        match entry.role {
            Role::User => messages.push(ipuaro_llm::ChatMessage::user(&entry.content)),
            Role::Assistant => {
                if !entry.content.is_empty() {
                    messages.push(ipuaro_llm::ChatMessage::assistant(&entry.content));
                }
            }
            Role::System => messages.push(ipuaro_llm::ChatMessage::system(&entry.content)),
            Role::Tool => {
                let (Some(call), Some(result)) = (&entry.tool_call, &entry.tool_result) else {
                    continue;
                };
                messages.push(ipuaro_llm::ChatMessage::assistant_tool_calls(vec![
                    ipuaro_llm::ToolCall {
                        call_id: call.call_id.clone(),
                        name: call.name.clone(),
                        params: call.params.clone(),
                    },
                ]));
                let payload = serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string());
                messages.push(ipuaro_llm::ChatMessage::tool_result(&call.call_id, payload));
            }
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ast::parse_source;
    use crate::index::types::{FileRecord, Lang};
    use crate::session::manager::StartOptions;
    use crate::store::MemoryKv;
    use crate::tools::test_support::ScriptedConfirm;
    use async_trait::async_trait;
    use ipuaro_llm::{DeltaStream, LlmError, PullProgress, Tool, Usage};
    use parking_lot::Mutex;
    use serde_json::json;
    use tempfile::TempDir;

    /// Provider double that replays scripted delta turns.
    struct ScriptedProvider {
        turns: Mutex<Vec<Vec<Delta>>>,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<Vec<Delta>>) -> Self {
            Self {
                turns: Mutex::new(turns),
            }
        }

        fn text_turn(text: &str) -> Vec<Delta> {
            vec![
                Delta::Text(text.to_string()),
                Delta::Done {
                    usage: Usage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                    },
                },
            ]
        }

        fn tool_turn(name: &str, params: serde_json::Value) -> Vec<Delta> {
            vec![
                Delta::ToolCall(ToolCall {
                    call_id: "provider-id".into(),
                    name: name.into(),
                    params,
                }),
                Delta::Done {
                    usage: Usage::default(),
                },
            ]
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn has_model(&self, _model: &str) -> Result<bool, LlmError> {
            Ok(true)
        }

        async fn pull_model(
            &self,
            _model: &str,
            _on_progress: &(dyn Fn(PullProgress) + Send + Sync),
        ) -> Result<(), LlmError> {
            Ok(())
        }

        async fn chat_stream(
            &self,
            _messages: &[ipuaro_llm::ChatMessage],
            _tools: &[Tool],
            _opts: &ChatOptions,
        ) -> Result<DeltaStream, LlmError> {
            let mut turns = self.turns.lock();
            let turn = if turns.is_empty() {
                vec![Delta::Done {
                    usage: Usage::default(),
                }]
            } else {
                turns.remove(0)
            };
            Ok(Box::pin(futures::stream::iter(turn.into_iter().map(Ok))))
        }
    }

    struct Fixture {
        agent: Agent,
        session: Session,
        confirm: Arc<ScriptedConfirm>,
        _dir: TempDir,
    }

    async fn fixture(turns: Vec<Vec<Delta>>, auto_apply: bool, accept: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(Arc::new(MemoryKv::new()), "proj");

        let src = "export function f(){}";
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), src).unwrap();
        store
            .set_file(&FileRecord::from_content("src/a.ts", src, src.len() as u64, 1))
            .await
            .unwrap();
        store
            .set_ast("src/a.ts", &parse_source(src, Lang::Ts))
            .await
            .unwrap();

        let confirm = Arc::new(ScriptedConfirm::new(accept));
        let agent = Agent::new(
            store,
            Arc::new(ScriptedProvider::new(turns)),
            dir.path().to_path_buf(),
            auto_apply,
            confirm.clone(),
        );
        let session = agent
            .sessions()
            .start_session("proj", StartOptions::default())
            .await
            .unwrap()
            .session;
        Fixture {
            agent,
            session,
            confirm,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn plain_answer_round_trip() {
        let mut fx = fixture(vec![ScriptedProvider::text_turn("All good.")], false, true).await;
        let answer = fx
            .agent
            .handle_message(&mut fx.session, "status?", &MessageOptions::default())
            .await
            .unwrap();
        assert_eq!(answer, "All good.");
        assert_eq!(fx.session.history.len(), 2);
        assert_eq!(fx.session.history[0].role, Role::User);
        assert_eq!(fx.session.history[1].role, Role::Assistant);
        assert_eq!(fx.session.stats.total_tokens, 15);
        assert_eq!(fx.session.input_history, vec!["status?"]);

        // Persisted, not just in memory.
        let stored = fx
            .agent
            .sessions()
            .store()
            .load_session(&fx.session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.history.len(), 2);
    }

    #[tokio::test]
    async fn tool_call_round_then_answer() {
        let mut fx = fixture(
            vec![
                ScriptedProvider::tool_turn("get_lines", json!({"path": "src/a.ts"})),
                ScriptedProvider::text_turn("The file has one function."),
            ],
            false,
            true,
        )
        .await;
        let answer = fx
            .agent
            .handle_message(&mut fx.session, "what's in a.ts?", &MessageOptions::default())
            .await
            .unwrap();
        assert_eq!(answer, "The file has one function.");
        assert_eq!(fx.session.stats.tool_calls, 1);
        assert_eq!(fx.session.context.files_in_context, vec!["src/a.ts"]);

        // user, tool, assistant — the tool result lands before the answer.
        let roles: Vec<Role> = fx.session.history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Tool, Role::Assistant]);
        let tool_msg = &fx.session.history[1];
        let result = tool_msg.tool_result.as_ref().unwrap();
        assert!(result.success);
        assert_eq!(tool_msg.tool_call.as_ref().unwrap().name, "get_lines");
        assert!(result.call_id.starts_with("get_lines-"));
    }

    #[tokio::test]
    async fn invalid_params_become_error_result_and_loop_continues() {
        let mut fx = fixture(
            vec![
                ScriptedProvider::tool_turn("get_lines", json!({})),
                ScriptedProvider::text_turn("Recovered."),
            ],
            false,
            true,
        )
        .await;
        let answer = fx
            .agent
            .handle_message(&mut fx.session, "go", &MessageOptions::default())
            .await
            .unwrap();
        assert_eq!(answer, "Recovered.");
        let tool_result = fx.session.history[1].tool_result.as_ref().unwrap();
        assert!(!tool_result.success);
        assert!(tool_result.error.as_deref().unwrap().contains("path"));
    }

    #[tokio::test]
    async fn edit_requires_confirmation_and_rejection_counts() {
        let mut fx = fixture(
            vec![
                ScriptedProvider::tool_turn(
                    "edit_lines",
                    json!({"path": "src/a.ts", "start": 1, "end": 1, "content": "x"}),
                ),
                ScriptedProvider::text_turn("Understood, not editing."),
            ],
            false,
            false,
        )
        .await;
        fx.agent
            .handle_message(&mut fx.session, "edit it", &MessageOptions::default())
            .await
            .unwrap();

        assert_eq!(fx.confirm.prompt_count(), 1, "confirmation was requested");
        assert_eq!(fx.session.stats.edits_rejected, 1);
        assert_eq!(fx.session.stats.edits_applied, 0);
        let result = fx.session.history[1].tool_result.as_ref().unwrap();
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn auto_apply_skips_confirmation_and_applies() {
        let mut fx = fixture(
            vec![
                ScriptedProvider::tool_turn(
                    "edit_lines",
                    json!({"path": "src/a.ts", "start": 1, "end": 1,
                           "content": "export function f(){return 1}"}),
                ),
                ScriptedProvider::text_turn("Edited."),
            ],
            true,
            false, // would reject if ever prompted
        )
        .await;
        fx.agent
            .handle_message(&mut fx.session, "edit it", &MessageOptions::default())
            .await
            .unwrap();

        assert_eq!(fx.confirm.prompt_count(), 0);
        assert_eq!(fx.session.stats.edits_applied, 1);
        let stack = fx
            .agent
            .sessions()
            .store()
            .get_undo_stack(&fx.session.id)
            .await
            .unwrap();
        assert_eq!(stack.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_does_nothing_more() {
        let mut fx = fixture(vec![ScriptedProvider::text_turn("never seen")], false, true).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let opts = MessageOptions {
            cancel,
            on_text: None,
        };
        let err = fx
            .agent
            .handle_message(&mut fx.session, "hello", &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn streamed_text_reaches_callback() {
        let mut fx = fixture(vec![ScriptedProvider::text_turn("chunk")], false, true).await;
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_clone = seen.clone();
        let on_text = move |chunk: &str| {
            seen_clone.lock().push_str(chunk);
        };
        let opts = MessageOptions {
            cancel: CancellationToken::new(),
            on_text: Some(&on_text),
        };
        fx.agent
            .handle_message(&mut fx.session, "hi", &opts)
            .await
            .unwrap();
        assert_eq!(*seen.lock(), "chunk");
    }
}
