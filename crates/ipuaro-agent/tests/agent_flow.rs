//! End-to-end flow over the public API: index a project, drive the agent
//! with a scripted provider, apply an edit under confirmation, undo it.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use ipuaro_agent::session::StartOptions;
use ipuaro_agent::tools::Confirmation;
use ipuaro_agent::{Agent, IndexStore, MemoryKv, MessageOptions, execute_index};
use ipuaro_llm::{
    ChatMessage, ChatOptions, ChatProvider, Delta, DeltaStream, LlmError, PullProgress, Tool,
    ToolCall, Usage,
};

struct ReplayProvider {
    turns: Mutex<Vec<Vec<Delta>>>,
}

impl ReplayProvider {
    fn new(turns: Vec<Vec<Delta>>) -> Self {
        Self {
            turns: Mutex::new(turns),
        }
    }
}

#[async_trait]
impl ChatProvider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    fn model(&self) -> &str {
        "replay-model"
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
        _messages: &[ChatMessage],
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

struct YesAndCount(Mutex<usize>);

#[async_trait]
impl Confirmation for YesAndCount {
    async fn request(&self, _summary: &str) -> bool {
        *self.0.lock() += 1;
        true
    }
}

fn tool_turn(name: &str, params: serde_json::Value) -> Vec<Delta> {
    vec![
        Delta::ToolCall(ToolCall {
            call_id: "replayed".into(),
            name: name.into(),
            params,
        }),
        Delta::Done {
            usage: Usage::default(),
        },
    ]
}

fn text_turn(text: &str) -> Vec<Delta> {
    vec![
        Delta::Text(text.into()),
        Delta::Done {
            usage: Usage {
                prompt_tokens: 20,
                completion_tokens: 10,
            },
        },
    ]
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn index_chat_edit_undo_round_trip() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/a.ts", "export function f(){}");
    write(dir.path(), "src/b.ts", "import {f} from './a'; f();");

    let store = IndexStore::new(Arc::new(MemoryKv::new()), "flow-proj");
    let stats = execute_index(&store, dir.path(), &[], &mut |_| {})
        .await
        .unwrap();
    assert_eq!(stats.files_indexed, 2);

    // Aggregates: the symbol index and both dependency directions.
    let symbols = store.get_symbol_index().await.unwrap().unwrap();
    assert_eq!(symbols.lookup("f")[0].path, "src/a.ts");
    let graph = store.get_deps_graph().await.unwrap().unwrap();
    assert!(graph.imported_by["src/a.ts"].contains("src/b.ts"));

    let provider = Arc::new(ReplayProvider::new(vec![
        tool_turn("find_references", json!({"symbol": "f", "path": "src"})),
        tool_turn(
            "edit_lines",
            json!({
                "path": "src/a.ts",
                "start": 1,
                "end": 1,
                "content": "export function f(){return 1}"
            }),
        ),
        text_turn("Changed f to return 1."),
    ]));
    let confirmations = Arc::new(YesAndCount(Mutex::new(0)));

    let agent = Agent::new(
        store.clone(),
        provider,
        dir.path().to_path_buf(),
        false,
        confirmations.clone(),
    );

    let mut session = agent
        .sessions()
        .start_session("flow-proj", StartOptions::default())
        .await
        .unwrap()
        .session;

    let answer = agent
        .handle_message(&mut session, "make f return 1", &MessageOptions::default())
        .await
        .unwrap();
    assert_eq!(answer, "Changed f to return 1.");

    // Both tool rounds ran; only the edit asked for confirmation.
    assert_eq!(session.stats.tool_calls, 2);
    assert_eq!(session.stats.edits_applied, 1);
    assert_eq!(*confirmations.0.lock(), 1);

    // find_references saw the definition plus two uses.
    let refs_result = session.history[1].tool_result.as_ref().unwrap();
    assert!(refs_result.success);
    assert_eq!(refs_result.data.as_ref().unwrap()["count"], 3);

    // The edit is on disk, in the index, and undoable.
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/a.ts")).unwrap(),
        "export function f(){return 1}\n"
    );
    assert_eq!(store.get_undo_stack(&session.id).await.unwrap().len(), 1);

    let outcome = agent
        .sessions()
        .undo_last(&mut session, dir.path())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.file_path, "src/a.ts");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/a.ts")).unwrap(),
        "export function f(){}\n"
    );
    assert_eq!(session.stats.edits_applied, 0);
    assert!(store.get_undo_stack(&session.id).await.unwrap().is_empty());

    // The session survives a reload with history intact.
    let reloaded = store.load_session(&session.id).await.unwrap().unwrap();
    assert_eq!(reloaded.history.len(), session.history.len());
    assert_eq!(reloaded.stats.tool_calls, 2);
}
