//! Tool interface: uniform `execute(params, ctx)` trait objects, the
//! execution context with its confirmation gate, and the registry that
//! assigns call ids and timings.
//!
//! Confirmation is requested by the tools themselves through
//! [`ToolCtx::request_confirmation`], so a tool can run its precondition
//! checks (conflict detection, command classification) before prompting.
//! `requires_confirmation` is metadata for clients listing safe vs gated
//! tools.

pub mod analysis;
pub mod edit;
pub mod git;
pub mod read;
pub mod registry;
pub mod run;
pub mod search;

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::store::IndexStore;

pub use registry::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Read,
    Edit,
    Search,
    Analysis,
    Git,
    Run,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ToolCategory::Read => "read",
            ToolCategory::Edit => "edit",
            ToolCategory::Search => "search",
            ToolCategory::Analysis => "analysis",
            ToolCategory::Git => "git",
            ToolCategory::Run => "run",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    fn json_name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

/// Declared parameter of a tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolParam {
    pub name: &'static str,
    pub param_type: ParamType,
    pub required: bool,
    pub enum_values: &'static [&'static str],
    pub description: &'static str,
}

impl ToolParam {
    pub const fn required(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self {
            name,
            param_type,
            required: true,
            enum_values: &[],
            description,
        }
    }

    pub const fn optional(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self {
            name,
            param_type,
            required: false,
            enum_values: &[],
            description,
        }
    }

    pub const fn with_enum(mut self, values: &'static [&'static str]) -> Self {
        self.enum_values = values;
        self
    }
}

/// How the human answers confirmation prompts. Supplied by the embedding
/// client (TUI, CLI); tests use scripted implementations.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn request(&self, summary: &str) -> bool;
}

/// Accepts everything. Used when no interactive client is attached.
pub struct AcceptAll;

#[async_trait]
impl Confirmation for AcceptAll {
    async fn request(&self, _summary: &str) -> bool {
        true
    }
}

/// Execution context handed to every tool.
#[derive(Clone)]
pub struct ToolCtx {
    /// Absolute project root; every path is contained within it.
    pub root: PathBuf,
    pub store: IndexStore,
    pub session_id: String,
    /// Skip confirmation prompts entirely.
    pub auto_apply: bool,
    pub cancel: CancellationToken,
    confirm: Arc<dyn Confirmation>,
}

impl ToolCtx {
    pub fn new(
        root: PathBuf,
        store: IndexStore,
        session_id: impl Into<String>,
        auto_apply: bool,
        confirm: Arc<dyn Confirmation>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            root,
            store,
            session_id: session_id.into(),
            auto_apply,
            cancel,
            confirm,
        }
    }

    /// Gate an action on human approval. Auto-apply answers yes without
    /// prompting; a `false` reply means the tool must report "cancelled".
    pub async fn request_confirmation(&self, summary: &str) -> bool {
        if self.auto_apply {
            return true;
        }
        self.confirm.request(summary).await
    }
}

/// Recoverable tool failure. Becomes a `ToolResult { success: false }`;
/// only a dead store escalates out of the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),

    #[error("{what} not found")]
    NotFound {
        what: String,
        suggestion: Option<String>,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("path escapes project root: {0}")]
    PathEscape(String),

    #[error("command blocked: {0}")]
    CommandBlocked(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ToolError::NotFound {
            what: what.into(),
            suggestion: None,
        }
    }

    pub fn not_found_with(what: impl Into<String>, suggestion: impl Into<String>) -> Self {
        ToolError::NotFound {
            what: what.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// One-line hint surfaced next to the error, where one is safe to give.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ToolError::NotFound { suggestion, .. } => suggestion.clone(),
            ToolError::Conflict(_) => {
                Some("reindex the project to pick up external changes".to_string())
            }
            ToolError::CommandBlocked(_) => {
                Some("this command is on the deny-list and will never run".to_string())
            }
            _ => None,
        }
    }
}

/// A named, parameterized operation the model may request.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn category(&self) -> ToolCategory;
    fn parameters(&self) -> &'static [ToolParam];

    /// Whether this tool mutates state and therefore prompts (unless
    /// auto-apply is on).
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Upper bound on one execution.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Cheap structural validation before execution.
    fn validate_params(&self, params: &Value) -> Result<(), String> {
        validate_against(self.parameters(), params)
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError>;

    /// Wire definition advertised to the model.
    fn definition(&self) -> ipuaro_llm::Tool {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in self.parameters() {
            let mut schema = serde_json::Map::new();
            schema.insert("type".into(), Value::String(param.param_type.json_name().into()));
            schema.insert("description".into(), Value::String(param.description.into()));
            if !param.enum_values.is_empty() {
                schema.insert(
                    "enum".into(),
                    Value::Array(
                        param
                            .enum_values
                            .iter()
                            .map(|v| Value::String((*v).into()))
                            .collect(),
                    ),
                );
            }
            properties.insert(param.name.into(), Value::Object(schema));
            if param.required {
                required.push(Value::String(param.name.into()));
            }
        }
        ipuaro_llm::Tool::function(ipuaro_llm::FunctionTool {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        })
    }
}

fn validate_against(declared: &[ToolParam], params: &Value) -> Result<(), String> {
    let object = match params {
        Value::Object(map) => map,
        Value::Null => return missing_required(declared),
        _ => return Err("params must be a JSON object".to_string()),
    };
    for param in declared {
        match object.get(param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    return Err(format!("missing required param '{}'", param.name));
                }
            }
            Some(value) => {
                if !param.param_type.matches(value) {
                    return Err(format!(
                        "param '{}' must be a {}",
                        param.name,
                        param.param_type.json_name()
                    ));
                }
                if !param.enum_values.is_empty()
                    && let Some(s) = value.as_str()
                    && !param.enum_values.contains(&s)
                {
                    return Err(format!(
                        "param '{}' must be one of: {}",
                        param.name,
                        param.enum_values.join(", ")
                    ));
                }
            }
        }
    }
    Ok(())
}

fn missing_required(declared: &[ToolParam]) -> Result<(), String> {
    match declared.iter().find(|p| p.required) {
        Some(param) => Err(format!("missing required param '{}'", param.name)),
        None => Ok(()),
    }
}

// Shared helpers for tools operating on indexed files.

/// Load the indexed record for a path, with containment applied first.
pub(crate) async fn load_record(
    ctx: &ToolCtx,
    path: &str,
) -> Result<crate::index::types::FileRecord, ToolError> {
    crate::safety::contain_path(&ctx.root, path)
        .map_err(|_| ToolError::PathEscape(path.to_string()))?;
    match ctx.store.get_file(path).await {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(ToolError::not_found_with(
            format!("file '{path}'"),
            "the path must be project-relative and indexed; run the indexer first",
        )),
        Err(e) => Err(ToolError::Agent(e)),
    }
}

pub(crate) async fn load_ast(
    ctx: &ToolCtx,
    path: &str,
) -> Result<crate::index::types::FileAst, ToolError> {
    match ctx.store.get_ast(path).await {
        Ok(Some(ast)) => Ok(ast),
        Ok(None) => Err(ToolError::not_found_with(
            format!("AST for '{path}'"),
            "only ts/tsx/js/jsx files have structural summaries",
        )),
        Err(e) => Err(ToolError::Agent(e)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::MemoryKv;
    use parking_lot::Mutex;

    /// Scripted confirmation double that records every prompt.
    pub struct ScriptedConfirm {
        answer: bool,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedConfirm {
        pub fn new(answer: bool) -> Self {
            Self {
                answer,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompt_count(&self) -> usize {
            self.prompts.lock().len()
        }
    }

    #[async_trait]
    impl Confirmation for ScriptedConfirm {
        async fn request(&self, summary: &str) -> bool {
            self.prompts.lock().push(summary.to_string());
            self.answer
        }
    }

    pub fn memory_ctx(root: PathBuf, confirm: Arc<dyn Confirmation>) -> ToolCtx {
        let store = IndexStore::new(Arc::new(MemoryKv::new()), "test-proj");
        ToolCtx::new(
            root,
            store,
            "session-test",
            false,
            confirm,
            CancellationToken::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &[ToolParam] = &[
        ToolParam::required("path", ParamType::String, "file path"),
        ToolParam::optional("start", ParamType::Integer, "first line"),
        ToolParam::optional("type", ParamType::String, "marker").with_enum(&["TODO", "FIXME"]),
    ];

    #[test]
    fn validate_accepts_good_params() {
        let params = serde_json::json!({"path": "src/a.ts", "start": 3});
        assert!(validate_against(PARAMS, &params).is_ok());
    }

    #[test]
    fn validate_rejects_missing_required() {
        let err = validate_against(PARAMS, &serde_json::json!({"start": 3})).unwrap_err();
        assert!(err.contains("path"));
        let err = validate_against(PARAMS, &Value::Null).unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn validate_rejects_wrong_type_and_enum() {
        let err = validate_against(PARAMS, &serde_json::json!({"path": 7})).unwrap_err();
        assert!(err.contains("string"));
        let err =
            validate_against(PARAMS, &serde_json::json!({"path": "a", "type": "NOPE"})).unwrap_err();
        assert!(err.contains("one of"));
    }

    #[test]
    fn suggestion_for_conflict_mentions_reindex() {
        let err = ToolError::Conflict("src/a.ts modified since last index".into());
        assert!(err.suggestion().unwrap().contains("reindex"));
    }
}
