//! Registry of available tools: lookup, wire definitions, dispatch with
//! call-id assignment and timing.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::{AgentError, AgentResult};
use crate::session::domain::ToolResult;
use crate::tools::{Tool, ToolCategory, ToolCtx, ToolError};

pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
    call_counter: AtomicU64,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            call_counter: AtomicU64::new(0),
        }
    }

    /// Registry with all 18 built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for tool in crate::tools::read::tools() {
            registry.add(tool);
        }
        for tool in crate::tools::edit::tools() {
            registry.add(tool);
        }
        for tool in crate::tools::search::tools() {
            registry.add(tool);
        }
        for tool in crate::tools::analysis::tools() {
            registry.add(tool);
        }
        for tool in crate::tools::git::tools() {
            registry.add(tool);
        }
        for tool in crate::tools::run::tools() {
            registry.add(tool);
        }
        registry
    }

    pub fn add(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name(), tool);
        self
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn by_category(&self, category: ToolCategory) -> Vec<&'static str> {
        self.tools
            .values()
            .filter(|t| t.category() == category)
            .map(|t| t.name())
            .collect()
    }

    pub fn requires_confirmation(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .map(|t| t.requires_confirmation())
            .unwrap_or(false)
    }

    /// Tools that never prompt.
    pub fn safe_tools(&self) -> Vec<&'static str> {
        self.tools
            .values()
            .filter(|t| !t.requires_confirmation())
            .map(|t| t.name())
            .collect()
    }

    /// Tools gated behind confirmation.
    pub fn confirmation_tools(&self) -> Vec<&'static str> {
        self.tools
            .values()
            .filter(|t| t.requires_confirmation())
            .map(|t| t.name())
            .collect()
    }

    /// Wire definitions for every registered tool.
    pub fn definitions(&self) -> Vec<ipuaro_llm::Tool> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    fn next_call_id(&self, name: &str) -> String {
        let n = self.call_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{name}-{n}")
    }

    /// Execute one tool call end to end: validate, run with timeout and
    /// cancellation, and fold any recoverable failure into the result.
    ///
    /// Only a dead store escalates as an error and ends the message cycle.
    pub async fn dispatch(
        &self,
        name: &str,
        params: &Value,
        ctx: &ToolCtx,
    ) -> AgentResult<ToolResult> {
        let call_id = self.next_call_id(name);
        let started = Instant::now();
        let elapsed = |s: Instant| s.elapsed().as_millis() as u64;

        let Some(tool) = self.find(name) else {
            return Ok(ToolResult::failed(
                call_id,
                format!("unknown tool '{name}'"),
                Some(format!("available tools: {}", self.names().join(", "))),
                elapsed(started),
            ));
        };

        if let Err(message) = tool.validate_params(params) {
            return Ok(ToolResult::failed(call_id, message, None, elapsed(started)));
        }

        let outcome = tokio::select! {
            outcome = tokio::time::timeout(tool.timeout(), tool.execute(params, ctx)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::Timeout(tool.timeout())),
                }
            }
            _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled),
        };

        match outcome {
            Ok(data) => Ok(ToolResult::ok(call_id, data, elapsed(started))),
            Err(ToolError::Agent(e @ AgentError::StoreUnavailable(_))) => Err(e),
            Err(ToolError::Cancelled) => {
                log::debug!("tool {name} cancelled");
                Ok(ToolResult::failed(call_id, "cancelled", None, elapsed(started)))
            }
            Err(err) => {
                log::debug!("tool {name} failed: {err}");
                let suggestion = err.suggestion();
                Ok(ToolResult::failed(call_id, err.to_string(), suggestion, elapsed(started)))
            }
        }
    }
}
