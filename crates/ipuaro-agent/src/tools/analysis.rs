//! Analysis tools: dependency queries, complexity and comment-marker scans.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::LazyLock;

use crate::tools::{ParamType, Tool, ToolCategory, ToolCtx, ToolError, ToolParam, load_record};

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetDependencies),
        Arc::new(GetDependents),
        Arc::new(GetComplexity),
        Arc::new(GetTodos),
    ]
}

pub struct GetDependencies;

#[async_trait]
impl Tool for GetDependencies {
    fn name(&self) -> &'static str {
        "get_dependencies"
    }

    fn description(&self) -> &'static str {
        "Internal files a given file imports."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] =
            &[ToolParam::required("path", ParamType::String, "Project-relative file path")];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        load_record(ctx, path).await?;
        let graph = ctx
            .store
            .get_deps_graph()
            .await
            .map_err(ToolError::Agent)?
            .unwrap_or_default();
        Ok(json!({
            "path": path,
            "dependencies": graph.dependencies_of(path),
        }))
    }
}

pub struct GetDependents;

#[async_trait]
impl Tool for GetDependents {
    fn name(&self) -> &'static str {
        "get_dependents"
    }

    fn description(&self) -> &'static str {
        "Internal files that import a given file."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] =
            &[ToolParam::required("path", ParamType::String, "Project-relative file path")];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        load_record(ctx, path).await?;
        let graph = ctx
            .store
            .get_deps_graph()
            .await
            .map_err(ToolError::Agent)?
            .unwrap_or_default();
        Ok(json!({
            "path": path,
            "dependents": graph.dependents_of(path),
        }))
    }
}

pub struct GetComplexity;

#[async_trait]
impl Tool for GetComplexity {
    fn name(&self) -> &'static str {
        "get_complexity"
    }

    fn description(&self) -> &'static str {
        "Complexity metrics and structural flags for a file."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] =
            &[ToolParam::required("path", ParamType::String, "Project-relative file path")];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        load_record(ctx, path).await?;
        let Some(meta) = ctx.store.get_meta(path).await.map_err(ToolError::Agent)? else {
            return Err(ToolError::not_found_with(
                format!("metadata for '{path}'"),
                "run the indexer to derive metadata",
            ));
        };
        Ok(json!({
            "path": path,
            "complexity": meta.complexity,
            "is_hub": meta.is_hub,
            "is_entry_point": meta.is_entry_point,
            "file_type": meta.file_type,
        }))
    }
}

static TODO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(TODO|FIXME|HACK|XXX)\b[:\s]*(.*)").expect("static regex")
});

pub struct GetTodos;

#[async_trait]
impl Tool for GetTodos {
    fn name(&self) -> &'static str {
        "get_todos"
    }

    fn description(&self) -> &'static str {
        "Scan indexed files for TODO/FIXME/HACK/XXX markers."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] = &[ToolParam::optional(
            "type",
            ParamType::String,
            "Restrict to one marker kind",
        )
        .with_enum(&["TODO", "FIXME", "HACK", "XXX"])];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let wanted = params["type"].as_str();

        // Scans the index, not the raw tree: unindexed files are invisible.
        let files = ctx.store.get_all_files().await.map_err(ToolError::Agent)?;
        let mut todos = Vec::new();
        for (path, record) in &files {
            for (idx, line) in record.lines.iter().enumerate() {
                if let Some(captures) = TODO_PATTERN.captures(line) {
                    let kind = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                    if wanted.is_some_and(|w| w != kind) {
                        continue;
                    }
                    todos.push(json!({
                        "path": path,
                        "line": idx + 1,
                        "type": kind,
                        "text": captures.get(2).map(|m| m.as_str().trim()).unwrap_or_default(),
                    }));
                }
            }
        }

        Ok(json!({ "count": todos.len(), "todos": todos }))
    }
}
