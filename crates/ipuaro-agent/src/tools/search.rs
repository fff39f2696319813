//! Search tools: reference and definition lookup over the index.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::tools::{ParamType, Tool, ToolCategory, ToolCtx, ToolError, ToolParam};

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(FindReferences), Arc::new(FindDefinition)]
}

/// Render a hit with one line of context above and below; the hit line is
/// marked with `>`.
fn context_block(lines: &[String], hit_line: usize) -> Vec<String> {
    let mut block = Vec::new();
    let first = hit_line.saturating_sub(1).max(1);
    let last = (hit_line + 1).min(lines.len());
    for n in first..=last {
        let marker = if n == hit_line { ">" } else { " " };
        block.push(format!("{marker} {n:>4} | {}", lines[n - 1]));
    }
    block
}

pub struct FindReferences;

#[async_trait]
impl Tool for FindReferences {
    fn name(&self) -> &'static str {
        "find_references"
    }

    fn description(&self) -> &'static str {
        "Find every word-boundary occurrence of a symbol, with context and definition markers."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Search
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] = &[
            ToolParam::required("symbol", ParamType::String, "Identifier to search for"),
            ToolParam::optional("path", ParamType::String, "Restrict to paths with this prefix"),
        ];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let symbol = params["symbol"].as_str().unwrap_or_default().trim();
        if symbol.is_empty() {
            return Err(ToolError::Validation("symbol must not be empty".into()));
        }
        let prefix = params["path"].as_str().unwrap_or_default();

        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(symbol)))
            .map_err(|e| ToolError::Internal(format!("reference pattern: {e}")))?;

        let files = ctx.store.get_all_files().await.map_err(ToolError::Agent)?;
        let symbols = ctx
            .store
            .get_symbol_index()
            .await
            .map_err(ToolError::Agent)?
            .unwrap_or_default();

        let mut references = Vec::new();
        for (path, record) in &files {
            if !prefix.is_empty() && !path.starts_with(prefix) {
                continue;
            }
            for (idx, line) in record.lines.iter().enumerate() {
                let line_no = idx + 1;
                for hit in pattern.find_iter(line) {
                    references.push(json!({
                        "path": path,
                        "line": line_no,
                        "column": hit.start() + 1,
                        "is_definition": symbols.is_definition(symbol, path, line_no as u32),
                        "context": context_block(&record.lines, line_no),
                    }));
                }
            }
        }

        // Files iterate in path order and hits in line/column order, so the
        // list is already sorted by (path, line, column).
        Ok(json!({
            "symbol": symbol,
            "count": references.len(),
            "references": references,
        }))
    }
}

pub struct FindDefinition;

#[async_trait]
impl Tool for FindDefinition {
    fn name(&self) -> &'static str {
        "find_definition"
    }

    fn description(&self) -> &'static str {
        "Look a symbol up in the global index; suggests similar names when absent."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Search
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] =
            &[ToolParam::required("symbol", ParamType::String, "Identifier to resolve")];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let symbol = params["symbol"].as_str().unwrap_or_default().trim();
        if symbol.is_empty() {
            return Err(ToolError::Validation("symbol must not be empty".into()));
        }

        let symbols = ctx
            .store
            .get_symbol_index()
            .await
            .map_err(ToolError::Agent)?
            .unwrap_or_default();

        let definitions = symbols.lookup(symbol);
        if definitions.is_empty() {
            let mut close: Vec<&str> = symbols
                .names()
                .filter(|name| strsim::levenshtein(name, symbol) <= 2)
                .collect();
            close.sort_unstable();
            close.truncate(5);
            let suggestion = if close.is_empty() {
                "no similar symbols in the index".to_string()
            } else {
                format!("did you mean: {}", close.join(", "))
            };
            return Err(ToolError::not_found_with(format!("symbol '{symbol}'"), suggestion));
        }

        Ok(json!({
            "symbol": symbol,
            "definitions": definitions,
        }))
    }
}
