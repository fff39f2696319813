//! Lazy model context: a compact project summary assembled from the index.
//!
//! The model never receives file bodies up front; it sees the project shape
//! and asks for content through tools. Token estimation is the usual
//! 4-chars-per-token approximation.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::AgentResult;
use crate::index::types::{FileAst, FileMeta};
use crate::store::IndexStore;

pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Cut `text` to at most `max_tokens`, breaking on a newline so no summary
/// line is ever half-delivered.
pub fn truncate_context(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * 4;
    if text.len() <= max_chars {
        return text.to_string();
    }
    let cut = text[..max_chars].rfind('\n').unwrap_or(max_chars);
    let mut truncated = text[..cut].to_string();
    truncated.push_str("\n…(project summary truncated)");
    truncated
}

fn file_summary_line(path: &str, ast: Option<&FileAst>, meta: Option<&FileMeta>) -> String {
    let mut line = format!("  {path}");
    if let Some(ast) = ast {
        if ast.parse_error {
            line.push_str(" (parse error)");
        } else {
            let mut parts = Vec::new();
            if !ast.functions.is_empty() {
                parts.push(format!("{} fn", ast.functions.len()));
            }
            if !ast.classes.is_empty() {
                parts.push(format!("{} class", ast.classes.len()));
            }
            if !ast.interfaces.is_empty() {
                parts.push(format!("{} interface", ast.interfaces.len()));
            }
            if !ast.type_aliases.is_empty() {
                parts.push(format!("{} type", ast.type_aliases.len()));
            }
            if !parts.is_empty() {
                line.push_str(&format!(" — {}", parts.join(", ")));
            }
        }
    }
    if let Some(meta) = meta {
        if meta.is_hub {
            line.push_str(" [hub]");
        }
        if meta.is_entry_point {
            line.push_str(" [entry]");
        }
        if meta.complexity.score >= 60 {
            line.push_str(&format!(" [cx {}]", meta.complexity.score));
        }
    }
    line
}

/// Build the initial context block for a message cycle.
pub async fn build_context(
    store: &IndexStore,
    root: &Path,
    max_tokens: usize,
) -> AgentResult<String> {
    let asts = store.get_all_asts().await?;
    let metas = store.get_all_metas().await?;
    let file_count = store.get_file_count().await?;
    let last_indexed = store
        .get_project_config("last_indexed")
        .await?
        .unwrap_or_else(|| "never".to_string());

    let mut text = format!(
        "Project: {} ({})\nIndexed files: {file_count} (last indexed: {last_indexed})\n",
        store.project(),
        root.display(),
    );

    // Directory shape: top-level entries with file counts.
    let mut dirs: BTreeMap<&str, usize> = BTreeMap::new();
    for path in metas.keys() {
        let top = path.split('/').next().unwrap_or(path);
        *dirs.entry(top).or_default() += 1;
    }
    text.push_str("Layout:\n");
    for (dir, count) in &dirs {
        text.push_str(&format!("  {dir}/ ({count} files)\n"));
    }

    text.push_str("Files:\n");
    for path in metas.keys() {
        let line = file_summary_line(path, asts.get(path), metas.get(path));
        text.push_str(&line);
        text.push('\n');
    }
    text.push_str(
        "Use the tools to read specific lines, functions, structure or references on demand.\n",
    );

    Ok(truncate_context(&text, max_tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ast::parse_source;
    use crate::index::meta::build_metas;
    use crate::index::types::{FileRecord, Lang};
    use crate::store::MemoryKv;
    use std::sync::Arc;

    #[test]
    fn truncate_breaks_on_newline() {
        let text = "line one\nline two\nline three\n".repeat(100);
        let truncated = truncate_context(&text, 10);
        assert!(truncated.len() <= 40 + "\n…(project summary truncated)".len());
        assert!(truncated.contains("truncated"));
        // Never cuts mid-line.
        let body = truncated.strip_suffix("\n…(project summary truncated)").unwrap();
        assert!(body.lines().all(|l| l.is_empty() || l.starts_with("line")));
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_context("short", 100), "short");
    }

    #[tokio::test]
    async fn context_names_files_and_shape() {
        let store = IndexStore::new(Arc::new(MemoryKv::new()), "demo");
        let src = "export function f(){}\nexport class C {}";
        store
            .set_file(&FileRecord::from_content("src/a.ts", src, src.len() as u64, 1))
            .await
            .unwrap();
        let ast = parse_source(src, Lang::Ts);
        store.set_ast("src/a.ts", &ast).await.unwrap();
        let mut files = std::collections::BTreeMap::new();
        files.insert("src/a.ts".to_string(), (ast, src.to_string()));
        for (path, meta) in build_metas(&files) {
            store.set_meta(&path, &meta).await.unwrap();
        }

        let context = build_context(&store, Path::new("/demo"), 4000).await.unwrap();
        assert!(context.contains("Project: demo"));
        assert!(context.contains("src/ (1 files)"));
        assert!(context.contains("src/a.ts — 1 fn, 1 class"));
    }
}
