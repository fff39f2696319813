//! Read tools: lazy, index-backed access to file content and structure.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::index::types::{FileAst, FileRecord};
use crate::tools::{ParamType, Tool, ToolCategory, ToolCtx, ToolError, ToolParam, load_ast, load_record};

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetLines),
        Arc::new(GetFunction),
        Arc::new(GetClass),
        Arc::new(GetStructure),
    ]
}

/// Clamp an inclusive 1-based range against the file length.
/// Returns `None` when the requested range is empty after clamping.
fn clamp_range(len: usize, start: Option<i64>, end: Option<i64>) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let start = start.unwrap_or(1).max(1) as usize;
    let end = end.unwrap_or(len as i64).clamp(1, len as i64) as usize;
    if start > end || start > len {
        return None;
    }
    Some((start, end))
}

fn slice_lines(record: &FileRecord, start: usize, end: usize) -> Vec<String> {
    record.lines[start - 1..end].to_vec()
}

pub struct GetLines;

#[async_trait]
impl Tool for GetLines {
    fn name(&self) -> &'static str {
        "get_lines"
    }

    fn description(&self) -> &'static str {
        "Read lines from an indexed file. Defaults to the whole file; out-of-range lines are clamped."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] = &[
            ToolParam::required("path", ParamType::String, "Project-relative file path"),
            ToolParam::optional("start", ParamType::Integer, "First line (1-based, inclusive)"),
            ToolParam::optional("end", ParamType::Integer, "Last line (inclusive)"),
        ];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        let record = load_record(ctx, path).await?;

        let (start, end, lines) =
            match clamp_range(record.lines.len(), params["start"].as_i64(), params["end"].as_i64()) {
                Some((start, end)) => (start, end, slice_lines(&record, start, end)),
                None => (
                    params["start"].as_i64().unwrap_or(1).max(1) as usize,
                    0,
                    Vec::new(),
                ),
            };

        Ok(json!({
            "path": path,
            "start": start,
            "end": end,
            "total_lines": record.lines.len(),
            "lines": lines,
        }))
    }
}

fn function_names(ast: &FileAst) -> Vec<String> {
    let mut names: Vec<String> = ast.functions.iter().map(|f| f.name.clone()).collect();
    for class in &ast.classes {
        names.extend(class.methods.iter().map(|m| format!("{}.{}", class.name, m.name)));
    }
    names
}

pub struct GetFunction;

#[async_trait]
impl Tool for GetFunction {
    fn name(&self) -> &'static str {
        "get_function"
    }

    fn description(&self) -> &'static str {
        "Read one function (or Class.method) from a file, with its source lines."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] = &[
            ToolParam::required("path", ParamType::String, "Project-relative file path"),
            ToolParam::required("name", ParamType::String, "Function name, or Class.method"),
        ];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        let name = params["name"].as_str().unwrap_or_default();
        let record = load_record(ctx, path).await?;
        let ast = load_ast(ctx, path).await?;

        let found = ast
            .functions
            .iter()
            .find(|f| f.name == name)
            .map(|f| (f.line_start, f.line_end, f.params.clone(), f.is_async))
            .or_else(|| {
                // "Class.method" or a bare method name.
                let (class_part, method_part) = match name.split_once('.') {
                    Some((c, m)) => (Some(c), m),
                    None => (None, name),
                };
                ast.classes
                    .iter()
                    .filter(|c| class_part.is_none_or(|cp| c.name == cp))
                    .flat_map(|c| c.methods.iter())
                    .find(|m| m.name == method_part)
                    .map(|m| (m.line_start, m.line_end, m.params.clone(), m.is_async))
            });

        let Some((line_start, line_end, fn_params, is_async)) = found else {
            let mut available = function_names(&ast);
            available.sort();
            return Err(ToolError::not_found_with(
                format!("function '{name}' in {path}"),
                format!("available: {}", available.join(", ")),
            ));
        };

        let end = (line_end as usize).min(record.lines.len());
        let lines = if line_start as usize <= end {
            record.lines[line_start as usize - 1..end].to_vec()
        } else {
            Vec::new()
        };

        Ok(json!({
            "path": path,
            "name": name,
            "line_start": line_start,
            "line_end": line_end,
            "params": fn_params,
            "is_async": is_async,
            "lines": lines,
        }))
    }
}

pub struct GetClass;

#[async_trait]
impl Tool for GetClass {
    fn name(&self) -> &'static str {
        "get_class"
    }

    fn description(&self) -> &'static str {
        "Read one class from a file: heritage, members and source lines."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] = &[
            ToolParam::required("path", ParamType::String, "Project-relative file path"),
            ToolParam::required("name", ParamType::String, "Class name"),
        ];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        let name = params["name"].as_str().unwrap_or_default();
        let record = load_record(ctx, path).await?;
        let ast = load_ast(ctx, path).await?;

        let Some(class) = ast.classes.iter().find(|c| c.name == name) else {
            let available: Vec<&str> = ast.classes.iter().map(|c| c.name.as_str()).collect();
            return Err(ToolError::not_found_with(
                format!("class '{name}' in {path}"),
                format!("available classes: {}", available.join(", ")),
            ));
        };

        let end = (class.line_end as usize).min(record.lines.len());
        let lines = record.lines[class.line_start as usize - 1..end].to_vec();

        Ok(json!({
            "path": path,
            "class": class,
            "lines": lines,
        }))
    }
}

pub struct GetStructure;

#[async_trait]
impl Tool for GetStructure {
    fn name(&self) -> &'static str {
        "get_structure"
    }

    fn description(&self) -> &'static str {
        "Outline of a file: imports, exports and declarations with line ranges."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] =
            &[ToolParam::required("path", ParamType::String, "Project-relative file path")];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        load_record(ctx, path).await?;
        let ast = load_ast(ctx, path).await?;

        let mut outline = String::new();
        for import in &ast.imports {
            outline.push_str(&format!("import {} (line {})\n", import.source, import.line));
        }
        for function in &ast.functions {
            let marker = if function.is_exported { "export " } else { "" };
            let asyncness = if function.is_async { "async " } else { "" };
            outline.push_str(&format!(
                "{marker}{asyncness}function {}({}) [{}-{}]\n",
                function.name,
                function.params.join(", "),
                function.line_start,
                function.line_end
            ));
        }
        for class in &ast.classes {
            let marker = if class.is_exported { "export " } else { "" };
            outline.push_str(&format!(
                "{marker}class {} [{}-{}]\n",
                class.name, class.line_start, class.line_end
            ));
            for method in &class.methods {
                outline.push_str(&format!(
                    "  {}({}) [{}-{}]\n",
                    method.name,
                    method.params.join(", "),
                    method.line_start,
                    method.line_end
                ));
            }
        }
        for interface in &ast.interfaces {
            outline.push_str(&format!(
                "interface {} [{}-{}]\n",
                interface.name, interface.line_start, interface.line_end
            ));
        }
        for alias in &ast.type_aliases {
            outline.push_str(&format!("type {} (line {})\n", alias.name, alias.line));
        }

        Ok(json!({
            "path": path,
            "parse_error": ast.parse_error,
            "outline": outline,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ast::parse_source;
    use crate::index::types::Lang;
    use crate::tools::test_support::{ScriptedConfirm, memory_ctx};
    use std::path::PathBuf;

    async fn ctx_with_file(source: &str) -> ToolCtx {
        let ctx = memory_ctx(PathBuf::from("/p"), Arc::new(ScriptedConfirm::new(true)));
        let record = FileRecord::from_content("src/a.ts", source, source.len() as u64, 1);
        ctx.store.set_file(&record).await.unwrap();
        ctx.store
            .set_ast("src/a.ts", &parse_source(source, Lang::Ts))
            .await
            .unwrap();
        ctx
    }

    #[tokio::test]
    async fn get_lines_defaults_to_whole_file() {
        let ctx = ctx_with_file("a\nb\nc").await;
        let data = GetLines
            .execute(&json!({"path": "src/a.ts"}), &ctx)
            .await
            .unwrap();
        assert_eq!(data["start"], 1);
        assert_eq!(data["end"], 3);
        assert_eq!(data["lines"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn get_lines_clamps_out_of_range() {
        let ctx = ctx_with_file("a\nb\nc").await;
        let data = GetLines
            .execute(&json!({"path": "src/a.ts", "start": -5, "end": 99}), &ctx)
            .await
            .unwrap();
        assert_eq!(data["start"], 1);
        assert_eq!(data["end"], 3);
    }

    #[tokio::test]
    async fn get_lines_start_past_end_is_empty() {
        let ctx = ctx_with_file("a\nb\nc").await;
        let data = GetLines
            .execute(&json!({"path": "src/a.ts", "start": 3, "end": 2}), &ctx)
            .await
            .unwrap();
        assert!(data["lines"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_lines_missing_file_not_found() {
        let ctx = memory_ctx(PathBuf::from("/p"), Arc::new(ScriptedConfirm::new(true)));
        let err = GetLines
            .execute(&json!({"path": "nope.ts"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn get_lines_rejects_escaping_path() {
        let ctx = memory_ctx(PathBuf::from("/p"), Arc::new(ScriptedConfirm::new(true)));
        let err = GetLines
            .execute(&json!({"path": "../etc/passwd"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PathEscape(_)));
    }

    #[tokio::test]
    async fn get_function_finds_declaration_and_method() {
        let src = "export function top(a, b){\n  return a;\n}\nexport class C {\n  run(x){ return x; }\n}";
        let ctx = ctx_with_file(src).await;

        let data = GetFunction
            .execute(&json!({"path": "src/a.ts", "name": "top"}), &ctx)
            .await
            .unwrap();
        assert_eq!(data["line_start"], 1);
        assert_eq!(data["line_end"], 3);
        assert_eq!(data["params"], json!(["a", "b"]));

        let data = GetFunction
            .execute(&json!({"path": "src/a.ts", "name": "C.run"}), &ctx)
            .await
            .unwrap();
        assert_eq!(data["line_start"], 5);
    }

    #[tokio::test]
    async fn get_function_suggests_alternatives() {
        let ctx = ctx_with_file("export function realName(){}").await;
        let err = GetFunction
            .execute(&json!({"path": "src/a.ts", "name": "wrongName"}), &ctx)
            .await
            .unwrap_err();
        match err {
            ToolError::NotFound { suggestion, .. } => {
                assert!(suggestion.unwrap().contains("realName"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_class_returns_members() {
        let src = "export class Store {\n  private db: string;\n  open(){}\n}";
        let ctx = ctx_with_file(src).await;
        let data = GetClass
            .execute(&json!({"path": "src/a.ts", "name": "Store"}), &ctx)
            .await
            .unwrap();
        assert_eq!(data["class"]["name"], "Store");
        assert_eq!(data["class"]["methods"][0]["name"], "open");
    }

    #[tokio::test]
    async fn get_structure_renders_outline() {
        let src = "import {x} from './x';\nexport function f(a){}\nexport class K {\n  go(){}\n}";
        let ctx = ctx_with_file(src).await;
        let data = GetStructure
            .execute(&json!({"path": "src/a.ts"}), &ctx)
            .await
            .unwrap();
        let outline = data["outline"].as_str().unwrap();
        assert!(outline.contains("import ./x (line 1)"));
        assert!(outline.contains("export function f(a) [2-2]"));
        assert!(outline.contains("export class K [3-5]"));
        assert!(outline.contains("  go() [4-4]"));
    }
}
