//! Edit tools: range replacement, file creation and deletion.
//!
//! Every accepted edit follows the same sequence: verify the working tree
//! still matches the index, ask for confirmation, write atomically
//! (temp file + rename), refresh the stored record/AST, and push an undo
//! entry — in that order, so the undo stack never references content the
//! model has not yet seen.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::index::ast::parse_source;
use crate::index::types::{FileRecord, Lang};
use crate::safety::contain_path;
use crate::session::domain::UndoEntry;
use crate::tools::{ParamType, Tool, ToolCategory, ToolCtx, ToolError, ToolParam, load_record};

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(EditLines), Arc::new(CreateFile), Arc::new(DeleteFile)]
}

/// Write-temp-then-rename so a crash never leaves a torn file. Source files
/// are written with a trailing newline.
pub(crate) fn write_atomic(abs: &Path, lines: &[String]) -> Result<(), ToolError> {
    let parent = abs
        .parent()
        .ok_or_else(|| ToolError::Internal(format!("no parent directory for {}", abs.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| ToolError::Internal(format!("temp file in {}: {e}", parent.display())))?;
    let mut content = lines.join("\n");
    content.push('\n');
    tmp.write_all(content.as_bytes())
        .map_err(|e| ToolError::Internal(format!("write {}: {e}", abs.display())))?;
    tmp.persist(abs)
        .map_err(|e| ToolError::Internal(format!("rename into {}: {e}", abs.display())))?;
    Ok(())
}

fn fs_size_mtime(abs: &Path) -> (u64, i64) {
    let Ok(metadata) = std::fs::metadata(abs) else {
        return (0, 0);
    };
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    (metadata.len(), mtime)
}

/// Persist the post-edit state: record, AST (for source dialects) and the
/// undo entry.
async fn commit_edit(
    ctx: &ToolCtx,
    path: &str,
    abs: &Path,
    lines: Vec<String>,
    entry: UndoEntry,
) -> Result<(), ToolError> {
    let (size, mtime) = fs_size_mtime(abs);
    let content = lines.join("\n");
    let record = FileRecord::from_content(path, &content, size, mtime);
    ctx.store.set_file(&record).await.map_err(ToolError::Agent)?;
    if let Some(lang) = Lang::from_path(path) {
        let ast = parse_source(&content, lang);
        ctx.store.set_ast(path, &ast).await.map_err(ToolError::Agent)?;
    }
    ctx.store
        .push_undo_entry(&ctx.session_id, &entry)
        .await
        .map_err(ToolError::Agent)?;
    Ok(())
}

pub struct EditLines;

#[async_trait]
impl Tool for EditLines {
    fn name(&self) -> &'static str {
        "edit_lines"
    }

    fn description(&self) -> &'static str {
        "Replace an inclusive line range with new content. Fails if the file changed since indexing."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Edit
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] = &[
            ToolParam::required("path", ParamType::String, "Project-relative file path"),
            ToolParam::required("start", ParamType::Integer, "First line to replace (1-based)"),
            ToolParam::required("end", ParamType::Integer, "Last line to replace (inclusive)"),
            ToolParam::required("content", ParamType::String, "Replacement text; split on newlines"),
        ];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        let start = params["start"].as_i64().unwrap_or(0);
        let end = params["end"].as_i64().unwrap_or(0);
        let content = params["content"].as_str().unwrap_or_default();
        if start < 1 || end < start {
            return Err(ToolError::Validation(format!(
                "invalid range {start}-{end}: start must be >= 1 and end >= start"
            )));
        }
        let (start, end) = (start as usize, end as usize);

        let record = load_record(ctx, path).await?;
        let abs = contain_path(&ctx.root, path).map_err(|_| ToolError::PathEscape(path.into()))?;

        if end > record.lines.len() {
            return Err(ToolError::Validation(format!(
                "range {start}-{end} exceeds file length {}",
                record.lines.len()
            )));
        }

        let disk_content = std::fs::read_to_string(&abs)
            .map_err(|e| ToolError::Internal(format!("read {}: {e}", abs.display())))?;
        let disk_lines: Vec<String> = disk_content.lines().map(str::to_string).collect();

        // The edit is expressed against indexed line numbers; the target
        // range on disk must still be what the index says it is.
        let indexed_range = &record.lines[start - 1..end];
        let disk_range = disk_lines.get(start - 1..end);
        if disk_range != Some(indexed_range) {
            return Err(ToolError::Conflict(format!(
                "{path} modified since last index"
            )));
        }

        let replacement: Vec<String> = content.split('\n').map(str::to_string).collect();
        let summary = format!(
            "edit_lines {path}: replace lines {start}-{end} ({} -> {} lines)",
            end - start + 1,
            replacement.len()
        );
        if !ctx.request_confirmation(&summary).await {
            return Err(ToolError::Cancelled);
        }

        let previous: Vec<String> = indexed_range.to_vec();
        let mut new_lines = disk_lines;
        new_lines.splice(start - 1..end, replacement.iter().cloned());

        write_atomic(&abs, &new_lines)?;
        let entry = UndoEntry::new(
            path,
            previous.clone(),
            replacement.clone(),
            format!("edit_lines {path} {start}-{end}"),
        );
        commit_edit(ctx, path, &abs, new_lines, entry).await?;

        log::info!("edit_lines: {path} {start}-{end} applied");
        Ok(json!({
            "path": path,
            "start": start,
            "end": end,
            "replaced": previous.len(),
            "inserted": replacement.len(),
        }))
    }
}

pub struct CreateFile;

#[async_trait]
impl Tool for CreateFile {
    fn name(&self) -> &'static str {
        "create_file"
    }

    fn description(&self) -> &'static str {
        "Create a new file with the given content. Fails if the path already exists."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Edit
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] = &[
            ToolParam::required("path", ParamType::String, "Project-relative file path"),
            ToolParam::required("content", ParamType::String, "Initial file content"),
        ];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        let content = params["content"].as_str().unwrap_or_default();
        let abs = contain_path(&ctx.root, path).map_err(|_| ToolError::PathEscape(path.into()))?;

        if abs.exists() {
            return Err(ToolError::Conflict(format!("{path} already exists")));
        }

        let lines: Vec<String> = content.split('\n').map(str::to_string).collect();
        let summary = format!("create_file {path} ({} lines)", lines.len());
        if !ctx.request_confirmation(&summary).await {
            return Err(ToolError::Cancelled);
        }

        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ToolError::Internal(format!("mkdir {}: {e}", parent.display())))?;
        }
        write_atomic(&abs, &lines)?;
        let entry = UndoEntry::new(path, Vec::new(), lines.clone(), format!("create_file {path}"));
        commit_edit(ctx, path, &abs, lines.clone(), entry).await?;

        log::info!("create_file: {path} ({} lines)", lines.len());
        Ok(json!({ "path": path, "lines": lines.len() }))
    }
}

pub struct DeleteFile;

#[async_trait]
impl Tool for DeleteFile {
    fn name(&self) -> &'static str {
        "delete_file"
    }

    fn description(&self) -> &'static str {
        "Delete a file from the working tree and the index. Fails if it does not exist."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Edit
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] =
            &[ToolParam::required("path", ParamType::String, "Project-relative file path")];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let path = params["path"].as_str().unwrap_or_default();
        let abs = contain_path(&ctx.root, path).map_err(|_| ToolError::PathEscape(path.into()))?;

        if !abs.exists() {
            return Err(ToolError::not_found(format!("file '{path}'")));
        }
        let disk_content = std::fs::read_to_string(&abs)
            .map_err(|e| ToolError::Internal(format!("read {}: {e}", abs.display())))?;
        let previous: Vec<String> = disk_content.lines().map(str::to_string).collect();

        let summary = format!("delete_file {path} ({} lines)", previous.len());
        if !ctx.request_confirmation(&summary).await {
            return Err(ToolError::Cancelled);
        }

        let entry = UndoEntry::new(path, previous.clone(), Vec::new(), format!("delete_file {path}"));
        ctx.store
            .push_undo_entry(&ctx.session_id, &entry)
            .await
            .map_err(ToolError::Agent)?;

        std::fs::remove_file(&abs)
            .map_err(|e| ToolError::Internal(format!("remove {}: {e}", abs.display())))?;
        ctx.store.delete_file(path).await.map_err(ToolError::Agent)?;
        ctx.store.delete_ast(path).await.map_err(ToolError::Agent)?;
        ctx.store.delete_meta(path).await.map_err(ToolError::Agent)?;

        log::info!("delete_file: {path}");
        Ok(json!({ "path": path, "deleted": true }))
    }
}
