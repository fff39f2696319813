//! Git tools over libgit2: status, diff and commit.

use async_trait::async_trait;
use git2::{DiffFormat, DiffOptions, Repository, Signature, Status, StatusOptions};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

use crate::tools::{ParamType, Tool, ToolCategory, ToolCtx, ToolError, ToolParam};

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(GitStatus), Arc::new(GitDiff), Arc::new(GitCommit)]
}

fn open_repo(root: &Path) -> Result<Repository, ToolError> {
    Repository::open(root).map_err(|_| {
        ToolError::not_found_with(
            "git repository",
            "the project root is not a git work tree",
        )
    })
}

fn git_err(e: git2::Error) -> ToolError {
    ToolError::Internal(format!("git: {}", e.message()))
}

pub struct GitStatus;

#[async_trait]
impl Tool for GitStatus {
    fn name(&self) -> &'static str {
        "git_status"
    }

    fn description(&self) -> &'static str {
        "Branch plus staged, modified and untracked files."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn parameters(&self) -> &'static [ToolParam] {
        &[]
    }

    async fn execute(&self, _params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let repo = open_repo(&ctx.root)?;
        let branch = repo
            .head()
            .ok()
            .and_then(|h| h.shorthand().map(str::to_string))
            .unwrap_or_else(|| "(no commits yet)".to_string());

        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = repo.statuses(Some(&mut options)).map_err(git_err)?;

        let mut staged = Vec::new();
        let mut modified = Vec::new();
        let mut untracked = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            let status = entry.status();
            if status.intersects(
                Status::INDEX_NEW
                    | Status::INDEX_MODIFIED
                    | Status::INDEX_DELETED
                    | Status::INDEX_RENAMED
                    | Status::INDEX_TYPECHANGE,
            ) {
                staged.push(path.to_string());
            }
            if status.intersects(
                Status::WT_MODIFIED | Status::WT_DELETED | Status::WT_RENAMED | Status::WT_TYPECHANGE,
            ) {
                modified.push(path.to_string());
            }
            if status.contains(Status::WT_NEW) {
                untracked.push(path.to_string());
            }
        }

        Ok(json!({
            "branch": branch,
            "staged": staged,
            "modified": modified,
            "untracked": untracked,
        }))
    }
}

pub struct GitDiff;

#[async_trait]
impl Tool for GitDiff {
    fn name(&self) -> &'static str {
        "git_diff"
    }

    fn description(&self) -> &'static str {
        "Unified diff of the work tree (or the index with staged=true), optionally for one path."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] = &[
            ToolParam::optional("path", ParamType::String, "Limit the diff to this path"),
            ToolParam::optional("staged", ParamType::Boolean, "Diff the index against HEAD"),
        ];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let repo = open_repo(&ctx.root)?;
        let staged = params["staged"].as_bool().unwrap_or(false);

        let mut options = DiffOptions::new();
        if let Some(path) = params["path"].as_str() {
            options.pathspec(path);
        }

        let head_tree = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_tree().ok());

        let diff = if staged {
            repo.diff_tree_to_index(head_tree.as_ref(), None, Some(&mut options))
                .map_err(git_err)?
        } else {
            repo.diff_index_to_workdir(None, Some(&mut options))
                .map_err(git_err)?
        };

        let mut patch = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                patch.push(line.origin());
            }
            patch.push_str(std::str::from_utf8(line.content()).unwrap_or(""));
            true
        })
        .map_err(git_err)?;

        Ok(json!({
            "staged": staged,
            "patch": patch,
            "files_changed": diff.deltas().len(),
        }))
    }
}

pub struct GitCommit;

#[async_trait]
impl Tool for GitCommit {
    fn name(&self) -> &'static str {
        "git_commit"
    }

    fn description(&self) -> &'static str {
        "Commit staged changes; stages the given files first when provided."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn parameters(&self) -> &'static [ToolParam] {
        const PARAMS: &[ToolParam] = &[
            ToolParam::required("message", ParamType::String, "Commit message"),
            ToolParam::optional("files", ParamType::String, "Comma-separated paths to stage first"),
        ];
        PARAMS
    }

    async fn execute(&self, params: &Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let message = params["message"].as_str().unwrap_or_default().trim();
        if message.is_empty() {
            return Err(ToolError::Validation("commit message must not be empty".into()));
        }
        let (staged_count, tree_id) = {
            let repo = open_repo(&ctx.root)?;
            let mut index = repo.index().map_err(git_err)?;

            if let Some(files) = params["files"].as_str() {
                for file in files.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                    crate::safety::contain_path(&ctx.root, file)
                        .map_err(|_| ToolError::PathEscape(file.to_string()))?;
                    index
                        .add_path(Path::new(file))
                        .map_err(|e| ToolError::Validation(format!("cannot stage {file}: {}", e.message())))?;
                }
                index.write().map_err(git_err)?;
            }

            let staged_count = {
                let head_tree = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
                repo.diff_tree_to_index(head_tree.as_ref(), Some(&index), None)
                    .map_err(git_err)?
                    .deltas()
                    .len()
            };
            if staged_count == 0 {
                return Err(ToolError::Validation(
                    "nothing staged: stage files first or pass files to commit".into(),
                ));
            }

            let tree_id = index.write_tree().map_err(git_err)?;
            (staged_count, tree_id)
        };

        let subject = message.lines().next().unwrap_or(message).to_string();
        let summary = format!("git_commit: \"{subject}\" ({staged_count} files)");
        if !ctx.request_confirmation(&summary).await {
            return Err(ToolError::Cancelled);
        }

        let repo = open_repo(&ctx.root)?;
        let tree = repo.find_tree(tree_id).map_err(git_err)?;
        let signature = repo
            .signature()
            .or_else(|_| Signature::now("ipuaro", "ipuaro@localhost"))
            .map_err(git_err)?;
        let parent = repo
            .head()
            .ok()
            .and_then(|h| h.target())
            .and_then(|oid| repo.find_commit(oid).ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(git_err)?;

        log::info!("git_commit: {oid} \"{subject}\"");
        Ok(json!({
            "commit": oid.to_string(),
            "subject": subject,
            "files_committed": staged_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{ScriptedConfirm, memory_ctx};
    use tempfile::TempDir;

    fn init_repo(dir: &TempDir) -> Repository {
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "tester").unwrap();
        config.set_str("user.email", "tester@local").unwrap();
        repo
    }

    #[tokio::test]
    async fn status_reports_untracked_and_branch() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("new.ts"), "export {}\n").unwrap();

        let ctx = memory_ctx(dir.path().to_path_buf(), Arc::new(ScriptedConfirm::new(true)));
        let data = GitStatus.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(data["untracked"], json!(["new.ts"]));
        assert_eq!(data["branch"], "(no commits yet)");
    }

    #[tokio::test]
    async fn status_outside_repo_is_not_found() {
        let dir = TempDir::new().unwrap();
        let ctx = memory_ctx(dir.path().to_path_buf(), Arc::new(ScriptedConfirm::new(true)));
        let err = GitStatus.execute(&json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn commit_with_files_stages_and_commits() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("a.ts"), "export const a = 1;\n").unwrap();

        let confirm = Arc::new(ScriptedConfirm::new(true));
        let ctx = memory_ctx(dir.path().to_path_buf(), confirm.clone());
        let data = GitCommit
            .execute(
                &json!({"message": "add a\n\nbody text", "files": "a.ts"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(data["subject"], "add a");
        assert_eq!(data["files_committed"], 1);
        // The prompt carries the commit subject.
        assert!(confirm.prompts.lock()[0].contains("add a"));

        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message().unwrap().lines().next().unwrap(), "add a");
    }

    #[tokio::test]
    async fn commit_without_staged_changes_fails() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        let ctx = memory_ctx(dir.path().to_path_buf(), Arc::new(ScriptedConfirm::new(true)));
        let err = GitCommit
            .execute(&json!({"message": "empty"}), &ctx)
            .await
            .unwrap_err();
        match err {
            ToolError::Validation(msg) => assert!(msg.contains("nothing staged")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_commit_confirmation_cancels() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("a.ts"), "x\n").unwrap();
        let ctx = memory_ctx(dir.path().to_path_buf(), Arc::new(ScriptedConfirm::new(false)));
        let err = GitCommit
            .execute(&json!({"message": "nope", "files": "a.ts"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled));
    }

    #[tokio::test]
    async fn diff_shows_workdir_changes() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        std::fs::write(dir.path().join("a.ts"), "old\n").unwrap();

        let confirm = Arc::new(ScriptedConfirm::new(true));
        let ctx = memory_ctx(dir.path().to_path_buf(), confirm);
        GitCommit
            .execute(&json!({"message": "base", "files": "a.ts"}), &ctx)
            .await
            .unwrap();

        std::fs::write(dir.path().join("a.ts"), "new\n").unwrap();
        let data = GitDiff.execute(&json!({}), &ctx).await.unwrap();
        let patch = data["patch"].as_str().unwrap();
        assert!(patch.contains("-old"));
        assert!(patch.contains("+new"));
    }
}
