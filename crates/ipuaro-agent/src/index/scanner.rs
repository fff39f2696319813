//! Project tree scanner: deterministic walk honoring ignore patterns.

use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::error::{AgentError, AgentResult};

/// Directories excluded from every scan, before config patterns apply.
pub const DEFAULT_IGNORE: &[&str] = &["node_modules", "dist", ".git", "coverage", "build"];

/// Extensions the index understands. json/yaml are stored for context but
/// never parsed into ASTs.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "json", "yaml", "yml"];

/// Progress callbacks fire once per this many scanned files.
const PROGRESS_BATCH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Project-relative, forward-slash normalized.
    pub rel_path: String,
    pub size: u64,
    /// Unix mtime seconds.
    pub mtime: i64,
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Walk `root` and collect supported files in sorted order.
///
/// Symlinks are never followed, so links pointing outside the root cannot
/// drag foreign trees into the index. `on_batch` receives the running count
/// once per batch.
pub fn scan_project(
    root: &Path,
    extra_ignore: &[String],
    on_batch: &mut dyn FnMut(usize),
) -> AgentResult<Vec<ScanEntry>> {
    let overrides = compile_overrides(root, extra_ignore)?;

    let mut entries = Vec::new();
    let walker = WalkBuilder::new(root)
        .follow_links(false)
        .git_ignore(true)
        .hidden(false)
        .overrides(overrides)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    for entry in walker.filter_map(Result::ok) {
        let path = entry.path();
        if path == root || !path.is_file() || !is_supported(path) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel_path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::warn!("scan: cannot stat {rel_path}: {e}");
                continue;
            }
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        entries.push(ScanEntry {
            rel_path,
            size: metadata.len(),
            mtime,
        });
        if entries.len() % PROGRESS_BATCH == 0 {
            on_batch(entries.len());
        }
    }

    on_batch(entries.len());
    Ok(entries)
}

fn compile_overrides(
    root: &Path,
    extra_ignore: &[String],
) -> AgentResult<ignore::overrides::Override> {
    let mut builder = OverrideBuilder::new(root);
    // Only exclusion patterns go in: a whitelist pattern would outrank
    // .gitignore and resurrect ignored trees.
    for pattern in DEFAULT_IGNORE
        .iter()
        .map(|s| s.to_string())
        .chain(extra_ignore.iter().cloned())
    {
        let normalized = if pattern.contains('/') || pattern.contains('*') {
            pattern.clone()
        } else {
            format!("**/{pattern}/**")
        };
        builder
            .add(&format!("!{normalized}"))
            .map_err(|e| AgentError::Validation(format!("bad ignore pattern '{pattern}': {e}")))?;
        // Also exclude a bare directory match at the root.
        if !pattern.contains('/') && !pattern.contains('*') {
            builder
                .add(&format!("!{pattern}"))
                .map_err(|e| AgentError::Validation(format!("bad ignore pattern '{pattern}': {e}")))?;
        }
    }
    builder
        .build()
        .map_err(|e| AgentError::Validation(format!("ignore patterns: {e}")))
}
