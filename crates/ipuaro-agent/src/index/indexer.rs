//! Indexing orchestrator: scan, parse, analyze, build.
//!
//! Re-entrant and stateless: a rerun overwrites per-file entries, drops
//! entries for files that vanished, and rebuilds the aggregates from
//! scratch. Per-file read/parse failures are counted and skipped; only a
//! store failure aborts the pipeline.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use time::OffsetDateTime;

use crate::error::AgentResult;
use crate::index::ast::parse_source;
use crate::index::builder::{build_deps_graph, build_symbol_index};
use crate::index::meta::build_metas;
use crate::index::scanner::scan_project;
use crate::index::types::{FileAst, FileRecord, Lang};
use crate::store::IndexStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Scan,
    Parse,
    Analyze,
    Build,
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndexPhase::Scan => "scan",
            IndexPhase::Parse => "parse",
            IndexPhase::Analyze => "analyze",
            IndexPhase::Build => "build",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct IndexProgress {
    pub phase: IndexPhase,
    pub current: usize,
    /// 0 while the total is still unknown (scan phase).
    pub total: usize,
    pub current_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub parse_errors: usize,
    pub symbols: usize,
    pub duration_ms: u64,
}

/// Run the four-phase pipeline against `root`, persisting into `store`.
pub async fn execute_index(
    store: &IndexStore,
    root: &Path,
    ignore_patterns: &[String],
    on_progress: &mut dyn FnMut(IndexProgress),
) -> AgentResult<IndexStats> {
    let started = Instant::now();
    let mut stats = IndexStats::default();

    // Phase 1: scan.
    let entries = {
        let mut report = |count: usize| {
            on_progress(IndexProgress {
                phase: IndexPhase::Scan,
                current: count,
                total: 0,
                current_file: None,
            });
        };
        scan_project(root, ignore_patterns, &mut report)?
    };
    log::info!("index: scanned {} files under {}", entries.len(), root.display());

    // Drop store entries for files that no longer exist on disk.
    let fresh: std::collections::BTreeSet<&str> =
        entries.iter().map(|e| e.rel_path.as_str()).collect();
    let stored = store.get_all_files().await?;
    for stale in stored.keys().filter(|p| !fresh.contains(p.as_str())) {
        log::debug!("index: removing stale entry {stale}");
        store.delete_file(stale).await?;
        store.delete_ast(stale).await?;
        store.delete_meta(stale).await?;
    }

    // Phase 2: parse. Every readable file gets a record; source dialects
    // also get an AST (stored even on syntax errors, flagged as such).
    let total = entries.len();
    let mut asts: BTreeMap<String, FileAst> = BTreeMap::new();
    let mut contents: BTreeMap<String, String> = BTreeMap::new();
    for (i, entry) in entries.iter().enumerate() {
        on_progress(IndexProgress {
            phase: IndexPhase::Parse,
            current: i + 1,
            total,
            current_file: Some(entry.rel_path.clone()),
        });

        let abs = root.join(&entry.rel_path);
        let content = match std::fs::read_to_string(&abs) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("index: cannot read {}: {e}", entry.rel_path);
                stats.parse_errors += 1;
                continue;
            }
        };

        let record = FileRecord::from_content(&entry.rel_path, &content, entry.size, entry.mtime);
        store.set_file(&record).await?;
        stats.files_indexed += 1;

        match Lang::from_path(&entry.rel_path) {
            Some(lang) => {
                let ast = parse_source(&content, lang);
                if ast.parse_error {
                    stats.parse_errors += 1;
                }
                store.set_ast(&entry.rel_path, &ast).await?;
                asts.insert(entry.rel_path.clone(), ast);
            }
            None => {
                // json/yaml: indexable content, no syntax to summarize.
                store.delete_ast(&entry.rel_path).await?;
            }
        }
        contents.insert(entry.rel_path.clone(), content);
    }

    // Phase 3: analyze. Files without an AST analyze against an empty one so
    // config files still get complexity/file-type metadata.
    let files: BTreeMap<String, (FileAst, String)> = contents
        .iter()
        .map(|(path, content)| {
            let ast = asts.get(path).cloned().unwrap_or_default();
            (path.clone(), (ast, content.clone()))
        })
        .collect();
    let metas = build_metas(&files);
    let meta_total = metas.len();
    for (i, (path, meta)) in metas.iter().enumerate() {
        on_progress(IndexProgress {
            phase: IndexPhase::Analyze,
            current: i + 1,
            total: meta_total,
            current_file: Some(path.clone()),
        });
        store.set_meta(path, meta).await?;
    }

    // Phase 4: build aggregates.
    on_progress(IndexProgress {
        phase: IndexPhase::Build,
        current: 1,
        total: 2,
        current_file: None,
    });
    let symbols = build_symbol_index(&asts);
    stats.symbols = symbols.0.len();
    store.set_symbol_index(&symbols).await?;

    on_progress(IndexProgress {
        phase: IndexPhase::Build,
        current: 2,
        total: 2,
        current_file: None,
    });
    let graph = build_deps_graph(&asts);
    store.set_deps_graph(&graph).await?;

    let now = OffsetDateTime::now_utc().unix_timestamp();
    store
        .set_project_config("last_indexed", &now.to_string())
        .await?;

    stats.duration_ms = started.elapsed().as_millis() as u64;
    log::info!(
        "index: done ({} files, {} symbols, {} parse errors, {}ms)",
        stats.files_indexed,
        stats.symbols,
        stats.parse_errors,
        stats.duration_ms
    );
    Ok(stats)
}
