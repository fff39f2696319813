//! Derived per-file metadata: complexity, resolved dependencies, hub and
//! entry-point flags.
//!
//! Complexity scoring constants (kept deliberately coarse and documented so
//! rebuilds are reproducible):
//!
//! - `loc`: non-blank lines that are not pure `//` / `*` comment lines
//! - `nesting`: maximum brace depth across the file
//! - `cyclomatic`: 1 + occurrences of `if` / `for` / `while` / `case` /
//!   `catch` keywords plus `&&`, `||` and ternary `?` operators
//! - `score = min(100, loc/10 + nesting*5 + cyclomatic*2)`

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::index::types::{Complexity, FileAst, FileMeta, FileType};

/// A file is a hub once this many files depend on it.
pub const HUB_THRESHOLD: usize = 5;

static BRANCH_KEYWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:if|for|while|case|catch)\b").expect("static regex"));

pub fn complexity_of(content: &str) -> Complexity {
    let loc = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("//") && !l.starts_with('*') && !l.starts_with("/*"))
        .count() as u32;

    let mut depth: u32 = 0;
    let mut nesting: u32 = 0;
    for ch in content.chars() {
        match ch {
            '{' => {
                depth += 1;
                nesting = nesting.max(depth);
            }
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    let branches = BRANCH_KEYWORDS.find_iter(content).count()
        + content.matches("&&").count()
        + content.matches("||").count()
        + content.matches(" ? ").count();
    let cyclomatic = 1 + branches as u32;

    let score = (loc / 10 + nesting * 5 + cyclomatic * 2).min(100) as u8;
    Complexity {
        loc,
        nesting,
        cyclomatic,
        score,
    }
}

pub fn file_type_of(path: &str) -> FileType {
    let lower = path.to_ascii_lowercase();
    if lower.contains(".test.") || lower.contains(".spec.") || lower.contains("__tests__") {
        return FileType::Test;
    }
    if lower.ends_with(".json") || lower.ends_with(".yaml") || lower.ends_with(".yml") {
        return FileType::Config;
    }
    let name = lower.rsplit('/').next().unwrap_or(&lower);
    if name.starts_with('.') || name.ends_with(".config.ts") || name.ends_with(".config.js") {
        return FileType::Config;
    }
    if lower.ends_with(".ts") || lower.ends_with(".tsx") || lower.ends_with(".js") || lower.ends_with(".jsx") {
        return FileType::Source;
    }
    FileType::Other
}

const RESOLVE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx"];

/// Lexically normalize `./` and `../` segments of `dir/spec`.
fn normalize_relative(dir: &str, spec: &str) -> Option<String> {
    let mut parts: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };
    for segment in spec.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                // Escaping the project root makes the import external.
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Resolve a relative import specifier to an actual indexed file path.
///
/// External packages (bare specifiers) and unresolvable targets return
/// `None`. A trailing source extension in the specifier is honored first,
/// then the usual extension and `index.*` candidates are tried.
pub fn resolve_import(from: &str, spec: &str, all_paths: &BTreeSet<String>) -> Option<String> {
    if !spec.starts_with("./") && !spec.starts_with("../") {
        return None;
    }
    let dir = match from.rfind('/') {
        Some(pos) => &from[..pos],
        None => "",
    };
    let base = normalize_relative(dir, spec)?;

    if RESOLVE_EXTENSIONS.iter().any(|ext| base.ends_with(ext)) && all_paths.contains(&base) {
        return Some(base);
    }
    for ext in RESOLVE_EXTENSIONS {
        let candidate = format!("{base}{ext}");
        if all_paths.contains(&candidate) {
            return Some(candidate);
        }
    }
    for ext in RESOLVE_EXTENSIONS {
        let candidate = format!("{base}/index{ext}");
        if all_paths.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Resolved internal dependencies of one file, sorted and deduplicated.
pub fn dependencies_of(path: &str, ast: &FileAst, all_paths: &BTreeSet<String>) -> Vec<String> {
    let mut deps: BTreeSet<String> = BTreeSet::new();
    for import in &ast.imports {
        if let Some(resolved) = resolve_import(path, &import.source, all_paths)
            && resolved != path
        {
            deps.insert(resolved);
        }
    }
    deps.into_iter().collect()
}

fn is_entry_name(path: &str) -> bool {
    let depth = path.matches('/').count();
    if depth > 1 {
        return false;
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    matches!(stem, "index" | "main" | "app")
}

/// Derive metadata for every file at once.
///
/// Both dependency directions are computed from the same resolution pass so
/// the `a in deps(b) <=> b in dependents(a)` invariant holds by
/// construction.
pub fn build_metas(
    files: &BTreeMap<String, (FileAst, String)>,
) -> BTreeMap<String, FileMeta> {
    let all_paths: BTreeSet<String> = files.keys().cloned().collect();

    let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (path, (ast, _)) in files {
        let deps = dependencies_of(path, ast, &all_paths);
        for dep in &deps {
            dependents.entry(dep.clone()).or_default().insert(path.clone());
        }
        dependencies.insert(path.clone(), deps);
    }

    files
        .iter()
        .map(|(path, (_, content))| {
            let deps = dependencies.remove(path).unwrap_or_default();
            let dependents: Vec<String> = dependents
                .get(path)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();
            let is_hub = dependents.len() > HUB_THRESHOLD;
            let is_entry_point =
                is_entry_name(path) || (deps.len() >= 5 && dependents.is_empty());
            let meta = FileMeta {
                complexity: complexity_of(content),
                dependencies: deps,
                dependents,
                is_hub,
                is_entry_point,
                file_type: file_type_of(path),
            };
            (path.clone(), meta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ast::parse_source;
    use crate::index::types::Lang;

    fn files_from(sources: &[(&str, &str)]) -> BTreeMap<String, (FileAst, String)> {
        sources
            .iter()
            .map(|(path, src)| {
                let lang = Lang::from_path(path).unwrap_or(Lang::Ts);
                ((*path).to_string(), (parse_source(src, lang), (*src).to_string()))
            })
            .collect()
    }

    #[test]
    fn score_is_bounded_and_documented_formula() {
        let c = complexity_of("const x = 1;\n");
        assert_eq!(c.cyclomatic, 1);
        assert_eq!(c.score, 2);

        let busy: String = "if (a && b) { while (c) { d = e ? f : g; } }\n".repeat(200);
        let c = complexity_of(&busy);
        assert_eq!(c.score, 100);
    }

    #[test]
    fn nesting_tracks_max_depth() {
        let c = complexity_of("function f() { if (x) { if (y) { z(); } } }");
        assert_eq!(c.nesting, 3);
    }

    #[test]
    fn comment_lines_do_not_count_as_loc() {
        let c = complexity_of("// comment\n/* block\n * inner\n */\nconst x = 1;\n\n");
        assert_eq!(c.loc, 1);
    }

    #[test]
    fn file_types_classified() {
        assert_eq!(file_type_of("src/a.ts"), FileType::Source);
        assert_eq!(file_type_of("src/a.test.ts"), FileType::Test);
        assert_eq!(file_type_of("src/__tests__/a.ts"), FileType::Test);
        assert_eq!(file_type_of("package.json"), FileType::Config);
        assert_eq!(file_type_of("jest.config.js"), FileType::Config);
        assert_eq!(file_type_of(".eslintrc.yml"), FileType::Config);
    }

    #[test]
    fn resolve_handles_dot_segments_and_extensions() {
        let paths: BTreeSet<String> = ["src/a.ts", "src/lib/util.ts", "src/lib/index.ts"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            resolve_import("src/b.ts", "./a", &paths).as_deref(),
            Some("src/a.ts")
        );
        assert_eq!(
            resolve_import("src/lib/util.ts", "../a.ts", &paths).as_deref(),
            Some("src/a.ts")
        );
        assert_eq!(
            resolve_import("src/a.ts", "./lib", &paths).as_deref(),
            Some("src/lib/index.ts")
        );
        assert_eq!(resolve_import("src/a.ts", "react", &paths), None);
        assert_eq!(resolve_import("src/a.ts", "./missing", &paths), None);
        assert_eq!(resolve_import("src/a.ts", "../../outside", &paths), None);
    }

    #[test]
    fn deps_and_dependents_are_symmetric() {
        let files = files_from(&[
            ("src/a.ts", "export function f(){}"),
            ("src/b.ts", "import {f} from './a';\nf();"),
        ]);
        let metas = build_metas(&files);
        assert_eq!(metas["src/b.ts"].dependencies, vec!["src/a.ts"]);
        assert_eq!(metas["src/a.ts"].dependents, vec!["src/b.ts"]);
        assert!(metas["src/a.ts"].dependencies.is_empty());
        // Invariant both ways for every pair.
        for (path, meta) in &metas {
            for dep in &meta.dependencies {
                assert!(metas[dep].dependents.contains(path));
            }
            for dependent in &meta.dependents {
                assert!(metas[dependent].dependencies.contains(path));
            }
        }
    }

    #[test]
    fn hub_flag_requires_more_than_threshold() {
        let mut sources: Vec<(String, String)> = vec![(
            "src/core.ts".to_string(),
            "export function core(){}".to_string(),
        )];
        for i in 0..6 {
            sources.push((
                format!("src/user{i}.ts"),
                "import {core} from './core';".to_string(),
            ));
        }
        let files = files_from(
            &sources
                .iter()
                .map(|(p, s)| (p.as_str(), s.as_str()))
                .collect::<Vec<_>>(),
        );
        let metas = build_metas(&files);
        assert!(metas["src/core.ts"].is_hub);
        assert_eq!(metas["src/core.ts"].dependents.len(), 6);
        assert!(!metas["src/user0.ts"].is_hub);
    }

    #[test]
    fn entry_points_by_name_and_shape() {
        let files = files_from(&[
            ("src/index.ts", "export {}"),
            ("src/deep/nested/index.ts", "export {}"),
        ]);
        let metas = build_metas(&files);
        assert!(metas["src/index.ts"].is_entry_point);
        assert!(!metas["src/deep/nested/index.ts"].is_entry_point);
    }
}
