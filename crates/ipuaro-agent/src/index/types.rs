//! Persistent index entities: file records, AST summaries, derived metadata,
//! the global symbol index and the dependency graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::hash::content_hash;

/// Supported source dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ts,
    Tsx,
    Js,
    Jsx,
}

impl Lang {
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?;
        match ext {
            "ts" => Some(Lang::Ts),
            "tsx" => Some(Lang::Tsx),
            "js" => Some(Lang::Js),
            "jsx" => Some(Lang::Jsx),
            _ => None,
        }
    }
}

/// Indexed snapshot of one file's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Project-relative, forward-slash normalized.
    pub path: String,
    pub lines: Vec<String>,
    /// 16-hex content hash; equal hashes imply equal lines.
    pub hash: String,
    /// Size in bytes at index time.
    pub size: u64,
    /// Unix mtime seconds at index time.
    pub mtime: i64,
}

impl FileRecord {
    pub fn from_content(path: impl Into<String>, content: &str, size: u64, mtime: i64) -> Self {
        Self {
            path: path.into(),
            lines: content.lines().map(str::to_string).collect(),
            hash: content_hash(content.as_bytes()),
            size,
            mtime,
        }
    }

    pub fn content(&self) -> String {
        self.lines.join("\n")
    }
}

/// TS accessibility modifier; `Private` also covers `#`-named members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub params: Vec<String>,
    pub is_async: bool,
    pub is_exported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub params: Vec<String>,
    pub is_async: bool,
    pub is_static: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub name: String,
    pub line: u32,
    pub is_static: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub methods: Vec<MethodInfo>,
    pub properties: Vec<PropertyInfo>,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub is_abstract: bool,
    pub is_exported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub extends: Vec<String>,
    pub is_exported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasInfo {
    pub name: String,
    pub line: u32,
    pub is_exported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Import specifier as written (`./a`, `react`).
    pub source: String,
    /// Named bindings.
    pub names: Vec<String>,
    pub default: Option<String>,
    pub namespace: Option<String>,
    pub line: u32,
    pub is_type_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportInfo {
    pub name: String,
    pub line: u32,
    pub kind: SymbolKind,
}

/// Language-neutral AST summary of one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAst {
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub interfaces: Vec<InterfaceInfo>,
    pub type_aliases: Vec<TypeAliasInfo>,
    pub parse_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error_message: Option<String>,
}

impl FileAst {
    /// Summary that marks the file non-indexable for symbols.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            parse_error: true,
            parse_error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Source,
    Test,
    Config,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complexity {
    /// Non-blank, non-comment lines.
    pub loc: u32,
    /// Maximum brace-nesting depth.
    pub nesting: u32,
    pub cyclomatic: u32,
    /// 0..=100, see `index::meta` for the formula.
    pub score: u8,
}

/// Derived per-file metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub complexity: Complexity,
    /// Resolved internal imports (actual project-relative file paths).
    pub dependencies: Vec<String>,
    /// Files importing this one.
    pub dependents: Vec<String>,
    pub is_hub: bool,
    pub is_entry_point: bool,
    pub file_type: FileType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub path: String,
    pub line: u32,
    pub kind: SymbolKind,
}

/// Global `symbol name -> declaration sites` map. Ordered containers keep
/// rebuilds byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolIndex(pub BTreeMap<String, Vec<SymbolLocation>>);

impl SymbolIndex {
    pub fn lookup(&self, symbol: &str) -> &[SymbolLocation] {
        self.0.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_definition(&self, symbol: &str, path: &str, line: u32) -> bool {
        self.lookup(symbol)
            .iter()
            .any(|loc| loc.path == path && loc.line == line)
    }
}

/// Per-file import and imported-by sets; both directions kept together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepsGraph {
    pub imports: BTreeMap<String, BTreeSet<String>>,
    pub imported_by: BTreeMap<String, BTreeSet<String>>,
}

impl DepsGraph {
    pub fn dependencies_of(&self, path: &str) -> Vec<String> {
        self.imports
            .get(path)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, path: &str) -> Vec<String> {
        self.imported_by
            .get(path)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}
