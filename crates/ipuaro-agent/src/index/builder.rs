//! Aggregation of per-file ASTs into the global symbol index and the
//! dependency graph. Inputs are ordered maps, so two builds over the same
//! ASTs are byte-identical.

use std::collections::{BTreeMap, BTreeSet};

use crate::index::meta::dependencies_of;
use crate::index::types::{DepsGraph, FileAst, SymbolIndex, SymbolKind, SymbolLocation};

/// Collect every export and top-level declaration into
/// `symbol -> locations`, sorted by `(path, line, kind)` per symbol.
pub fn build_symbol_index(asts: &BTreeMap<String, FileAst>) -> SymbolIndex {
    // A declaration that is also exported would appear twice; the set
    // collapses duplicates before ordering.
    let mut seen: BTreeMap<String, BTreeSet<(String, u32, SymbolKind)>> = BTreeMap::new();
    let mut record = |name: &str, path: &str, line: u32, kind: SymbolKind| {
        seen.entry(name.to_string())
            .or_default()
            .insert((path.to_string(), line, kind));
    };

    for (path, ast) in asts {
        if ast.parse_error {
            continue;
        }
        for export in &ast.exports {
            record(&export.name, path, export.line, export.kind);
        }
        for function in &ast.functions {
            record(&function.name, path, function.line_start, SymbolKind::Function);
        }
        for class in &ast.classes {
            record(&class.name, path, class.line_start, SymbolKind::Class);
        }
        for interface in &ast.interfaces {
            record(&interface.name, path, interface.line_start, SymbolKind::Interface);
        }
        for alias in &ast.type_aliases {
            record(&alias.name, path, alias.line, SymbolKind::Type);
        }
    }

    SymbolIndex(
        seen.into_iter()
            .map(|(name, locations)| {
                let locations = locations
                    .into_iter()
                    .map(|(path, line, kind)| SymbolLocation { path, line, kind })
                    .collect();
                (name, locations)
            })
            .collect(),
    )
}

/// Assemble both dependency directions from resolved imports.
pub fn build_deps_graph(asts: &BTreeMap<String, FileAst>) -> DepsGraph {
    let all_paths: BTreeSet<String> = asts.keys().cloned().collect();
    let mut graph = DepsGraph::default();

    for (path, ast) in asts {
        let deps = dependencies_of(path, ast, &all_paths);
        if deps.is_empty() {
            continue;
        }
        for dep in &deps {
            graph
                .imported_by
                .entry(dep.clone())
                .or_default()
                .insert(path.clone());
        }
        graph.imports.insert(path.clone(), deps.into_iter().collect());
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ast::parse_source;
    use crate::index::types::Lang;

    fn asts_from(sources: &[(&str, &str)]) -> BTreeMap<String, FileAst> {
        sources
            .iter()
            .map(|(path, src)| {
                let lang = Lang::from_path(path).unwrap_or(Lang::Ts);
                ((*path).to_string(), parse_source(src, lang))
            })
            .collect()
    }

    #[test]
    fn symbol_index_collects_exports_and_declarations() {
        let asts = asts_from(&[
            ("src/a.ts", "export function f(){}"),
            ("src/b.ts", "import {f} from './a'; f();"),
        ]);
        let index = build_symbol_index(&asts);
        let locations = index.lookup("f");
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].path, "src/a.ts");
        assert_eq!(locations[0].line, 1);
        assert_eq!(locations[0].kind, SymbolKind::Function);
    }

    #[test]
    fn overloaded_symbol_keeps_every_location_sorted() {
        let asts = asts_from(&[
            ("src/x.ts", "export function run(){}"),
            ("src/y.ts", "export function run(){}"),
        ]);
        let index = build_symbol_index(&asts);
        let locations = index.lookup("run");
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].path, "src/x.ts");
        assert_eq!(locations[1].path, "src/y.ts");
    }

    #[test]
    fn parse_error_files_contribute_no_symbols() {
        let asts = asts_from(&[
            ("src/good.ts", "export function ok(){}"),
            ("src/bad.ts", "export function (((("),
        ]);
        let index = build_symbol_index(&asts);
        assert_eq!(index.lookup("ok").len(), 1);
        assert_eq!(index.0.len(), 1);
    }

    #[test]
    fn deps_graph_maintains_both_directions() {
        let asts = asts_from(&[
            ("src/a.ts", "export function f(){}"),
            ("src/b.ts", "import {f} from './a'; f();"),
        ]);
        let graph = build_deps_graph(&asts);
        assert!(graph.imports["src/b.ts"].contains("src/a.ts"));
        assert!(graph.imported_by["src/a.ts"].contains("src/b.ts"));
        assert!(!graph.imports.contains_key("src/a.ts"));

        for (path, deps) in &graph.imports {
            for dep in deps {
                assert!(graph.imported_by[dep].contains(path));
            }
        }
        for (path, dependents) in &graph.imported_by {
            for dependent in dependents {
                assert!(graph.imports[dependent].contains(path));
            }
        }
    }

    #[test]
    fn rebuilds_are_byte_identical() {
        let asts = asts_from(&[
            ("src/a.ts", "export function f(){}\nexport class C {}"),
            ("src/b.ts", "import {f} from './a';\nexport const g = () => f();"),
            ("src/c.ts", "import {g} from './b';\ng();"),
        ]);
        let first_symbols = serde_json::to_vec(&build_symbol_index(&asts)).unwrap();
        let second_symbols = serde_json::to_vec(&build_symbol_index(&asts)).unwrap();
        assert_eq!(first_symbols, second_symbols);

        let first_deps = serde_json::to_vec(&build_deps_graph(&asts)).unwrap();
        let second_deps = serde_json::to_vec(&build_deps_graph(&asts)).unwrap();
        assert_eq!(first_deps, second_deps);
    }
}
