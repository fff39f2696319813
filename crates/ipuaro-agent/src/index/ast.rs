//! Single-file AST summarization over tree-sitter.
//!
//! One CST walk per file extracts imports, exports and top-level
//! declarations into the language-neutral [`FileAst`]. Line numbers are
//! 1-based and refer to the content handed in, so they stay aligned with the
//! stored [`crate::index::types::FileRecord`] for the lifetime of the index.

use tree_sitter::{Node, Parser};

use crate::index::types::{
    ClassInfo, ExportInfo, FileAst, FunctionInfo, ImportInfo, InterfaceInfo, Lang, MethodInfo,
    PropertyInfo, SymbolKind, TypeAliasInfo, Visibility,
};

fn language_for(lang: Lang) -> tree_sitter::Language {
    match lang {
        Lang::Ts => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Lang::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        // The JavaScript grammar covers JSX syntax.
        Lang::Js | Lang::Jsx => tree_sitter_javascript::LANGUAGE.into(),
    }
}

/// Parse one source file into its summary.
///
/// A syntactically broken file yields `parse_error: true` with empty
/// collections; the caller keeps the file's record but drops it from symbol
/// indexing.
pub fn parse_source(source: &str, lang: Lang) -> FileAst {
    let mut parser = Parser::new();
    if parser.set_language(&language_for(lang)).is_err() {
        return FileAst::error("grammar failed to load");
    }
    let Some(tree) = parser.parse(source, None) else {
        return FileAst::error("parser returned no tree");
    };
    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root);
        return FileAst::error(format!("syntax error near line {line}"));
    }

    let mut extractor = Extractor {
        src: source.as_bytes(),
        ast: FileAst::default(),
    };
    extractor.visit_program(root);
    extractor.resolve_export_kinds();
    extractor.ast
}

fn first_error_line(root: Node) -> u32 {
    let mut cursor = root.walk();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return node.start_position().row as u32 + 1;
        }
        stack.extend(node.children(&mut cursor));
    }
    root.start_position().row as u32 + 1
}

struct Extractor<'a> {
    src: &'a [u8],
    ast: FileAst,
}

impl<'a> Extractor<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.src).unwrap_or_default().to_string()
    }

    fn line_start(node: Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn line_end(node: Node) -> u32 {
        node.end_position().row as u32 + 1
    }

    fn has_token(&self, node: Node, token: &str) -> bool {
        let mut cursor = node.walk();
        node.children(&mut cursor).any(|c| c.kind() == token)
    }

    fn visit_program(&mut self, root: Node) {
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            self.visit_statement(child, false);
        }
    }

    fn visit_statement(&mut self, node: Node, exported: bool) {
        match node.kind() {
            "import_statement" => self.visit_import(node),
            "export_statement" => self.visit_export(node),
            "function_declaration" | "generator_function_declaration" => {
                if let Some(func) = self.function_info(node, exported) {
                    if exported {
                        self.push_export(&func.name, func.line_start, SymbolKind::Function);
                    }
                    self.ast.functions.push(func);
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                self.visit_variable_declaration(node, exported);
            }
            "class_declaration" => self.visit_class(node, exported, false),
            "abstract_class_declaration" => self.visit_class(node, exported, true),
            "interface_declaration" => self.visit_interface(node, exported),
            "type_alias_declaration" => self.visit_type_alias(node, exported),
            _ => {}
        }
    }

    fn visit_import(&mut self, node: Node) {
        let Some(source_node) = node.child_by_field_name("source") else {
            return;
        };
        let mut info = ImportInfo {
            source: strip_quotes(&self.text(source_node)),
            names: Vec::new(),
            default: None,
            namespace: None,
            line: Self::line_start(node),
            is_type_only: self.has_token(node, "type"),
        };

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "import_clause" {
                continue;
            }
            let mut clause_cursor = child.walk();
            for part in child.named_children(&mut clause_cursor) {
                match part.kind() {
                    "identifier" => info.default = Some(self.text(part)),
                    "namespace_import" => {
                        let mut ns_cursor = part.walk();
                        if let Some(name) = part
                            .named_children(&mut ns_cursor)
                            .find(|n| n.kind() == "identifier")
                        {
                            info.namespace = Some(self.text(name));
                        }
                    }
                    "named_imports" => {
                        let mut import_cursor = part.walk();
                        for spec in part.named_children(&mut import_cursor) {
                            if spec.kind() == "import_specifier"
                                && let Some(name) = spec.child_by_field_name("name")
                            {
                                // The local binding is the alias when present.
                                let local = spec
                                    .child_by_field_name("alias")
                                    .unwrap_or(name);
                                info.names.push(self.text(local));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        self.ast.imports.push(info);
    }

    fn visit_export(&mut self, node: Node) {
        // `export * from '…'` re-exports carry no local names.
        if let Some(declaration) = node.child_by_field_name("declaration") {
            self.visit_statement(declaration, true);
            return;
        }

        if self.has_token(node, "default") {
            // `export default function f(){}` arrives via the declaration
            // field; anything else is an anonymous default value.
            if let Some(value) = node.child_by_field_name("value") {
                match value.kind() {
                    "function_expression" | "arrow_function" | "function" => {
                        self.push_export("default", Self::line_start(node), SymbolKind::Function);
                    }
                    "class" => {
                        self.push_export("default", Self::line_start(node), SymbolKind::Class);
                    }
                    _ => {
                        self.push_export("default", Self::line_start(node), SymbolKind::Variable);
                    }
                }
            }
            return;
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "export_clause" {
                continue;
            }
            let mut spec_cursor = child.walk();
            for spec in child.named_children(&mut spec_cursor) {
                if spec.kind() == "export_specifier"
                    && let Some(name) = spec.child_by_field_name("name")
                {
                    let public = spec.child_by_field_name("alias").unwrap_or(name);
                    // Kind is resolved against local declarations afterwards.
                    self.push_export(
                        &self.text(public),
                        Self::line_start(spec),
                        SymbolKind::Variable,
                    );
                }
            }
        }
    }

    fn function_info(&self, node: Node, exported: bool) -> Option<FunctionInfo> {
        let name = node.child_by_field_name("name")?;
        Some(FunctionInfo {
            name: self.text(name),
            line_start: Self::line_start(node),
            line_end: Self::line_end(node),
            params: self.params_of(node.child_by_field_name("parameters")),
            is_async: self.has_token(node, "async"),
            is_exported: exported,
        })
    }

    fn visit_variable_declaration(&mut self, node: Node, exported: bool) {
        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name_node.kind() != "identifier" {
                // Destructuring patterns don't produce single symbols.
                continue;
            }
            let name = self.text(name_node);
            let value = declarator.child_by_field_name("value");

            match value.map(|v| v.kind()) {
                Some("arrow_function") | Some("function_expression") | Some("function") => {
                    let value = value.unwrap_or(declarator);
                    if exported {
                        self.push_export(&name, Self::line_start(node), SymbolKind::Function);
                    }
                    self.ast.functions.push(FunctionInfo {
                        name,
                        line_start: Self::line_start(node),
                        line_end: Self::line_end(declarator),
                        params: self.params_of(value.child_by_field_name("parameters")),
                        is_async: self.has_token(value, "async"),
                        is_exported: exported,
                    });
                }
                _ => {
                    if exported {
                        self.push_export(&name, Self::line_start(node), SymbolKind::Variable);
                    }
                }
            }
        }
    }

    fn visit_class(&mut self, node: Node, exported: bool, is_abstract: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let mut info = ClassInfo {
            name: self.text(name_node),
            line_start: Self::line_start(node),
            line_end: Self::line_end(node),
            methods: Vec::new(),
            properties: Vec::new(),
            extends: None,
            implements: Vec::new(),
            is_abstract,
            is_exported: exported,
        };

        self.collect_heritage(node, &mut info);

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                match member.kind() {
                    "method_definition" | "abstract_method_signature" => {
                        if let Some(method) = self.method_info(member) {
                            info.methods.push(method);
                        }
                    }
                    "public_field_definition" | "field_definition" => {
                        if let Some(name) = member.child_by_field_name("name") {
                            info.properties.push(PropertyInfo {
                                name: self.text(name),
                                line: Self::line_start(member),
                                is_static: self.has_token(member, "static"),
                                visibility: self.visibility_of(member, name),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        if exported {
            self.push_export(&info.name, info.line_start, SymbolKind::Class);
        }
        self.ast.classes.push(info);
    }

    /// Pull `extends` / `implements` out of the heritage clause. The ts
    /// grammar nests dedicated clauses under `class_heritage`; the js grammar
    /// puts a bare expression there.
    fn collect_heritage(&self, node: Node, info: &mut ClassInfo) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "class_heritage" {
                continue;
            }
            let mut heritage_cursor = child.walk();
            let mut saw_clause = false;
            for clause in child.named_children(&mut heritage_cursor) {
                match clause.kind() {
                    "extends_clause" => {
                        saw_clause = true;
                        let mut c = clause.walk();
                        if let Some(expr) = clause.named_children(&mut c).next() {
                            info.extends = Some(self.text(expr));
                        }
                    }
                    "implements_clause" => {
                        saw_clause = true;
                        let mut c = clause.walk();
                        for ty in clause.named_children(&mut c) {
                            info.implements.push(self.text(ty));
                        }
                    }
                    _ => {}
                }
            }
            if !saw_clause {
                // js grammar: `class A extends B` keeps B directly here.
                let mut c = child.walk();
                if let Some(expr) = child.named_children(&mut c).next() {
                    info.extends = Some(self.text(expr));
                }
            }
        }
    }

    fn method_info(&self, node: Node) -> Option<MethodInfo> {
        let name_node = node.child_by_field_name("name")?;
        Some(MethodInfo {
            name: self.text(name_node),
            line_start: Self::line_start(node),
            line_end: Self::line_end(node),
            params: self.params_of(node.child_by_field_name("parameters")),
            is_async: self.has_token(node, "async"),
            is_static: self.has_token(node, "static"),
            visibility: self.visibility_of(node, name_node),
        })
    }

    fn visibility_of(&self, member: Node, name_node: Node) -> Visibility {
        if name_node.kind() == "private_property_identifier" {
            return Visibility::Private;
        }
        let mut cursor = member.walk();
        for child in member.children(&mut cursor) {
            if child.kind() == "accessibility_modifier" {
                return match self.text(child).as_str() {
                    "private" => Visibility::Private,
                    "protected" => Visibility::Protected,
                    _ => Visibility::Public,
                };
            }
        }
        Visibility::Public
    }

    fn visit_interface(&mut self, node: Node, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let mut extends = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "extends_type_clause" {
                let mut c = child.walk();
                for ty in child.named_children(&mut c) {
                    extends.push(self.text(ty));
                }
            }
        }
        let info = InterfaceInfo {
            name: self.text(name_node),
            line_start: Self::line_start(node),
            line_end: Self::line_end(node),
            extends,
            is_exported: exported,
        };
        if exported {
            self.push_export(&info.name, info.line_start, SymbolKind::Interface);
        }
        self.ast.interfaces.push(info);
    }

    fn visit_type_alias(&mut self, node: Node, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let info = TypeAliasInfo {
            name: self.text(name_node),
            line: Self::line_start(node),
            is_exported: exported,
        };
        if exported {
            self.push_export(&info.name, info.line, SymbolKind::Type);
        }
        self.ast.type_aliases.push(info);
    }

    fn params_of(&self, parameters: Option<Node>) -> Vec<String> {
        let Some(parameters) = parameters else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = parameters.walk();
        for param in parameters.named_children(&mut cursor) {
            let name_node = match param.kind() {
                // ts: required_parameter / optional_parameter wrap a pattern.
                "required_parameter" | "optional_parameter" => {
                    param.child_by_field_name("pattern").unwrap_or(param)
                }
                // js: `x = default` is an assignment_pattern.
                "assignment_pattern" => param.child_by_field_name("left").unwrap_or(param),
                _ => param,
            };
            out.push(self.text(name_node));
        }
        out
    }

    fn push_export(&mut self, name: &str, line: u32, kind: SymbolKind) {
        self.ast.exports.push(ExportInfo {
            name: name.to_string(),
            line,
            kind,
        });
    }

    /// Exports declared via `export { a, b }` are recorded with a placeholder
    /// kind; fix them up against the local declarations.
    fn resolve_export_kinds(&mut self) {
        for export in &mut self.ast.exports {
            if export.kind != SymbolKind::Variable {
                continue;
            }
            if self.ast.functions.iter().any(|f| f.name == export.name) {
                export.kind = SymbolKind::Function;
            } else if self.ast.classes.iter().any(|c| c.name == export.name) {
                export.kind = SymbolKind::Class;
            } else if self.ast.interfaces.iter().any(|i| i.name == export.name) {
                export.kind = SymbolKind::Interface;
            } else if self.ast.type_aliases.iter().any(|t| t.name == export.name) {
                export.kind = SymbolKind::Type;
            }
        }
    }
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '\'' || c == '"' || c == '`').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_exported_function() {
        let ast = parse_source("export function f(){}", Lang::Ts);
        assert!(!ast.parse_error);
        assert_eq!(ast.functions.len(), 1);
        let f = &ast.functions[0];
        assert_eq!(f.name, "f");
        assert_eq!(f.line_start, 1);
        assert!(f.is_exported);
        assert!(!f.is_async);
        assert_eq!(ast.exports.len(), 1);
        assert_eq!(ast.exports[0].kind, SymbolKind::Function);
    }

    #[test]
    fn extracts_imports() {
        let src = "import {f, g as h} from './a';\nimport def from 'pkg';\nimport * as ns from './ns';";
        let ast = parse_source(src, Lang::Ts);
        assert_eq!(ast.imports.len(), 3);
        assert_eq!(ast.imports[0].source, "./a");
        assert_eq!(ast.imports[0].names, vec!["f", "h"]);
        assert_eq!(ast.imports[0].line, 1);
        assert_eq!(ast.imports[1].default.as_deref(), Some("def"));
        assert_eq!(ast.imports[2].namespace.as_deref(), Some("ns"));
    }

    #[test]
    fn type_only_import_flagged() {
        let ast = parse_source("import type {T} from './types';", Lang::Ts);
        assert_eq!(ast.imports.len(), 1);
        assert!(ast.imports[0].is_type_only);
    }

    #[test]
    fn async_arrow_function_is_a_function() {
        let src = "export const handler = async (req, res) => {\n  return res;\n};";
        let ast = parse_source(src, Lang::Ts);
        assert_eq!(ast.functions.len(), 1);
        let f = &ast.functions[0];
        assert_eq!(f.name, "handler");
        assert!(f.is_async);
        assert!(f.is_exported);
        assert_eq!(f.params, vec!["req", "res"]);
        assert_eq!(f.line_start, 1);
        assert_eq!(f.line_end, 3);
    }

    #[test]
    fn class_with_members_and_heritage() {
        let src = "export abstract class Repo extends Base implements Store, Closeable {\n  private url: string;\n  static of(x) { return new RepoImpl(x); }\n  async fetch(id) {}\n}";
        let ast = parse_source(src, Lang::Ts);
        assert_eq!(ast.classes.len(), 1);
        let class = &ast.classes[0];
        assert_eq!(class.name, "Repo");
        assert!(class.is_abstract);
        assert!(class.is_exported);
        assert_eq!(class.extends.as_deref(), Some("Base"));
        assert_eq!(class.implements, vec!["Store", "Closeable"]);
        assert_eq!(class.properties.len(), 1);
        assert_eq!(class.properties[0].visibility, Visibility::Private);
        assert_eq!(class.methods.len(), 2);
        let of = class.methods.iter().find(|m| m.name == "of").unwrap();
        assert!(of.is_static);
        let fetch = class.methods.iter().find(|m| m.name == "fetch").unwrap();
        assert!(fetch.is_async);
        assert_eq!(fetch.params, vec!["id"]);
    }

    #[test]
    fn interface_and_type_alias() {
        let src = "export interface Shape extends Sized {}\nexport type Point = {x: number};";
        let ast = parse_source(src, Lang::Ts);
        assert_eq!(ast.interfaces.len(), 1);
        assert_eq!(ast.interfaces[0].name, "Shape");
        assert_eq!(ast.interfaces[0].extends, vec!["Sized"]);
        assert_eq!(ast.type_aliases.len(), 1);
        assert_eq!(ast.type_aliases[0].name, "Point");
        let kinds: Vec<SymbolKind> = ast.exports.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![SymbolKind::Interface, SymbolKind::Type]);
    }

    #[test]
    fn export_clause_resolves_declared_kind() {
        let src = "function helper() {}\nclass Widget {}\nexport { helper, Widget };";
        let ast = parse_source(src, Lang::Ts);
        assert_eq!(ast.exports.len(), 2);
        let helper = ast.exports.iter().find(|e| e.name == "helper").unwrap();
        assert_eq!(helper.kind, SymbolKind::Function);
        let widget = ast.exports.iter().find(|e| e.name == "Widget").unwrap();
        assert_eq!(widget.kind, SymbolKind::Class);
        // Local declarations are captured but not marked exported.
        assert!(!ast.functions[0].is_exported);
    }

    #[test]
    fn jsx_component_parses_with_js_grammar() {
        let src = "export function App() {\n  return <div className=\"x\">hi</div>;\n}";
        let ast = parse_source(src, Lang::Jsx);
        assert!(!ast.parse_error, "{:?}", ast.parse_error_message);
        assert_eq!(ast.functions.len(), 1);
        assert_eq!(ast.functions[0].name, "App");
    }

    #[test]
    fn tsx_component_parses_with_tsx_grammar() {
        let src = "export const View = ({title}: {title: string}) => <h1>{title}</h1>;";
        let ast = parse_source(src, Lang::Tsx);
        assert!(!ast.parse_error, "{:?}", ast.parse_error_message);
        assert_eq!(ast.functions.len(), 1);
        assert_eq!(ast.functions[0].name, "View");
    }

    #[test]
    fn broken_source_reports_parse_error_with_empty_collections() {
        let ast = parse_source("export function (((", Lang::Ts);
        assert!(ast.parse_error);
        assert!(ast.parse_error_message.as_deref().unwrap_or("").contains("line"));
        assert!(ast.functions.is_empty());
        assert!(ast.exports.is_empty());
    }

    #[test]
    fn line_numbers_are_one_based_and_exact() {
        let src = "// header\n\nexport function first(){}\n\nexport function second(){\n  return 1;\n}";
        let ast = parse_source(src, Lang::Ts);
        let first = ast.functions.iter().find(|f| f.name == "first").unwrap();
        assert_eq!((first.line_start, first.line_end), (3, 3));
        let second = ast.functions.iter().find(|f| f.name == "second").unwrap();
        assert_eq!((second.line_start, second.line_end), (5, 7));
    }

    #[test]
    fn default_export_recorded() {
        let ast = parse_source("export default function main(){}", Lang::Ts);
        // Named default functions land in both lists.
        assert_eq!(ast.functions.len(), 1);
        assert_eq!(ast.functions[0].name, "main");
        assert!(ast.exports.iter().any(|e| e.name == "main"));
    }
}
