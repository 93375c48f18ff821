//! Two-pass checking of one package.
//!
//! Pass one collects every package-level declaration (types first, so values
//! can be inferred against them). Pass two walks declarations and function
//! bodies with block scopes and binds every identifier it can to a symbol.
//! Nothing here fails: unresolvable names become diagnostics and the
//! affected identifiers are simply left unbound.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;
use tree_sitter::Node;

use crate::syntax::ParsedFile;
use crate::types::ty::{ChanDir, Field, InterfaceElem, NamedType, Param, Signature, Type};
use crate::types::universe;
use crate::types::{
    CheckedPackage, Diagnostic, FileIdents, IdentRef, Imports, Location, PackageTypes, Severity,
    Symbol, SymbolId, SymbolKind,
};

/// Deepest nesting of expressions, statements and types checked before
/// giving up on a subtree. Keeps recursion within a default thread stack.
const MAX_NESTING: usize = 200;

/// Checks the files of one package against its already-loaded imports.
pub fn check(path: &str, name: &str, files: &[ParsedFile], imports: &Imports) -> CheckedPackage {
    let mut checker = Checker::new(path, name, files, imports);
    checker.collect();
    checker.resolve_pending();
    checker.resolve_bodies();
    checker.finish()
}

#[derive(Debug, Clone, Copy)]
enum SpecKind {
    Var,
    Const { iota: usize },
}

/// A package-level var or const whose type may depend on other declarations.
struct Pending<'a> {
    file: usize,
    kind: SpecKind,
    name: Node<'a>,
    index: usize,
    type_node: Option<Node<'a>>,
    values: Vec<Node<'a>>,
    doc: Option<String>,
}

struct Checker<'a> {
    path: &'a str,
    name: &'a str,
    files: &'a [ParsedFile],
    imports: &'a Imports,
    type_names: HashSet<String>,
    scope: IndexMap<String, Arc<Symbol>>,
    pending: IndexMap<String, Pending<'a>>,
    methods: HashMap<String, Vec<Arc<Symbol>>>,
    file_scopes: Vec<HashMap<String, Arc<Symbol>>>,
    dot_imports: Vec<Vec<Arc<PackageTypes>>>,
    idents: Vec<FileIdents>,
    diagnostics: Vec<Diagnostic>,
    locals: Vec<HashMap<String, Arc<Symbol>>>,
    file: usize,
    owner: Option<NamedType>,
    suppress: usize,
    doc: Option<String>,
    clause: Option<Location>,
    self_symbol: Option<Arc<Symbol>>,
    /// Current nesting of `walk`, `infer` and `type_from` calls.
    depth: usize,
    too_deep: bool,
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

fn field_nodes<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == token)
}

/// Declaration specs of a (possibly grouped) declaration.
fn specs<'t>(decl: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    for child in named_children(decl) {
        if kinds.contains(&child.kind()) {
            found.push(child);
        } else if child.kind().ends_with("_list") {
            found.extend(
                named_children(child)
                    .into_iter()
                    .filter(|spec| kinds.contains(&spec.kind())),
            );
        }
    }
    found
}

fn unquote(literal: &str) -> String {
    literal.trim_matches(|c| c == '"' || c == '`').to_string()
}

fn is_basic_literal(kind: &str) -> bool {
    matches!(
        kind,
        "int_literal"
            | "float_literal"
            | "imaginary_literal"
            | "rune_literal"
            | "interpreted_string_literal"
            | "raw_string_literal"
            | "true"
            | "false"
    )
}

fn is_type_node(kind: &str) -> bool {
    matches!(
        kind,
        "slice_type"
            | "array_type"
            | "implicit_length_array_type"
            | "map_type"
            | "pointer_type"
            | "channel_type"
            | "function_type"
            | "struct_type"
            | "interface_type"
            | "qualified_type"
            | "generic_type"
            | "parenthesized_type"
            | "type_identifier"
    )
}

impl<'a> Checker<'a> {
    fn new(path: &'a str, name: &'a str, files: &'a [ParsedFile], imports: &'a Imports) -> Self {
        Self {
            path,
            name,
            files,
            imports,
            type_names: HashSet::new(),
            scope: IndexMap::new(),
            pending: IndexMap::new(),
            methods: HashMap::new(),
            file_scopes: vec![HashMap::new(); files.len()],
            dot_imports: vec![Vec::new(); files.len()],
            idents: vec![FileIdents::default(); files.len()],
            diagnostics: Vec::new(),
            locals: Vec::new(),
            file: 0,
            owner: None,
            suppress: 0,
            doc: None,
            clause: None,
            self_symbol: None,
            depth: 0,
            too_deep: false,
        }
    }

    fn finish(self) -> CheckedPackage {
        debug!(
            package = self.path,
            symbols = self.scope.len(),
            diagnostics = self.diagnostics.len(),
            "package checked"
        );
        CheckedPackage {
            types: Arc::new(PackageTypes {
                path: self.path.to_string(),
                name: self.name.to_string(),
                scope: self.scope,
                methods: self.methods,
                doc: self.doc,
                clause: self.clause,
            }),
            idents: self.idents,
            diagnostics: self.diagnostics,
        }
    }

    // ------------------------------------------------------------------
    // helpers
    // ------------------------------------------------------------------

    fn text(&self, node: Node<'_>) -> &'a str {
        let files: &'a [ParsedFile] = self.files;
        &files[self.file].text[node.byte_range()]
    }

    fn location(&self, file: usize, node: Node<'_>) -> Option<Location> {
        let parsed = &self.files[file];
        parsed
            .lines
            .range(node.start_byte(), node.end_byte())
            .ok()
            .map(|range| Location {
                path: parsed.path.clone(),
                range,
            })
    }

    fn make_symbol(&self, node: Node<'_>, kind: SymbolKind, doc: Option<String>) -> Arc<Symbol> {
        Arc::new(Symbol {
            id: SymbolId {
                package: self.path.to_string(),
                name: self.text(node).to_string(),
                file: Some(self.files[self.file].path.clone()),
                offset: node.start_byte(),
            },
            package_name: self.name.to_string(),
            kind,
            doc,
            location: self.location(self.file, node),
        })
    }

    fn record(&mut self, node: Node<'_>, symbol: Arc<Symbol>) {
        self.idents[self.file].insert(
            node.start_byte(),
            IdentRef {
                end: node.end_byte(),
                symbol,
            },
        );
    }

    fn error(&mut self, node: Node<'_>, message: String) {
        if self.suppress > 0 {
            return;
        }
        let parsed = &self.files[self.file];
        self.diagnostics.push(Diagnostic {
            path: parsed.path.clone(),
            range: parsed
                .lines
                .range(node.start_byte(), node.end_byte())
                .unwrap_or_default(),
            severity: Severity::Error,
            message,
        });
    }

    /// Doc comment directly above `node`, with comment markers stripped.
    fn doc_comment(&self, node: Node<'_>) -> Option<String> {
        let mut comments = Vec::new();
        let mut next_row = node.start_position().row;
        let mut current = node.prev_sibling();

        while let Some(comment) = current {
            if comment.kind() != "comment" || comment.end_position().row + 1 < next_row {
                break;
            }
            // A comment trailing code on its line documents that code instead.
            if let Some(before) = comment.prev_sibling() {
                if before.end_position().row == comment.start_position().row {
                    break;
                }
            }
            comments.push(self.text(comment));
            next_row = comment.start_position().row;
            current = comment.prev_sibling();
        }

        let mut lines = Vec::new();
        for comment in comments.into_iter().rev() {
            if let Some(line) = comment.strip_prefix("//") {
                if line.starts_with("go:") || line.starts_with("line ") {
                    continue;
                }
                lines.push(line.strip_prefix(' ').unwrap_or(line).to_string());
            } else {
                let inner = comment
                    .trim_start_matches("/*")
                    .trim_end_matches("*/");
                lines.extend(inner.lines().map(|line| line.trim().to_string()));
            }
        }
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        while lines.first().is_some_and(|line| line.is_empty()) {
            lines.remove(0);
        }
        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    fn package_symbol(&self, dep: &PackageTypes) -> Arc<Symbol> {
        Arc::new(Symbol {
            id: SymbolId {
                package: dep.path.clone(),
                name: dep.name.clone(),
                file: None,
                offset: 0,
            },
            package_name: dep.name.clone(),
            kind: SymbolKind::Package {
                path: dep.path.clone(),
            },
            doc: dep.doc.clone(),
            location: dep.clause.clone(),
        })
    }

    fn scoped(&mut self, f: impl FnOnce(&mut Self)) {
        self.locals.push(HashMap::new());
        f(self);
        self.locals.pop();
    }

    fn define_local(&mut self, node: Node<'_>, kind: SymbolKind) -> Option<Arc<Symbol>> {
        let name = self.text(node);
        if name == "_" {
            return None;
        }
        let symbol = self.make_symbol(node, kind, None);
        self.record(node, Arc::clone(&symbol));
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(name.to_string(), Arc::clone(&symbol));
        }
        Some(symbol)
    }

    fn declare(&mut self, node: Node<'_>, symbol: Arc<Symbol>) {
        let name = symbol.name().to_string();
        if name == "_" {
            return;
        }
        if self.scope.contains_key(&name) {
            self.error(node, format!("{} redeclared in this block", name));
            return;
        }
        self.scope.insert(name, symbol);
    }

    // ------------------------------------------------------------------
    // pass one: package-level declarations
    // ------------------------------------------------------------------

    fn collect(&mut self) {
        let files = self.files;
        for (index, file) in files.iter().enumerate() {
            self.file = index;
            for child in named_children(file.root()) {
                match child.kind() {
                    "package_clause" => {
                        if self.doc.is_none() {
                            self.doc = self.doc_comment(child);
                        }
                        if self.clause.is_none() {
                            if let Some(ident) = named_children(child).first() {
                                self.clause = self.location(index, *ident);
                            }
                        }
                    }
                    "type_declaration" => {
                        for spec in specs(child, &["type_spec", "type_alias"]) {
                            if let Some(name) = spec.child_by_field_name("name") {
                                let name = self.text(name).to_string();
                                self.type_names.insert(name);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        self.self_symbol = Some(Arc::new(Symbol {
            id: SymbolId {
                package: self.path.to_string(),
                name: self.name.to_string(),
                file: None,
                offset: 0,
            },
            package_name: self.name.to_string(),
            kind: SymbolKind::Package {
                path: self.path.to_string(),
            },
            doc: self.doc.clone(),
            location: self.clause.clone(),
        }));

        // Imports first: every declaration below may reference them.
        for (index, file) in files.iter().enumerate() {
            self.file = index;
            for child in named_children(file.root()) {
                if child.kind() == "import_declaration" {
                    for spec in specs(child, &["import_spec"]) {
                        self.collect_import(spec);
                    }
                }
            }
        }

        for (index, file) in files.iter().enumerate() {
            self.file = index;
            for child in named_children(file.root()) {
                match child.kind() {
                    "package_clause" => {
                        let ident = named_children(child).into_iter().next();
                        if let (Some(ident), Some(symbol)) = (ident, self.self_symbol.clone()) {
                            self.record(ident, symbol);
                        }
                    }
                    "function_declaration" => self.collect_func(child),
                    "method_declaration" => self.collect_method(child),
                    "type_declaration" => {
                        for spec in specs(child, &["type_spec", "type_alias"]) {
                            self.collect_type(child, spec);
                        }
                    }
                    "var_declaration" => self.collect_values(child, SpecKind::Var),
                    "const_declaration" => self.collect_values(child, SpecKind::Const { iota: 0 }),
                    _ => {}
                }
            }
        }
    }

    fn collect_import(&mut self, spec: Node<'a>) {
        let Some(path_node) = spec.child_by_field_name("path") else {
            return;
        };
        let import_path = unquote(self.text(path_node));
        let alias = spec.child_by_field_name("name");

        let Some(dep) = self.imports.resolved.get(&import_path).cloned() else {
            let message = match self.imports.failed.get(&import_path) {
                Some(reason) => format!("could not import {} ({})", import_path, reason),
                None => format!("could not import {}", import_path),
            };
            self.error(path_node, message);

            // Unresolved imports still bind their name so uses degrade quietly.
            let local = match alias {
                Some(node) => self.text(node).to_string(),
                None => import_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&import_path)
                    .to_string(),
            };
            if local != "_" && local != "." {
                let placeholder = PackageTypes {
                    path: import_path.clone(),
                    name: local.clone(),
                    scope: IndexMap::new(),
                    methods: HashMap::new(),
                    doc: None,
                    clause: None,
                };
                let symbol = self.package_symbol(&placeholder);
                self.file_scopes[self.file].insert(local, symbol);
            }
            return;
        };

        match alias {
            Some(node) if node.kind() == "dot" => self.dot_imports[self.file].push(dep),
            Some(node) if node.kind() == "blank_identifier" => {}
            Some(node) => {
                let local = self.text(node).to_string();
                let symbol = self.package_symbol(&dep);
                self.record(node, Arc::clone(&symbol));
                self.file_scopes[self.file].insert(local, symbol);
            }
            None => {
                let symbol = self.package_symbol(&dep);
                self.file_scopes[self.file].insert(dep.name.clone(), symbol);
            }
        }
    }

    fn collect_func(&mut self, node: Node<'a>) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let signature = self.signature(
            node.child_by_field_name("parameters"),
            node.child_by_field_name("result"),
        );
        let doc = self.doc_comment(node);
        let symbol = self.make_symbol(
            name,
            SymbolKind::Func {
                receiver: None,
                signature,
            },
            doc,
        );
        self.record(name, Arc::clone(&symbol));
        if self.text(name) != "init" {
            self.declare(name, symbol);
        }
    }

    fn collect_method(&mut self, node: Node<'a>) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|list| named_children(list).into_iter().next());
        let Some(receiver) = receiver else {
            return;
        };
        let Some(receiver_type) = receiver.child_by_field_name("type") else {
            return;
        };
        let receiver_name = receiver
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string());
        let base = self.base_type_name(receiver_type);
        let receiver = Param {
            name: receiver_name,
            ty: self.type_from(receiver_type),
        };

        let signature = self.signature(
            node.child_by_field_name("parameters"),
            node.child_by_field_name("result"),
        );
        let doc = self.doc_comment(node);
        let symbol = self.make_symbol(
            name,
            SymbolKind::Func {
                receiver: Some(receiver),
                signature,
            },
            doc,
        );
        self.record(name, Arc::clone(&symbol));
        if let Some(base) = base {
            self.methods.entry(base).or_default().push(symbol);
        }
    }

    fn base_type_name(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "type_identifier" => Some(self.text(node).to_string()),
            "pointer_type" | "parenthesized_type" => named_children(node)
                .into_iter()
                .next()
                .and_then(|inner| self.base_type_name(inner)),
            "generic_type" => node
                .child_by_field_name("type")
                .and_then(|inner| self.base_type_name(inner)),
            _ => None,
        }
    }

    fn collect_type(&mut self, decl: Node<'a>, spec: Node<'a>) {
        let (Some(name), Some(type_node)) = (
            spec.child_by_field_name("name"),
            spec.child_by_field_name("type"),
        ) else {
            return;
        };
        let alias = spec.kind() == "type_alias";
        let named = NamedType {
            package: self.path.to_string(),
            package_name: self.name.to_string(),
            name: self.text(name).to_string(),
        };

        self.owner = (!alias).then(|| named.clone());
        let underlying = self.type_from(type_node);
        self.owner = None;

        let named = if alias {
            underlying.clone()
        } else {
            Type::Named(named)
        };
        let doc = self
            .doc_comment(spec)
            .or_else(|| self.doc_comment(decl));
        let symbol = self.make_symbol(
            name,
            SymbolKind::TypeName {
                named,
                underlying,
                alias,
            },
            doc,
        );
        self.record(name, Arc::clone(&symbol));
        self.declare(name, symbol);
    }

    fn collect_values(&mut self, decl: Node<'a>, kind: SpecKind) {
        let decl_doc = self.doc_comment(decl);
        let spec_kind = match kind {
            SpecKind::Var => "var_spec",
            SpecKind::Const { .. } => "const_spec",
        };

        let mut last: (Option<Node<'a>>, Vec<Node<'a>>) = (None, Vec::new());
        for (iota, spec) in specs(decl, &[spec_kind]).into_iter().enumerate() {
            let (type_node, values) = self.spec_parts(spec, kind, &mut last);
            let doc = self.doc_comment(spec).or_else(|| decl_doc.clone());
            let kind = match kind {
                SpecKind::Var => SpecKind::Var,
                SpecKind::Const { .. } => SpecKind::Const { iota },
            };

            for (index, name) in field_nodes(spec, "name").into_iter().enumerate() {
                let text = self.text(name);
                if text == "_" {
                    continue;
                }
                if self.scope.contains_key(text) || self.pending.contains_key(text) {
                    self.error(name, format!("{} redeclared in this block", text));
                    continue;
                }
                self.pending.insert(
                    text.to_string(),
                    Pending {
                        file: self.file,
                        kind,
                        name,
                        index,
                        type_node,
                        values: values.clone(),
                        doc: doc.clone(),
                    },
                );
            }
        }
    }

    /// Type and value nodes of a spec, applying implicit repetition of the
    /// previous spec inside const groups.
    fn spec_parts(
        &self,
        spec: Node<'a>,
        kind: SpecKind,
        last: &mut (Option<Node<'a>>, Vec<Node<'a>>),
    ) -> (Option<Node<'a>>, Vec<Node<'a>>) {
        let type_node = spec.child_by_field_name("type");
        let values: Vec<Node<'a>> = spec
            .child_by_field_name("value")
            .map(named_children)
            .unwrap_or_default();

        match kind {
            SpecKind::Const { .. } if type_node.is_none() && values.is_empty() => {
                (last.0, last.1.clone())
            }
            SpecKind::Const { .. } => {
                *last = (type_node, values.clone());
                (type_node, values)
            }
            SpecKind::Var => (type_node, values),
        }
    }

    fn resolve_pending(&mut self) {
        let names: Vec<String> = self.pending.keys().cloned().collect();
        for name in names {
            self.resolve_package_name(&name);
        }
    }

    /// Package-level symbol by name, resolving a pending declaration on
    /// first use. A declaration being resolved is no longer pending, so
    /// initialization cycles end in an invalid type instead of recursing.
    fn resolve_package_name(&mut self, name: &str) -> Option<Arc<Symbol>> {
        if let Some(symbol) = self.scope.get(name) {
            return Some(Arc::clone(symbol));
        }
        let pending = self.pending.swap_remove(name)?;

        let saved_file = std::mem::replace(&mut self.file, pending.file);
        let saved_locals = std::mem::take(&mut self.locals);
        let kind = self.value_kind(
            pending.kind,
            pending.type_node,
            &pending.values,
            pending.index,
        );
        let symbol = self.make_symbol(pending.name, kind, pending.doc);
        self.record(pending.name, Arc::clone(&symbol));
        self.locals = saved_locals;
        self.file = saved_file;

        self.scope.insert(name.to_string(), Arc::clone(&symbol));
        Some(symbol)
    }

    fn value_kind(
        &mut self,
        kind: SpecKind,
        type_node: Option<Node<'a>>,
        values: &[Node<'a>],
        index: usize,
    ) -> SymbolKind {
        let ty = match type_node {
            Some(node) => self.type_from(node),
            None => self.assigned_types(values, index + 1).swap_remove(index),
        };
        match kind {
            SpecKind::Var => SymbolKind::Var { ty },
            SpecKind::Const { iota } => {
                let value = values.get(index).and_then(|value| match value.kind() {
                    "iota" => Some(iota.to_string()),
                    kind if is_basic_literal(kind) => Some(self.text(*value).to_string()),
                    _ => None,
                });
                SymbolKind::Const { ty, value }
            }
        }
    }

    // ------------------------------------------------------------------
    // type expressions
    // ------------------------------------------------------------------

    fn signature(&mut self, params: Option<Node<'a>>, result: Option<Node<'a>>) -> Signature {
        let (params, variadic) = params
            .map(|list| self.param_list(list))
            .unwrap_or_default();
        let results = match result {
            Some(list) if list.kind() == "parameter_list" => self.param_list(list).0,
            Some(node) => vec![Param {
                name: None,
                ty: self.type_from(node),
            }],
            None => Vec::new(),
        };
        Signature {
            params,
            results,
            variadic,
        }
    }

    fn param_list(&mut self, list: Node<'a>) -> (Vec<Param>, bool) {
        let mut params = Vec::new();
        let mut variadic = false;
        for decl in named_children(list) {
            let Some(type_node) = decl.child_by_field_name("type") else {
                continue;
            };
            let ty = match decl.kind() {
                "parameter_declaration" => self.type_from(type_node),
                "variadic_parameter_declaration" => {
                    variadic = true;
                    Type::Slice(Box::new(self.type_from(type_node)))
                }
                _ => continue,
            };
            let names = field_nodes(decl, "name");
            if names.is_empty() {
                params.push(Param { name: None, ty });
            } else {
                for name in names {
                    params.push(Param {
                        name: Some(self.text(name).to_string()),
                        ty: ty.clone(),
                    });
                }
            }
        }
        (params, variadic)
    }

    fn type_from(&mut self, node: Node<'a>) -> Type {
        self.nested(node, Type::Invalid, Self::type_node)
    }

    fn type_node(&mut self, node: Node<'a>) -> Type {
        let owner = self.owner.take();
        let child = |field: &str| node.child_by_field_name(field);

        match node.kind() {
            "type_identifier" => self.resolve_type_name(self.text(node)),
            "qualified_type" => {
                let (Some(package), Some(name)) = (child("package"), child("name")) else {
                    return Type::Invalid;
                };
                match self.lookup(self.text(package)).map(|symbol| symbol.kind.clone()) {
                    Some(SymbolKind::Package { path }) => {
                        let package_name = self
                            .imports
                            .resolved
                            .get(&path)
                            .map(|dep| dep.name.clone())
                            .unwrap_or_else(|| self.text(package).to_string());
                        Type::Named(NamedType {
                            package: path,
                            package_name,
                            name: self.text(name).to_string(),
                        })
                    }
                    _ => Type::Raw(self.text(node).to_string()),
                }
            }
            "pointer_type" => match named_children(node).first() {
                Some(inner) => Type::Pointer(Box::new(self.type_from(*inner))),
                None => Type::Invalid,
            },
            "parenthesized_type" => match named_children(node).first() {
                Some(inner) => self.type_from(*inner),
                None => Type::Invalid,
            },
            "slice_type" => match child("element") {
                Some(elem) => Type::Slice(Box::new(self.type_from(elem))),
                None => Type::Invalid,
            },
            "array_type" | "implicit_length_array_type" => {
                let len = child("length")
                    .map(|len| self.text(len).to_string())
                    .unwrap_or_else(|| "...".to_string());
                match child("element") {
                    Some(elem) => Type::Array(len, Box::new(self.type_from(elem))),
                    None => Type::Invalid,
                }
            }
            "map_type" => match (child("key"), child("value")) {
                (Some(key), Some(value)) => Type::Map(
                    Box::new(self.type_from(key)),
                    Box::new(self.type_from(value)),
                ),
                _ => Type::Invalid,
            },
            "channel_type" => {
                let text = self.text(node);
                let dir = if text.starts_with("<-") {
                    ChanDir::Recv
                } else if text["chan".len().min(text.len())..]
                    .trim_start()
                    .starts_with("<-")
                {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                match child("value") {
                    Some(value) => Type::Chan(dir, Box::new(self.type_from(value))),
                    None => Type::Invalid,
                }
            }
            "function_type" => {
                Type::Func(Box::new(self.signature(child("parameters"), child("result"))))
            }
            "struct_type" => Type::Struct(self.struct_fields(node)),
            "interface_type" => Type::Interface(self.interface_elems(node, owner)),
            _ => Type::Raw(self.text(node).split_whitespace().collect::<Vec<_>>().join(" ")),
        }
    }

    fn resolve_type_name(&mut self, name: &str) -> Type {
        for scope in self.locals.iter().rev() {
            if let Some(symbol) = scope.get(name) {
                if let SymbolKind::TypeName { named, .. } = &symbol.kind {
                    return named.clone();
                }
            }
        }
        if !self.type_names.contains(name) {
            let imported = self.dot_imports[self.file]
                .iter()
                .find_map(|dep| dep.lookup(name).cloned());
            if let Some(symbol) = imported.or_else(|| universe::lookup(name)) {
                if let SymbolKind::TypeName { named, .. } = &symbol.kind {
                    return named.clone();
                }
            }
        }
        Type::Named(NamedType {
            package: self.path.to_string(),
            package_name: self.name.to_string(),
            name: name.to_string(),
        })
    }

    fn struct_fields(&mut self, node: Node<'a>) -> Vec<Field> {
        let Some(list) = named_children(node)
            .into_iter()
            .find(|child| child.kind() == "field_declaration_list")
        else {
            return Vec::new();
        };

        let mut fields = Vec::new();
        for decl in named_children(list) {
            if decl.kind() != "field_declaration" {
                continue;
            }
            let Some(type_node) = decl.child_by_field_name("type") else {
                continue;
            };
            let doc = self.doc_comment(decl);
            let mut ty = self.type_from(type_node);
            let names = field_nodes(decl, "name");

            if names.is_empty() {
                if has_token(decl, "*") {
                    ty = Type::Pointer(Box::new(ty));
                }
                let name_node = match type_node.kind() {
                    "qualified_type" => type_node.child_by_field_name("name"),
                    "generic_type" => type_node.child_by_field_name("type"),
                    _ => Some(type_node),
                }
                .unwrap_or(type_node);
                let symbol = self.make_symbol(
                    name_node,
                    SymbolKind::Field {
                        ty: ty.clone(),
                        embedded: true,
                    },
                    doc,
                );
                fields.push(Field {
                    name: self.text(name_node).to_string(),
                    ty,
                    embedded: true,
                    symbol: Some(symbol),
                });
                continue;
            }

            for name in names {
                let symbol = self.make_symbol(
                    name,
                    SymbolKind::Field {
                        ty: ty.clone(),
                        embedded: false,
                    },
                    doc.clone(),
                );
                self.record(name, Arc::clone(&symbol));
                fields.push(Field {
                    name: self.text(name).to_string(),
                    ty: ty.clone(),
                    embedded: false,
                    symbol: Some(symbol),
                });
            }
        }
        fields
    }

    fn interface_elems(&mut self, node: Node<'a>, owner: Option<NamedType>) -> Vec<InterfaceElem> {
        let mut elems = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "method_elem" | "method_spec" => {
                    let Some(name) = child.child_by_field_name("name") else {
                        continue;
                    };
                    let signature = self.signature(
                        child.child_by_field_name("parameters"),
                        child.child_by_field_name("result"),
                    );
                    let receiver = owner.clone().map(|owner| Param {
                        name: None,
                        ty: Type::Named(owner),
                    });
                    let doc = self.doc_comment(child);
                    let symbol = self.make_symbol(
                        name,
                        SymbolKind::Func {
                            receiver,
                            signature: signature.clone(),
                        },
                        doc,
                    );
                    self.record(name, Arc::clone(&symbol));
                    elems.push(InterfaceElem::Method {
                        name: self.text(name).to_string(),
                        signature,
                        symbol: Some(symbol),
                    });
                }
                "type_elem" | "constraint_elem" => {
                    for ty in named_children(child) {
                        elems.push(InterfaceElem::Embedded(self.type_from(ty)));
                    }
                }
                kind if is_type_node(kind) => {
                    elems.push(InterfaceElem::Embedded(self.type_from(child)));
                }
                _ => {}
            }
        }
        elems
    }

    // ------------------------------------------------------------------
    // lookups
    // ------------------------------------------------------------------

    fn lookup(&mut self, name: &str) -> Option<Arc<Symbol>> {
        for scope in self.locals.iter().rev() {
            if let Some(symbol) = scope.get(name) {
                return Some(Arc::clone(symbol));
            }
        }
        if let Some(symbol) = self.file_scopes[self.file].get(name) {
            return Some(Arc::clone(symbol));
        }
        if let Some(symbol) = self.resolve_package_name(name) {
            return Some(symbol);
        }
        let imported = self.dot_imports[self.file]
            .iter()
            .find_map(|dep| dep.lookup(name).filter(|s| s.is_exported()).cloned());
        imported.or_else(|| universe::lookup(name))
    }

    fn type_symbol(&self, named: &NamedType) -> Option<Arc<Symbol>> {
        if named.package.is_empty() {
            return universe::lookup(&named.name);
        }
        if named.package == self.path {
            for scope in self.locals.iter().rev() {
                if let Some(symbol) = scope.get(&named.name) {
                    if symbol.is_type_name() {
                        return Some(Arc::clone(symbol));
                    }
                }
            }
            return self.scope.get(&named.name).cloned();
        }
        self.imports
            .resolved
            .get(&named.package)?
            .lookup(&named.name)
            .cloned()
    }

    fn underlying(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        for _ in 0..8 {
            let Type::Named(named) = &current else {
                return current;
            };
            match self.type_symbol(named).map(|symbol| symbol.kind.clone()) {
                Some(SymbolKind::TypeName { underlying, .. }) => {
                    if underlying == current {
                        return Type::Invalid;
                    }
                    current = underlying;
                }
                _ => return Type::Invalid,
            }
        }
        Type::Invalid
    }

    fn method_of(&self, named: &NamedType, name: &str) -> Option<Arc<Symbol>> {
        if named.package == self.path {
            return self
                .methods
                .get(&named.name)?
                .iter()
                .find(|method| method.name() == name)
                .cloned();
        }
        self.imports
            .resolved
            .get(&named.package)?
            .method(&named.name, name)
            .cloned()
    }

    /// Field or method `name` of a value of type `ty`, following embedded
    /// fields.
    fn member(&self, ty: &Type, name: &str) -> Option<Arc<Symbol>> {
        self.member_at(ty, name, 0)
    }

    fn member_at(&self, ty: &Type, name: &str, depth: usize) -> Option<Arc<Symbol>> {
        if depth > 4 {
            return None;
        }
        let base = ty.deref();
        if let Type::Named(named) = base {
            if let Some(method) = self.method_of(named, name) {
                return Some(method);
            }
        }
        match self.underlying(base) {
            Type::Struct(fields) => {
                if let Some(field) = fields.iter().find(|field| field.name == name) {
                    return field.symbol.clone();
                }
                fields
                    .iter()
                    .filter(|field| field.embedded)
                    .find_map(|field| self.member_at(&field.ty, name, depth + 1))
            }
            Type::Interface(elems) => elems.iter().find_map(|elem| match elem {
                InterfaceElem::Method {
                    name: method,
                    symbol,
                    ..
                } if method == name => symbol.clone(),
                InterfaceElem::Embedded(embedded) => self.member_at(embedded, name, depth + 1),
                _ => None,
            }),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // expression types
    // ------------------------------------------------------------------

    fn infer(&mut self, node: Node<'a>) -> Type {
        self.nested(node, Type::Invalid, Self::infer_node)
    }

    fn infer_node(&mut self, node: Node<'a>) -> Type {
        let child = |field: &str| node.child_by_field_name(field);

        match node.kind() {
            "identifier" => self
                .lookup(self.text(node))
                .map(|symbol| symbol.value_type())
                .unwrap_or(Type::Invalid),
            "int_literal" | "iota" => Type::basic("int"),
            "float_literal" => Type::basic("float64"),
            "imaginary_literal" => Type::basic("complex128"),
            "rune_literal" => Type::basic("rune"),
            "interpreted_string_literal" | "raw_string_literal" => Type::basic("string"),
            "true" | "false" => Type::basic("bool"),
            "parenthesized_expression" => match named_children(node).first() {
                Some(inner) => self.infer(*inner),
                None => Type::Invalid,
            },
            "call_expression" => self.infer_call(node),
            "type_conversion_expression" | "type_assertion_expression" => match child("type") {
                Some(ty) => self.type_from(ty),
                None => Type::Invalid,
            },
            "selector_expression" => {
                let (Some(operand), Some(field)) = (child("operand"), child("field")) else {
                    return Type::Invalid;
                };
                self.selected(operand, self.text(field))
                    .map(|symbol| symbol.value_type())
                    .unwrap_or(Type::Invalid)
            }
            "index_expression" => {
                let Some(operand) = child("operand") else {
                    return Type::Invalid;
                };
                let operand = self.infer(operand);
                element_type(&self.underlying(operand.deref()))
            }
            "slice_expression" => match child("operand") {
                Some(operand) => self.infer(operand),
                None => Type::Invalid,
            },
            "unary_expression" => {
                let Some(operand) = child("operand") else {
                    return Type::Invalid;
                };
                let operator = child("operator").map(|op| self.text(op)).unwrap_or("");
                let operand = self.infer(operand);
                match operator {
                    "&" => Type::Pointer(Box::new(operand)),
                    "*" => operand.deref().clone(),
                    "!" => Type::basic("bool"),
                    "<-" => match self.underlying(&operand) {
                        Type::Chan(_, elem) => *elem,
                        _ => Type::Invalid,
                    },
                    _ => operand,
                }
            }
            "binary_expression" => {
                let operator = child("operator").map(|op| self.text(op)).unwrap_or("");
                match operator {
                    "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||" => Type::basic("bool"),
                    _ => {
                        let left = child("left").map(|left| self.infer(left));
                        match left {
                            Some(ty) if !ty.is_invalid() => ty,
                            _ => child("right")
                                .map(|right| self.infer(right))
                                .unwrap_or(Type::Invalid),
                        }
                    }
                }
            }
            "composite_literal" => match child("type") {
                Some(ty) => self.type_from(ty),
                None => Type::Invalid,
            },
            "func_literal" => {
                Type::Func(Box::new(self.signature(child("parameters"), child("result"))))
            }
            kind if is_type_node(kind) => self.type_from(node),
            _ => Type::Invalid,
        }
    }

    /// Symbol selected by `operand.name`, where operand is either an
    /// imported package or a value.
    fn selected(&mut self, operand: Node<'a>, name: &str) -> Option<Arc<Symbol>> {
        if let Some(path) = self.package_operand(operand) {
            return self
                .imports
                .resolved
                .get(&path)?
                .lookup(name)
                .filter(|symbol| symbol.is_exported())
                .cloned();
        }
        let ty = self.infer(operand);
        self.member(&ty, name)
    }

    /// Import path when `operand` names an imported package.
    fn package_operand(&mut self, operand: Node<'a>) -> Option<String> {
        if operand.kind() != "identifier" {
            return None;
        }
        match self.lookup(self.text(operand))?.kind.clone() {
            SymbolKind::Package { path } => Some(path),
            _ => None,
        }
    }

    /// The type `node` denotes when used as a conversion or builtin argument.
    fn as_type(&mut self, node: Node<'a>) -> Option<Type> {
        match node.kind() {
            "identifier" => {
                let symbol = self.lookup(self.text(node))?;
                symbol.is_type_name().then(|| symbol.value_type())
            }
            "selector_expression" => {
                let operand = node.child_by_field_name("operand")?;
                let field = node.child_by_field_name("field")?;
                self.package_operand(operand)?;
                let symbol = self.selected(operand, self.text(field))?;
                symbol.is_type_name().then(|| symbol.value_type())
            }
            "parenthesized_expression" => {
                let inner = named_children(node).into_iter().next()?;
                self.as_type(inner)
            }
            kind if is_type_node(kind) => Some(self.type_from(node)),
            _ => None,
        }
    }

    fn infer_call(&mut self, node: Node<'a>) -> Type {
        let Some(function) = node.child_by_field_name("function") else {
            return Type::Invalid;
        };
        let args = node
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default();

        if function.kind() == "identifier" && universe::is_builtin_func(self.text(function)) {
            let name = self.text(function);
            let symbol = self.lookup(name);
            if symbol.is_some_and(|symbol| symbol.kind == SymbolKind::Builtin) {
                return self.builtin_result(name, &args);
            }
        }
        if let Some(ty) = self.as_type(function) {
            return ty;
        }
        match self.infer(function) {
            Type::Func(signature) => signature.result_type(),
            _ => Type::Invalid,
        }
    }

    fn builtin_result(&mut self, name: &str, args: &[Node<'a>]) -> Type {
        let first = args.first().copied();
        match name {
            "len" | "cap" | "copy" => Type::basic("int"),
            "complex" => Type::basic("complex128"),
            "real" | "imag" => Type::basic("float64"),
            "recover" => Type::basic("any"),
            "new" => first
                .and_then(|arg| self.as_type(arg))
                .map(|ty| Type::Pointer(Box::new(ty)))
                .unwrap_or(Type::Invalid),
            "make" => first
                .and_then(|arg| self.as_type(arg))
                .unwrap_or(Type::Invalid),
            "append" | "min" | "max" => first
                .map(|arg| self.infer(arg))
                .unwrap_or(Type::Invalid),
            _ => Type::Tuple(Vec::new()),
        }
    }

    /// Types assigned to `count` left-hand names from `values`.
    fn assigned_types(&mut self, values: &[Node<'a>], count: usize) -> Vec<Type> {
        let mut types = if values.len() == 1 {
            let value = values[0];
            match self.infer(value) {
                Type::Tuple(types) if !types.is_empty() => types,
                ty if count == 2 && comma_ok(value, self.text(value)) => {
                    vec![ty, Type::basic("bool")]
                }
                ty => vec![ty],
            }
        } else {
            values.iter().map(|value| self.infer(*value)).collect()
        };
        types.resize(count, Type::Invalid);
        types
    }

    // ------------------------------------------------------------------
    // pass two: references
    // ------------------------------------------------------------------

    fn resolve_bodies(&mut self) {
        let files = self.files;
        for (index, file) in files.iter().enumerate() {
            self.file = index;
            self.locals.clear();
            for child in named_children(file.root()) {
                match child.kind() {
                    "function_declaration" | "method_declaration" => self.walk_function(child),
                    "type_declaration" => {
                        for spec in specs(child, &["type_spec", "type_alias"]) {
                            self.scoped(|this| {
                                this.define_type_params(spec);
                                if let Some(ty) = spec.child_by_field_name("type") {
                                    this.walk(ty);
                                }
                            });
                        }
                    }
                    "var_declaration" | "const_declaration" => {
                        for spec in specs(child, &["var_spec", "const_spec"]) {
                            if let Some(ty) = spec.child_by_field_name("type") {
                                self.walk(ty);
                            }
                            if let Some(values) = spec.child_by_field_name("value") {
                                self.walk(values);
                            }
                        }
                    }
                    "package_clause" | "import_declaration" => {}
                    _ => self.walk(child),
                }
            }
        }
    }

    fn walk_function(&mut self, node: Node<'a>) {
        self.scoped(|this| {
            this.define_type_params(node);
            if let Some(receiver) = node.child_by_field_name("receiver") {
                this.define_params(receiver);
            }
            if let Some(params) = node.child_by_field_name("parameters") {
                this.define_params(params);
            }
            match node.child_by_field_name("result") {
                Some(result) if result.kind() == "parameter_list" => this.define_params(result),
                Some(result) => this.walk(result),
                None => {}
            }
            if let Some(body) = node.child_by_field_name("body") {
                this.walk(body);
            }
        });
    }

    fn define_type_params(&mut self, node: Node<'a>) {
        let Some(list) = node.child_by_field_name("type_parameters") else {
            return;
        };
        for decl in named_children(list) {
            if let Some(constraint) = decl.child_by_field_name("type") {
                self.walk(constraint);
            }
            for name in field_nodes(decl, "name") {
                let text = self.text(name).to_string();
                self.define_local(
                    name,
                    SymbolKind::TypeName {
                        named: Type::Raw(text),
                        underlying: Type::Interface(Vec::new()),
                        alias: false,
                    },
                );
            }
        }
    }

    fn define_params(&mut self, list: Node<'a>) {
        for decl in named_children(list) {
            let Some(type_node) = decl.child_by_field_name("type") else {
                continue;
            };
            self.walk(type_node);
            let mut ty = self.type_from(type_node);
            if decl.kind() == "variadic_parameter_declaration" {
                ty = Type::Slice(Box::new(ty));
            }
            for name in field_nodes(decl, "name") {
                self.define_local(name, SymbolKind::Var { ty: ty.clone() });
            }
        }
    }

    fn walk_children(&mut self, node: Node<'a>) {
        for child in named_children(node) {
            self.walk(child);
        }
    }

    fn walk(&mut self, node: Node<'a>) {
        self.nested(node, (), Self::walk_node)
    }

    /// Runs `step` one level deeper, or reports the nesting once and
    /// returns `fallback` when the limit is reached.
    fn nested<T>(
        &mut self,
        node: Node<'a>,
        fallback: T,
        step: impl FnOnce(&mut Self, Node<'a>) -> T,
    ) -> T {
        if self.depth >= MAX_NESTING {
            if !self.too_deep && self.suppress == 0 {
                self.too_deep = true;
                self.error(node, "expression nested too deeply".to_string());
            }
            return fallback;
        }
        self.depth += 1;
        let out = step(self, node);
        self.depth -= 1;
        out
    }

    fn walk_node(&mut self, node: Node<'a>) {
        match node.kind() {
            "identifier" | "type_identifier" => self.use_ident(node),
            "qualified_type" => self.use_qualified(node),
            "selector_expression" => self.walk_selector(node),
            "block" | "if_statement" | "for_statement" | "expression_switch_statement"
            | "select_statement" | "expression_case" | "default_case" | "communication_case" => {
                self.scoped(|this| this.walk_children(node))
            }
            "type_switch_statement" => self.walk_type_switch(node),
            "short_var_declaration" => self.walk_short_var(node),
            "range_clause" => self.walk_range(node),
            "receive_statement" if has_token(node, ":=") => self.walk_receive(node),
            "var_declaration" | "const_declaration" => self.walk_local_values(node),
            "type_declaration" => self.walk_local_types(node),
            "func_literal" => self.walk_function(node),
            "parameter_list" => {
                for decl in named_children(node) {
                    if let Some(ty) = decl.child_by_field_name("type") {
                        self.walk(ty);
                    }
                }
            }
            "composite_literal" => self.walk_composite(node, None),
            "true" | "false" | "iota" => {
                if let Some(symbol) = universe::lookup(node.kind()) {
                    self.record(node, symbol);
                }
            }
            "field_identifier" | "package_identifier" | "label_name" => {}
            "ERROR" => {
                self.suppress += 1;
                self.walk_children(node);
                self.suppress -= 1;
            }
            _ => self.walk_children(node),
        }
    }

    fn use_ident(&mut self, node: Node<'a>) {
        let name = self.text(node);
        if name == "_" || self.idents[self.file].contains(node.start_byte()) {
            return;
        }
        match self.lookup(name) {
            Some(symbol) => self.record(node, symbol),
            None => self.error(node, format!("undefined: {}", name)),
        }
    }

    fn use_qualified(&mut self, node: Node<'a>) {
        let (Some(package), Some(name)) = (
            node.child_by_field_name("package"),
            node.child_by_field_name("name"),
        ) else {
            return;
        };
        self.use_package_member(package, name);
    }

    /// Binds `package.name` where `package` names an import.
    fn use_package_member(&mut self, package: Node<'a>, name: Node<'a>) -> bool {
        let Some(symbol) = self.lookup(self.text(package)) else {
            self.error(package, format!("undefined: {}", self.text(package)));
            return true;
        };
        let SymbolKind::Package { path } = symbol.kind.clone() else {
            return false;
        };
        self.record(package, symbol);

        let Some(dep) = self.imports.resolved.get(&path).cloned() else {
            return true;
        };
        match dep.lookup(self.text(name)).filter(|member| member.is_exported()) {
            Some(member) => self.record(name, Arc::clone(member)),
            None => self.error(
                name,
                format!("undefined: {}.{}", self.text(package), self.text(name)),
            ),
        }
        true
    }

    fn walk_selector(&mut self, node: Node<'a>) {
        let (Some(operand), Some(field)) = (
            node.child_by_field_name("operand"),
            node.child_by_field_name("field"),
        ) else {
            self.walk_children(node);
            return;
        };
        if operand.kind() == "identifier" && self.use_package_member(operand, field) {
            return;
        }
        self.walk(operand);
        let ty = self.infer(operand);
        if let Some(member) = self.member(&ty, self.text(field)) {
            self.record(field, member);
        }
    }

    fn walk_short_var(&mut self, node: Node<'a>) {
        let right = node
            .child_by_field_name("right")
            .map(named_children)
            .unwrap_or_default();
        for value in &right {
            self.walk(*value);
        }
        let left = node
            .child_by_field_name("left")
            .map(named_children)
            .unwrap_or_default();
        let types = self.assigned_types(&right, left.len());
        self.define_or_reuse(&left, types);
    }

    fn define_or_reuse(&mut self, names: &[Node<'a>], types: Vec<Type>) {
        for (name, ty) in names.iter().zip(types) {
            if name.kind() != "identifier" {
                self.walk(*name);
                continue;
            }
            let existing = self
                .locals
                .last()
                .and_then(|scope| scope.get(self.text(*name)))
                .cloned();
            match existing {
                Some(symbol) => self.record(*name, symbol),
                None => {
                    self.define_local(*name, SymbolKind::Var { ty });
                }
            }
        }
    }

    fn walk_range(&mut self, node: Node<'a>) {
        let Some(right) = node.child_by_field_name("right") else {
            return;
        };
        self.walk(right);
        let ranged = self.infer(right);
        let (key, value) = match self.underlying(ranged.deref()) {
            Type::Slice(elem) | Type::Array(_, elem) => (Type::basic("int"), *elem),
            Type::Map(key, value) => (*key, *value),
            Type::Basic(name) if name == "string" => (Type::basic("int"), Type::basic("rune")),
            Type::Basic(name) => (Type::Basic(name), Type::Invalid),
            Type::Chan(_, elem) => (*elem, Type::Invalid),
            _ => (Type::Invalid, Type::Invalid),
        };

        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        if has_token(node, ":=") {
            let names = named_children(left);
            self.define_or_reuse(&names, vec![key, value]);
        } else {
            self.walk(left);
        }
    }

    fn walk_receive(&mut self, node: Node<'a>) {
        let Some(right) = node.child_by_field_name("right") else {
            return;
        };
        self.walk(right);
        let received = self.infer(right);
        let names = node
            .child_by_field_name("left")
            .map(named_children)
            .unwrap_or_default();
        self.define_or_reuse(&names, vec![received, Type::basic("bool")]);
    }

    fn walk_type_switch(&mut self, node: Node<'a>) {
        self.scoped(|this| {
            if let Some(init) = node.child_by_field_name("initializer") {
                this.walk(init);
            }
            let Some(value) = node.child_by_field_name("value") else {
                return;
            };
            this.walk(value);
            let value_ty = this.infer(value);
            let alias = node
                .child_by_field_name("alias")
                .and_then(|list| named_children(list).into_iter().next());

            let mut alias_recorded = false;
            for case in named_children(node) {
                if case.kind() != "type_case" && case.kind() != "default_case" {
                    continue;
                }
                this.scoped(|this| {
                    let case_types = field_nodes(case, "type");
                    for ty in &case_types {
                        this.walk(*ty);
                    }
                    if let Some(alias) = alias {
                        let ty = match case_types.as_slice() {
                            [single] if single.kind() != "nil" => this.type_from(*single),
                            _ => value_ty.clone(),
                        };
                        let symbol = this.make_symbol(alias, SymbolKind::Var { ty }, None);
                        if !alias_recorded {
                            this.record(alias, Arc::clone(&symbol));
                            alias_recorded = true;
                        }
                        if let Some(scope) = this.locals.last_mut() {
                            scope.insert(symbol.name().to_string(), symbol);
                        }
                    }
                    let type_starts: HashSet<usize> =
                        case_types.iter().map(|ty| ty.start_byte()).collect();
                    for child in named_children(case) {
                        if !type_starts.contains(&child.start_byte()) {
                            this.walk(child);
                        }
                    }
                });
            }

            if let (Some(alias), false) = (alias, alias_recorded) {
                let symbol = this.make_symbol(alias, SymbolKind::Var { ty: value_ty }, None);
                this.record(alias, symbol);
            }
        });
    }

    fn walk_local_values(&mut self, decl: Node<'a>) {
        let is_const = decl.kind() == "const_declaration";
        let spec_kind = if is_const { "const_spec" } else { "var_spec" };
        let mut last = (None, Vec::new());

        for (iota, spec) in specs(decl, &[spec_kind]).into_iter().enumerate() {
            let kind = if is_const {
                SpecKind::Const { iota }
            } else {
                SpecKind::Var
            };
            let (type_node, values) = self.spec_parts(spec, kind, &mut last);
            if let Some(ty) = spec.child_by_field_name("type") {
                self.walk(ty);
            }
            if let Some(list) = spec.child_by_field_name("value") {
                self.walk(list);
            }
            for (index, name) in field_nodes(spec, "name").into_iter().enumerate() {
                let symbol_kind = self.value_kind(kind, type_node, &values, index);
                self.define_local(name, symbol_kind);
            }
        }
    }

    fn walk_local_types(&mut self, decl: Node<'a>) {
        for spec in specs(decl, &["type_spec", "type_alias"]) {
            let (Some(name), Some(type_node)) = (
                spec.child_by_field_name("name"),
                spec.child_by_field_name("type"),
            ) else {
                continue;
            };
            let alias = spec.kind() == "type_alias";
            let named = NamedType {
                package: self.path.to_string(),
                package_name: self.name.to_string(),
                name: self.text(name).to_string(),
            };
            // Declared before its type is converted so the type may refer to itself.
            self.define_local(
                name,
                SymbolKind::TypeName {
                    named: Type::Named(named.clone()),
                    underlying: Type::Invalid,
                    alias,
                },
            );
            self.owner = (!alias).then(|| named.clone());
            let underlying = self.type_from(type_node);
            self.owner = None;
            let named = if alias {
                underlying.clone()
            } else {
                Type::Named(named)
            };
            self.define_local(
                name,
                SymbolKind::TypeName {
                    named,
                    underlying,
                    alias,
                },
            );
            self.walk(type_node);
        }
    }

    fn walk_composite(&mut self, node: Node<'a>, elided: Option<Type>) {
        let ty = match node.child_by_field_name("type") {
            Some(type_node) => {
                self.walk(type_node);
                self.type_from(type_node)
            }
            None => elided.unwrap_or(Type::Invalid),
        };
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_literal_value(body, &ty);
        }
    }

    fn walk_literal_value(&mut self, body: Node<'a>, ty: &Type) {
        let literal_ty = ty.deref().clone();
        let underlying = self.underlying(&literal_ty);
        let (key_ty, elem_ty) = match &underlying {
            Type::Slice(elem) | Type::Array(_, elem) => (None, Some((**elem).clone())),
            Type::Map(key, value) => (Some((**key).clone()), Some((**value).clone())),
            _ => (None, None),
        };
        let is_struct = matches!(underlying, Type::Struct(_));

        for element in named_children(body) {
            if element.kind() != "keyed_element" {
                self.walk_element(element, elem_ty.clone());
                continue;
            }
            let parts = named_children(element);
            let (Some(key), value) = (parts.first().copied(), parts.get(1).copied()) else {
                continue;
            };
            let key = unwrap_literal_element(key);
            if is_struct && matches!(key.kind(), "identifier" | "field_identifier") {
                if let Some(field) = self.member(&literal_ty, self.text(key)) {
                    self.record(key, field);
                }
            } else {
                self.walk_element(key, key_ty.clone());
            }
            if let Some(value) = value {
                self.walk_element(value, elem_ty.clone());
            }
        }
    }

    fn walk_element(&mut self, node: Node<'a>, ty: Option<Type>) {
        let node = unwrap_literal_element(node);
        match node.kind() {
            "literal_value" => self.walk_literal_value(node, &ty.unwrap_or(Type::Invalid)),
            "composite_literal" if node.child_by_field_name("type").is_none() => {
                self.walk_composite(node, ty)
            }
            _ => self.walk(node),
        }
    }
}

fn unwrap_literal_element(node: Node<'_>) -> Node<'_> {
    if node.kind() == "literal_element" {
        named_children(node).into_iter().next().unwrap_or(node)
    } else {
        node
    }
}

/// Element type of an indexable type.
fn element_type(ty: &Type) -> Type {
    match ty {
        Type::Slice(elem) | Type::Array(_, elem) => (**elem).clone(),
        Type::Pointer(inner) => match inner.as_ref() {
            Type::Array(_, elem) => (**elem).clone(),
            _ => Type::Invalid,
        },
        Type::Map(_, value) => (**value).clone(),
        Type::Basic(name) if name == "string" => Type::basic("byte"),
        _ => Type::Invalid,
    }
}

/// `v, ok := m[k]`, `v, ok := x.(T)` and `v, ok := <-ch` forms.
fn comma_ok(value: Node<'_>, text: &str) -> bool {
    match value.kind() {
        "index_expression" | "type_assertion_expression" => true,
        "unary_expression" => text.starts_with("<-"),
        _ => false,
    }
}
