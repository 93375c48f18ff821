//! Type layer
//! - ty.rs: type representation and rendering
//! - symbol.rs: bound symbols (the tagged kinds the formatter switches on)
//! - checker.rs: two-pass declaration collection and reference resolution
//! - universe.rs: predeclared identifiers

pub mod checker;
pub mod symbol;
pub mod ty;
mod universe;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::syntax::Range;
pub use checker::check;
pub use symbol::{Location, Symbol, SymbolId, SymbolKind};
pub use ty::{Field, InterfaceElem, NamedType, Param, Signature, Type};

/// Package-level declarations of a checked package, as importers see them.
#[derive(Debug, Clone)]
pub struct PackageTypes {
    pub path: String,
    pub name: String,
    pub scope: IndexMap<String, Arc<Symbol>>,
    /// Methods keyed by receiver base type name.
    pub methods: HashMap<String, Vec<Arc<Symbol>>>,
    pub doc: Option<String>,
    /// Location of the first file's package clause.
    pub clause: Option<Location>,
}

impl PackageTypes {
    pub fn lookup(&self, name: &str) -> Option<&Arc<Symbol>> {
        self.scope.get(name)
    }

    pub fn method(&self, type_name: &str, name: &str) -> Option<&Arc<Symbol>> {
        self.methods
            .get(type_name)?
            .iter()
            .find(|method| method.name() == name)
    }
}

/// Imported packages handed to the checker.
#[derive(Debug, Default)]
pub struct Imports {
    pub resolved: HashMap<String, Arc<PackageTypes>>,
    /// Import paths that could not be loaded, with the reason.
    pub failed: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub range: Range,
    pub severity: Severity,
    pub message: String,
}

/// An identifier occurrence bound to a symbol.
#[derive(Debug, Clone)]
pub struct IdentRef {
    pub end: usize,
    pub symbol: Arc<Symbol>,
}

/// Identifier bindings of one file, keyed by start byte.
#[derive(Debug, Clone, Default)]
pub struct FileIdents {
    idents: BTreeMap<usize, IdentRef>,
}

impl FileIdents {
    pub fn insert(&mut self, start: usize, ident: IdentRef) {
        self.idents.insert(start, ident);
    }

    pub fn contains(&self, start: usize) -> bool {
        self.idents.contains_key(&start)
    }

    /// The identifier covering `offset`, with its start byte.
    pub fn at(&self, offset: usize) -> Option<(usize, &IdentRef)> {
        let (start, ident) = self.idents.range(..=offset).next_back()?;
        (offset < ident.end).then_some((*start, ident))
    }

    pub fn len(&self) -> usize {
        self.idents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idents.is_empty()
    }
}

/// Everything the checker derives from one package.
#[derive(Debug)]
pub struct CheckedPackage {
    pub types: Arc<PackageTypes>,
    /// Parallel to the files passed to [`check`].
    pub idents: Vec<FileIdents>,
    pub diagnostics: Vec<Diagnostic>,
}
