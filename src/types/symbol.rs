//! Bound symbols produced by the checker.

use std::path::PathBuf;

use crate::syntax::Range;
use crate::types::ty::{NamedType, Param, Signature, Type};

/// Stable identity of a declaration: declaring package, name and position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolId {
    /// Import path of the declaring package; empty for predeclared symbols.
    pub package: String,
    pub name: String,
    pub file: Option<PathBuf>,
    pub offset: usize,
}

/// Declaring file and range of a symbol's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Func {
        receiver: Option<Param>,
        signature: Signature,
    },
    Var {
        ty: Type,
    },
    Const {
        ty: Type,
        /// Literal value, when the initializer is a basic literal.
        value: Option<String>,
    },
    TypeName {
        /// The type this name denotes.
        named: Type,
        underlying: Type,
        alias: bool,
    },
    Field {
        ty: Type,
        embedded: bool,
    },
    Package {
        path: String,
    },
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub id: SymbolId,
    /// Name of the declaring package.
    pub package_name: String,
    pub kind: SymbolKind,
    /// Doc comment text with comment markers stripped, lines joined by `\n`.
    pub doc: Option<String>,
    pub location: Option<Location>,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn package(&self) -> &str {
        &self.id.package
    }

    pub fn is_exported(&self) -> bool {
        self.name().starts_with(|c: char| c.is_uppercase())
    }

    /// Type of the value this symbol denotes when used in an expression.
    pub fn value_type(&self) -> Type {
        match &self.kind {
            SymbolKind::Func { signature, .. } => Type::Func(Box::new(signature.clone())),
            SymbolKind::Var { ty } | SymbolKind::Const { ty, .. } | SymbolKind::Field { ty, .. } => {
                ty.clone()
            }
            SymbolKind::TypeName { named, .. } => named.clone(),
            SymbolKind::Package { .. } | SymbolKind::Builtin => Type::Invalid,
        }
    }

    pub fn is_type_name(&self) -> bool {
        matches!(self.kind, SymbolKind::TypeName { .. })
    }

    /// The named type a `TypeName` symbol declares.
    pub fn named_type(&self) -> NamedType {
        NamedType {
            package: self.id.package.clone(),
            package_name: self.package_name.clone(),
            name: self.id.name.clone(),
        }
    }
}
