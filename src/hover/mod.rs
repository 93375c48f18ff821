//! Symbol resolution and formatting
//! - format.rs: rendering rules per symbol kind

pub mod format;

use std::path::Path;

use crate::loader::PackageSnapshot;
use crate::syntax::Range;
use crate::types::{Location, SymbolKind};

/// One piece of hover content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoverFragment {
    /// Go source, e.g. a signature or type layout.
    Code(String),
    /// Rendered documentation.
    Text(String),
}

impl HoverFragment {
    pub fn value(&self) -> &str {
        match self {
            HoverFragment::Code(value) | HoverFragment::Text(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverResult {
    pub fragments: Vec<HoverFragment>,
    /// Range of the hovered identifier.
    pub range: Range,
}

impl HoverResult {
    /// Fragments joined by `"; "` for single-string consumers.
    pub fn flatten(&self) -> String {
        self.fragments
            .iter()
            .map(HoverFragment::value)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Describes the symbol bound to the identifier at `offset` in `path`.
/// `None` when no identifier is there.
pub fn hover(snapshot: &PackageSnapshot, path: &Path, offset: usize) -> Option<HoverResult> {
    let file = snapshot.file(path)?;
    let (start, ident) = snapshot.ident_at(path, offset)?;
    let range = file.lines.range(start, ident.end).ok()?;

    let symbol = &ident.symbol;
    let fragments = match &symbol.kind {
        // The package clause names the package being hovered, not an import.
        SymbolKind::Package { path } if *path == snapshot.types.path => {
            vec![HoverFragment::Code(format!("package {}", symbol.name()))]
        }
        _ => format::describe(symbol),
    };
    Some(HoverResult { fragments, range })
}

/// Declaring location of the symbol bound at `offset` in `path`.
pub fn definition(snapshot: &PackageSnapshot, path: &Path, offset: usize) -> Option<Location> {
    let (_, ident) = snapshot.ident_at(path, offset)?;
    ident.symbol.location.clone()
}
