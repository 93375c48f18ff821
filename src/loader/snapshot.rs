use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::build::{PackageId, PackageMembership};
use crate::syntax::ParsedFile;
use crate::types::{Diagnostic, FileIdents, IdentRef, PackageTypes};
use crate::workspace::overlay::Stamp;

/// Identity of one build: the package plus the content stamp of every
/// member file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub id: PackageId,
    pub stamps: Vec<(PathBuf, Stamp)>,
}

/// An immutable, fully checked package. Never modified after publication;
/// newer content produces a new snapshot.
#[derive(Debug)]
pub struct PackageSnapshot {
    pub key: CacheKey,
    pub membership: PackageMembership,
    /// Member files, in membership order.
    pub files: Vec<ParsedFile>,
    pub types: Arc<PackageTypes>,
    /// Parallel to `files`.
    pub idents: Vec<FileIdents>,
    pub diagnostics: Vec<Diagnostic>,
    /// Snapshots of the directly imported packages this one was checked against.
    pub deps: Vec<Arc<PackageSnapshot>>,
}

impl PackageSnapshot {
    pub fn id(&self) -> &PackageId {
        &self.key.id
    }

    pub fn file(&self, path: &Path) -> Option<&ParsedFile> {
        self.files.iter().find(|file| file.path == path)
    }

    /// The identifier covering `offset` in `path`, with its start byte.
    pub fn ident_at(&self, path: &Path, offset: usize) -> Option<(usize, &IdentRef)> {
        let index = self.files.iter().position(|file| file.path == path)?;
        self.idents.get(index)?.at(offset)
    }

    pub fn diagnostics_for<'s>(&'s self, path: &'s Path) -> impl Iterator<Item = &'s Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |diagnostic| diagnostic.path == path)
    }

    pub fn dep(&self, import_path: &str) -> Option<&Arc<PackageSnapshot>> {
        self.deps
            .iter()
            .find(|dep| dep.id().import_path == import_path)
    }
}
