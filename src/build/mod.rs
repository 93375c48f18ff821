//! Build context layer
//! - context.rs: import path <-> directory mapping and package membership
//! - error.rs: resolution failures

pub mod context;
pub mod error;

use std::fmt;
use std::path::PathBuf;

pub use context::BuildContext;
pub use error::ResolutionError;

/// Which flavour of a directory's package a membership describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    /// Non-test files only; what importers see.
    Production,
    /// Production files plus `_test.go` files declaring the same package.
    Test,
    /// `_test.go` files declaring `<name>_test`.
    ExternalTest,
}

/// Where a package's sources live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Inside the workspace module.
    Workspace,
    /// Under `$GOROOT/src`; read-only for the whole session.
    Stdlib,
    /// Any other directory, addressed by its path.
    Directory,
}

impl Origin {
    pub fn is_immutable(self) -> bool {
        matches!(self, Origin::Stdlib)
    }
}

/// Fully resolved identity of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    pub import_path: String,
    /// Name declared by the package clause.
    pub name: String,
    pub variant: Variant,
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            Variant::Production => write!(f, "{}", self.import_path),
            Variant::Test | Variant::ExternalTest => write!(f, "{} [test]", self.import_path),
        }
    }
}

/// What a caller asks the resolver for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// The production package importable under this path.
    ImportPath(String),
    /// Whatever package this file belongs to.
    File(PathBuf),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::ImportPath(path) => write!(f, "{}", path),
            Target::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Production,
    InPackageTest,
    ExternalTest,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberFile {
    pub path: PathBuf,
    pub kind: MemberKind,
}

/// The files making up one package, as decided by the build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMembership {
    pub id: PackageId,
    pub dir: PathBuf,
    pub files: Vec<MemberFile>,
    pub origin: Origin,
}

impl PackageMembership {
    pub fn is_test_package(&self) -> bool {
        self.id.variant != Variant::Production
    }

    pub fn is_external_test_package(&self) -> bool {
        self.id.variant == Variant::ExternalTest
    }

    pub fn contains(&self, path: &std::path::Path) -> bool {
        self.files.iter().any(|file| file.path == path)
    }
}
