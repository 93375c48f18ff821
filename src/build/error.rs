use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("cannot find package \"{0}\"")]
    NotFound(String),

    #[error("no non-test Go files in {0}")]
    NoGoFiles(PathBuf),

    #[error("{0} has no package clause")]
    NoPackageClause(PathBuf),

    #[error("{0} is not a Go source file")]
    NotGoFile(PathBuf),

    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl ResolutionError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
