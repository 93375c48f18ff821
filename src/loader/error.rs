use std::path::PathBuf;

use thiserror::Error;

use crate::build::ResolutionError;

/// Why a package could not be loaded. Cloned to every caller sharing a build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("import cycle not allowed: {}", .0.join(" -> "))]
    ImportCycle(Vec<String>),

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The caller stopped waiting.
    #[error("load cancelled")]
    Cancelled,

    /// Every caller stopped waiting, so the shared build was abandoned.
    #[error("build of {0} abandoned")]
    Aborted(String),

    #[error("build of {0} failed: {1}")]
    Internal(String, String),
}

impl LoadError {
    /// True when the failure says nothing about the package itself.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LoadError::Cancelled | LoadError::Aborted(_))
    }
}
