use std::time::Duration;

use thiserror::Error;

use crate::build::ResolutionError;
use crate::loader::LoadError;
use crate::syntax::PositionError;

/// Per-request failures. None of these affect other requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Load(LoadError),
}

impl From<LoadError> for EngineError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Cancelled | LoadError::Aborted(_) => EngineError::Cancelled,
            LoadError::Resolution(err) => EngineError::Resolution(err),
            other => EngineError::Load(other),
        }
    }
}
