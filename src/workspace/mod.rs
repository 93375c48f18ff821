//! Workspace
//! - overlay.rs: in-memory edits layered over disk
//! - error.rs: per-request failures
//!
//! A workspace owns every cache for one root. Queries take an overlay
//! snapshot when they are dispatched and answer entirely from it.

pub mod error;
pub mod overlay;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::build::{BuildContext, ResolutionError, Target};
use crate::config::EngineConfig;
use crate::hover::{self, HoverResult};
use crate::loader::{Loader, PackageSnapshot};
use crate::syntax::Position;
use crate::types::{Diagnostic, Location};
pub use error::EngineError;
use overlay::{Overlay, OverlaySnapshot};

pub struct Workspace {
    overlay: Overlay,
    loader: Arc<Loader>,
}

impl Workspace {
    pub fn new(config: &EngineConfig) -> Self {
        let module_path =
            BuildContext::discover_module_path(&config.root, config.root_import_path.as_deref());
        info!(
            root = %config.root.display(),
            %module_path,
            goroot = ?config.goroot,
            "workspace created"
        );
        let context = BuildContext::new(config.root.clone(), module_path, config.goroot.clone());
        Self {
            overlay: Overlay::new(),
            loader: Arc::new(Loader::with_history(
                Arc::new(context),
                config.cache_history,
            )),
        }
    }

    pub fn root(&self) -> &Path {
        self.loader.context().root()
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    /// The view every query dispatched from now on must answer from.
    pub fn snapshot(&self) -> OverlaySnapshot {
        self.overlay.snapshot()
    }

    pub fn did_open(&self, path: PathBuf, content: String, version: i32) -> u64 {
        debug!(path = %path.display(), version, "did_open");
        self.overlay.open(path, content, version)
    }

    pub fn did_change(&self, path: PathBuf, content: String, version: i32) -> u64 {
        debug!(path = %path.display(), version, "did_change");
        self.overlay.change(path, content, version)
    }

    pub fn did_close(&self, path: &Path) -> u64 {
        debug!(path = %path.display(), "did_close");
        self.overlay.close(path)
    }

    /// Loads the package `path` belongs to, as seen by `overlay`.
    pub async fn package_of(
        &self,
        overlay: &OverlaySnapshot,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Arc<PackageSnapshot>, EngineError> {
        let target = Target::File(path.to_path_buf());
        Ok(self.loader.load(&target, overlay, cancel).await?)
    }

    pub async fn hover(
        &self,
        overlay: &OverlaySnapshot,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> Result<Option<HoverResult>, EngineError> {
        let (snapshot, offset) = self.locate(overlay, path, position, cancel).await?;
        Ok(hover::hover(&snapshot, path, offset))
    }

    pub async fn definition(
        &self,
        overlay: &OverlaySnapshot,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> Result<Option<Location>, EngineError> {
        let (snapshot, offset) = self.locate(overlay, path, position, cancel).await?;
        Ok(hover::definition(&snapshot, path, offset))
    }

    /// Diagnostics of the package `path` belongs to, limited to `path`.
    pub async fn diagnostics(
        &self,
        overlay: &OverlaySnapshot,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, EngineError> {
        let snapshot = self.package_of(overlay, path, cancel).await?;
        Ok(snapshot.diagnostics_for(path).cloned().collect())
    }

    /// Translates `position` against the file version inside the loaded
    /// package, which is the version `overlay` holds.
    async fn locate(
        &self,
        overlay: &OverlaySnapshot,
        path: &Path,
        position: Position,
        cancel: &CancellationToken,
    ) -> Result<(Arc<PackageSnapshot>, usize), EngineError> {
        let snapshot = self.package_of(overlay, path, cancel).await?;
        let file = snapshot
            .file(path)
            .ok_or_else(|| ResolutionError::NotFound(path.display().to_string()))?;
        let offset = file.lines.offset(position)?;
        Ok((snapshot, offset))
    }
}
