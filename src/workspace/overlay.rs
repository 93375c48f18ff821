//! In-memory edits for open documents, layered over disk content.
//!
//! Writers replace the whole file map under a lock; readers take an
//! [`OverlaySnapshot`] (a cheap `Arc` clone) and keep reading that exact
//! version for the rest of their query, no matter what lands afterwards.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use tracing::debug;

/// Content of one open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFile {
    pub content: Arc<str>,
    /// Version number supplied by the client.
    pub version: i32,
    /// Workspace revision at which this content was installed.
    pub revision: u64,
}

/// Identifies one version of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stamp {
    /// Content comes from the overlay, installed at this workspace revision.
    Overlay(u64),
    /// Content comes from disk with the given modification time and length.
    Disk { mtime_nanos: u128, len: u64 },
    /// Read-only installation content (GOROOT); never changes during a session.
    Immutable,
}

#[derive(Debug, Default)]
struct OverlayState {
    files: Arc<HashMap<PathBuf, OverlayFile>>,
    revision: u64,
}

/// The mutable overlay owned by a workspace.
#[derive(Debug, Default)]
pub struct Overlay {
    state: Mutex<OverlayState>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs content for a newly opened document and returns the new revision.
    pub fn open(&self, path: PathBuf, content: String, version: i32) -> u64 {
        self.update(|files, revision| {
            files.insert(
                path,
                OverlayFile {
                    content: content.into(),
                    version,
                    revision,
                },
            );
        })
    }

    /// Replaces the content of a document. Unknown documents are opened implicitly.
    pub fn change(&self, path: PathBuf, content: String, version: i32) -> u64 {
        self.open(path, content, version)
    }

    /// Drops the overlay for a document so reads fall back to disk.
    pub fn close(&self, path: &Path) -> u64 {
        self.update(|files, _| {
            files.remove(path);
        })
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        let state = self.state.lock();
        OverlaySnapshot {
            files: Arc::clone(&state.files),
            revision: state.revision,
        }
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<PathBuf, OverlayFile>, u64)) -> u64 {
        let mut state = self.state.lock();
        let revision = state.revision + 1;
        let mut files = HashMap::clone(&state.files);
        apply(&mut files, revision);
        state.files = Arc::new(files);
        state.revision = revision;
        debug!(revision, open_files = state.files.len(), "overlay updated");
        revision
    }
}

/// A consistent, immutable view of the overlay at one revision.
#[derive(Debug, Clone, Default)]
pub struct OverlaySnapshot {
    files: Arc<HashMap<PathBuf, OverlayFile>>,
    revision: u64,
}

impl OverlaySnapshot {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, path: &Path) -> Option<&OverlayFile> {
        self.files.get(path)
    }

    /// Overlay files whose parent directory is `dir`.
    pub fn files_in(&self, dir: &Path) -> impl Iterator<Item = &Path> {
        self.files
            .keys()
            .filter(move |path| path.parent() == Some(dir))
            .map(PathBuf::as_path)
    }

    /// Stamp of the content a read of `path` would observe.
    pub fn stamp(&self, path: &Path) -> io::Result<Stamp> {
        match self.files.get(path) {
            Some(file) => Ok(Stamp::Overlay(file.revision)),
            None => disk_stamp(path),
        }
    }

    /// Reads a file, preferring overlay content over disk.
    pub fn read(&self, path: &Path) -> io::Result<(Arc<str>, Stamp)> {
        if let Some(file) = self.files.get(path) {
            return Ok((Arc::clone(&file.content), Stamp::Overlay(file.revision)));
        }
        let stamp = disk_stamp(path)?;
        let content = std::fs::read_to_string(path)?;
        Ok((content.into(), stamp))
    }
}

fn disk_stamp(path: &Path) -> io::Result<Stamp> {
    let metadata = std::fs::metadata(path)?;
    let mtime_nanos = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    Ok(Stamp::Disk {
        mtime_nanos,
        len: metadata.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_prefers_overlay_content_over_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.go");
        std::fs::write(&path, "package disk").unwrap();

        let overlay = Overlay::new();
        let revision = overlay.open(path.clone(), "package mem".to_string(), 1);

        let (content, stamp) = overlay.snapshot().read(&path).unwrap();
        assert_eq!(&*content, "package mem");
        assert_eq!(stamp, Stamp::Overlay(revision));
    }

    #[test]
    fn close_reverts_to_disk_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.go");
        std::fs::write(&path, "package disk").unwrap();

        let overlay = Overlay::new();
        overlay.open(path.clone(), "package mem".to_string(), 1);
        overlay.close(&path);

        let (content, stamp) = overlay.snapshot().read(&path).unwrap();
        assert_eq!(&*content, "package disk");
        assert!(matches!(stamp, Stamp::Disk { .. }));
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let path = PathBuf::from("/ws/a.go");
        let overlay = Overlay::new();
        overlay.open(path.clone(), "v1".to_string(), 1);

        let before = overlay.snapshot();
        overlay.change(path.clone(), "v2".to_string(), 2);
        let after = overlay.snapshot();

        assert_eq!(&*before.get(&path).unwrap().content, "v1");
        assert_eq!(&*after.get(&path).unwrap().content, "v2");
        assert!(after.revision() > before.revision());
    }

    #[test]
    fn files_in_lists_only_direct_children() {
        let overlay = Overlay::new();
        overlay.open(PathBuf::from("/ws/a.go"), String::new(), 1);
        overlay.open(PathBuf::from("/ws/sub/b.go"), String::new(), 1);

        let snapshot = overlay.snapshot();
        let files: Vec<_> = snapshot.files_in(Path::new("/ws")).collect();
        assert_eq!(files, vec![Path::new("/ws/a.go")]);
    }
}
