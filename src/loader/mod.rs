//! Package loading
//! - snapshot.rs: immutable checked packages and their cache keys
//! - error.rs: load failures shared between callers
//!
//! Builds are keyed by package identity plus member file stamps. Concurrent
//! requests for the same key share one build; the build is abandoned once
//! every caller has stopped waiting for it.

pub mod error;
pub mod snapshot;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::build::{BuildContext, PackageId, PackageMembership, ResolutionError, Target};
use crate::syntax::ParsedFile;
use crate::types::{Diagnostic, Imports, Severity, check};
use crate::workspace::overlay::{OverlaySnapshot, Stamp};
pub use error::LoadError;
pub use snapshot::{CacheKey, PackageSnapshot};

/// Snapshots kept per package so queries holding older overlay views still hit.
pub const DEFAULT_HISTORY: usize = 4;

/// Rebuilds attempted when a result is already stale on arrival.
const MAX_ATTEMPTS: usize = 3;

pub type LoadResult = Result<Arc<PackageSnapshot>, LoadError>;

type DependencyLoad<'l> = Pin<Box<dyn Future<Output = LoadResult> + Send + 'l>>;

struct Flight {
    id: u64,
    interest: usize,
    abort: CancellationToken,
    result: watch::Receiver<Option<LoadResult>>,
}

#[derive(Default)]
struct LoaderState {
    ready: HashMap<PackageId, VecDeque<Arc<PackageSnapshot>>>,
    in_flight: HashMap<CacheKey, Flight>,
    /// Build waiting on another build's result.
    waits: HashMap<CacheKey, CacheKey>,
}

/// The build on whose behalf dependencies are loaded.
#[derive(Debug, Clone)]
struct Frame {
    key: CacheKey,
    /// Import paths from the outermost build down to this one.
    stack: Vec<String>,
}

pub struct Loader {
    context: Arc<BuildContext>,
    state: Mutex<LoaderState>,
    history: usize,
    builds: AtomicUsize,
    next_flight: AtomicU64,
}

/// A caller's registered interest in one flight; released on drop, so
/// dropped or cancelled waiters are accounted for.
struct Interest<'l> {
    loader: &'l Loader,
    key: &'l CacheKey,
    flight: u64,
}

impl Drop for Interest<'_> {
    fn drop(&mut self) {
        self.loader.release(self.key, self.flight);
    }
}

impl Loader {
    pub fn new(context: Arc<BuildContext>) -> Self {
        Self::with_history(context, DEFAULT_HISTORY)
    }

    pub fn with_history(context: Arc<BuildContext>, history: usize) -> Self {
        Self {
            context,
            state: Mutex::new(LoaderState::default()),
            history: history.max(1),
            builds: AtomicUsize::new(0),
            next_flight: AtomicU64::new(0),
        }
    }

    pub fn context(&self) -> &Arc<BuildContext> {
        &self.context
    }

    /// Number of completed package builds since creation.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn cached_versions(&self, id: &PackageId) -> usize {
        self.state
            .lock()
            .ready
            .get(id)
            .map(VecDeque::len)
            .unwrap_or_default()
    }

    /// Loads the package `target` denotes as seen through `overlay`.
    pub async fn load(
        self: &Arc<Self>,
        target: &Target,
        overlay: &OverlaySnapshot,
        cancel: &CancellationToken,
    ) -> LoadResult {
        let membership = self.context.resolve(target, overlay)?;
        self.load_membership(membership, overlay, cancel, None)
            .await
    }

    fn load_dependency<'l>(
        self: &'l Arc<Self>,
        import_path: String,
        overlay: &'l OverlaySnapshot,
        cancel: &'l CancellationToken,
        frame: &'l Frame,
    ) -> DependencyLoad<'l> {
        Box::pin(async move {
            let membership = self.context.resolve_import(&import_path, overlay)?;
            self.load_membership(membership, overlay, cancel, Some(frame))
                .await
        })
    }

    async fn load_membership(
        self: &Arc<Self>,
        membership: PackageMembership,
        overlay: &OverlaySnapshot,
        cancel: &CancellationToken,
        frame: Option<&Frame>,
    ) -> LoadResult {
        let key = self.key_for(&membership, overlay)?;

        for attempt in 0..MAX_ATTEMPTS {
            if let Some(snapshot) = self.ready(&key) {
                if self.is_current(&snapshot, overlay) {
                    debug!(package = %key.id, "cache hit");
                    return Ok(snapshot);
                }
                debug!(package = %key.id, attempt, "evicting snapshot with stale dependencies");
                self.evict(&snapshot);
                continue;
            }

            let snapshot = self
                .join_or_start(&membership, &key, overlay, cancel, frame)
                .await?;
            if self.is_current(&snapshot, overlay) {
                return Ok(snapshot);
            }
            self.evict(&snapshot);
        }

        warn!(package = %key.id, "dependencies kept changing during load");
        self.join_or_start(&membership, &key, overlay, cancel, frame)
            .await
    }

    fn key_for(
        &self,
        membership: &PackageMembership,
        overlay: &OverlaySnapshot,
    ) -> Result<CacheKey, LoadError> {
        let immutable = membership.origin.is_immutable();
        let stamps = membership
            .files
            .iter()
            .map(|file| {
                let stamp = if immutable {
                    Stamp::Immutable
                } else {
                    overlay
                        .stamp(&file.path)
                        .map_err(|e| ResolutionError::io(&file.path, e))?
                };
                Ok((file.path.clone(), stamp))
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        Ok(CacheKey {
            id: membership.id.clone(),
            stamps,
        })
    }

    fn ready(&self, key: &CacheKey) -> Option<Arc<PackageSnapshot>> {
        self.state
            .lock()
            .ready
            .get(&key.id)?
            .iter()
            .find(|snapshot| snapshot.key == *key)
            .cloned()
    }

    fn evict(&self, snapshot: &Arc<PackageSnapshot>) {
        if let Some(history) = self.state.lock().ready.get_mut(snapshot.id()) {
            history.retain(|cached| !Arc::ptr_eq(cached, snapshot));
        }
    }

    /// True when every transitive dependency the snapshot was checked
    /// against still matches what `overlay` shows.
    fn is_current(&self, snapshot: &PackageSnapshot, overlay: &OverlaySnapshot) -> bool {
        let mut seen = HashSet::new();
        snapshot
            .deps
            .iter()
            .all(|dep| self.dep_is_current(dep, overlay, &mut seen))
    }

    fn dep_is_current(
        &self,
        dep: &PackageSnapshot,
        overlay: &OverlaySnapshot,
        seen: &mut HashSet<PackageId>,
    ) -> bool {
        if dep.membership.origin.is_immutable() || !seen.insert(dep.id().clone()) {
            return true;
        }
        let fresh = self
            .context
            .resolve_import(&dep.id().import_path, overlay)
            .ok()
            .and_then(|membership| self.key_for(&membership, overlay).ok());
        if fresh.as_ref() != Some(&dep.key) {
            debug!(package = %dep.id(), "dependency changed");
            return false;
        }
        dep.deps
            .iter()
            .all(|next| self.dep_is_current(next, overlay, seen))
    }

    async fn join_or_start(
        self: &Arc<Self>,
        membership: &PackageMembership,
        key: &CacheKey,
        overlay: &OverlaySnapshot,
        cancel: &CancellationToken,
        frame: Option<&Frame>,
    ) -> LoadResult {
        let mut cycle = false;
        let (flight, mut result) = {
            let mut state = self.state.lock();
            let joined = state.in_flight.get_mut(key).map(|flight| {
                flight.interest += 1;
                (flight.id, flight.result.clone())
            });
            match joined {
                Some(joined) => {
                    if let Some(frame) = frame {
                        if leads_to(&state.waits, key, &frame.key) {
                            cycle = true;
                        } else {
                            state.waits.insert(frame.key.clone(), key.clone());
                        }
                    }
                    joined
                }
                None => {
                    let started = self.start(&mut state, membership, key, overlay, frame);
                    // Record the edge so a cycle closed later through this
                    // flight, from any load stack, is detected.
                    if let Some(frame) = frame {
                        state.waits.insert(frame.key.clone(), key.clone());
                    }
                    started
                }
            }
        };
        let _interest = Interest {
            loader: self,
            key,
            flight,
        };

        if cycle {
            let mut path = frame.map(|frame| frame.stack.clone()).unwrap_or_default();
            path.push(key.id.import_path.clone());
            return Err(LoadError::ImportCycle(path));
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LoadError::Cancelled),
            published = result.wait_for(Option::is_some) => match published {
                Ok(value) => (*value).clone().unwrap_or_else(|| {
                    Err(LoadError::Internal(key.id.to_string(), "empty result".to_string()))
                }),
                Err(_) => Err(LoadError::Internal(
                    key.id.to_string(),
                    "build ended without a result".to_string(),
                )),
            },
        };

        if let Some(frame) = frame {
            self.state.lock().waits.remove(&frame.key);
        }
        outcome
    }

    fn start(
        self: &Arc<Self>,
        state: &mut LoaderState,
        membership: &PackageMembership,
        key: &CacheKey,
        overlay: &OverlaySnapshot,
        frame: Option<&Frame>,
    ) -> (u64, watch::Receiver<Option<LoadResult>>) {
        let id = self.next_flight.fetch_add(1, Ordering::SeqCst);
        let abort = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        state.in_flight.insert(
            key.clone(),
            Flight {
                id,
                interest: 1,
                abort: abort.clone(),
                result: rx.clone(),
            },
        );

        let mut stack = frame.map(|frame| frame.stack.clone()).unwrap_or_default();
        stack.push(key.id.import_path.clone());
        let frame = Frame {
            key: key.clone(),
            stack,
        };
        let loader = Arc::clone(self);
        let membership = membership.clone();
        let overlay = overlay.clone();

        debug!(package = %key.id, flight = id, "build started");
        tokio::spawn(async move {
            let result = loader.build(membership, &frame, &overlay, &abort).await;
            loader.finish(&frame.key, id, &result);
            // Nobody may be listening any more; the result is cached regardless.
            let _ = tx.send(Some(result));
        });
        (id, rx)
    }

    fn release(&self, key: &CacheKey, flight: u64) {
        let mut state = self.state.lock();
        let abandoned = match state.in_flight.get_mut(key) {
            Some(current) if current.id == flight => {
                current.interest = current.interest.saturating_sub(1);
                current.interest == 0
            }
            _ => false,
        };
        if abandoned {
            if let Some(current) = state.in_flight.remove(key) {
                current.abort.cancel();
                debug!(package = %key.id, flight, "build abandoned");
            }
        }
    }

    fn finish(&self, key: &CacheKey, flight: u64, result: &LoadResult) {
        let mut state = self.state.lock();
        if state
            .in_flight
            .get(key)
            .is_some_and(|current| current.id == flight)
        {
            state.in_flight.remove(key);
        }
        state.waits.remove(key);

        if let Ok(snapshot) = result {
            let history = state.ready.entry(key.id.clone()).or_default();
            history.retain(|cached| cached.key != snapshot.key);
            history.push_front(Arc::clone(snapshot));
            history.truncate(self.history);
        }
    }

    async fn build(
        self: &Arc<Self>,
        membership: PackageMembership,
        frame: &Frame,
        overlay: &OverlaySnapshot,
        abort: &CancellationToken,
    ) -> LoadResult {
        let started = Instant::now();
        let id = frame.key.id.clone();
        let aborted = || LoadError::Aborted(id.to_string());

        let mut files = Vec::with_capacity(membership.files.len());
        for member in &membership.files {
            if abort.is_cancelled() {
                return Err(aborted());
            }
            let (text, stamp) = if membership.origin.is_immutable() {
                let text = std::fs::read_to_string(&member.path)
                    .map_err(|e| ResolutionError::io(&member.path, e))?;
                (Arc::<str>::from(text), Stamp::Immutable)
            } else {
                overlay
                    .read(&member.path)
                    .map_err(|e| ResolutionError::io(&member.path, e))?
            };
            let parsed = ParsedFile::parse(member.path.clone(), text, stamp).map_err(|e| {
                LoadError::Parse {
                    path: member.path.clone(),
                    message: e.to_string(),
                }
            })?;
            files.push(parsed);
        }

        let import_paths: BTreeSet<String> = files.iter().flat_map(import_paths).collect();
        let mut imports = Imports::default();
        let mut deps = Vec::new();
        for import_path in import_paths {
            if import_path == "C" {
                continue;
            }
            if abort.is_cancelled() {
                return Err(aborted());
            }
            if frame.stack.contains(&import_path) {
                let mut cycle = frame.stack.clone();
                cycle.push(import_path.clone());
                imports
                    .failed
                    .insert(import_path, LoadError::ImportCycle(cycle).to_string());
                continue;
            }

            match self
                .load_dependency(import_path.clone(), overlay, abort, frame)
                .await
            {
                Ok(dep) => {
                    imports
                        .resolved
                        .insert(import_path, Arc::clone(&dep.types));
                    deps.push(dep);
                }
                Err(err) if err.is_cancellation() => return Err(aborted()),
                Err(err) => {
                    debug!(package = %id, %import_path, error = %err, "import failed");
                    imports.failed.insert(import_path, err.to_string());
                }
            }
        }

        if abort.is_cancelled() {
            return Err(aborted());
        }
        let path = id.import_path.clone();
        let name = id.name.clone();
        let (files, checked) = tokio::task::spawn_blocking(move || {
            let checked = check(&path, &name, &files, &imports);
            (files, checked)
        })
        .await
        .map_err(|e| LoadError::Internal(id.to_string(), e.to_string()))?;

        let mut diagnostics: Vec<Diagnostic> = files.iter().flat_map(syntax_diagnostics).collect();
        diagnostics.extend(checked.diagnostics);

        self.builds.fetch_add(1, Ordering::SeqCst);
        info!(
            package = %id,
            files = files.len(),
            deps = deps.len(),
            diagnostics = diagnostics.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "package built"
        );

        // Files may have changed on disk since the key was computed; the
        // snapshot is keyed by what was actually read.
        let key = CacheKey {
            id: frame.key.id.clone(),
            stamps: files
                .iter()
                .map(|file| (file.path.clone(), file.stamp))
                .collect(),
        };
        if key != frame.key {
            debug!(package = %id, "sources changed while building");
        }

        Ok(Arc::new(PackageSnapshot {
            key,
            membership,
            files,
            types: checked.types,
            idents: checked.idents,
            diagnostics,
            deps,
        }))
    }
}

/// Whether following wait edges from `from` reaches `target`.
fn leads_to(waits: &HashMap<CacheKey, CacheKey>, from: &CacheKey, target: &CacheKey) -> bool {
    let mut current = from;
    for _ in 0..=waits.len() {
        if current == target {
            return true;
        }
        match waits.get(current) {
            Some(next) => current = next,
            None => return false,
        }
    }
    false
}

fn import_paths(file: &ParsedFile) -> Vec<String> {
    let root = file.root();
    let mut cursor = root.walk();
    let mut pending: Vec<_> = root
        .named_children(&mut cursor)
        .filter(|node| node.kind() == "import_declaration")
        .collect();

    let mut paths = Vec::new();
    while let Some(node) = pending.pop() {
        if node.kind() == "import_spec" {
            if let Some(path) = node.child_by_field_name("path") {
                paths.push(file.text_of(path).trim_matches(['"', '`']).to_string());
            }
            continue;
        }
        let mut cursor = node.walk();
        pending.extend(node.named_children(&mut cursor));
    }
    paths
}

fn syntax_diagnostics(file: &ParsedFile) -> Vec<Diagnostic> {
    file.syntax_errors()
        .into_iter()
        .map(|error| Diagnostic {
            path: file.path.clone(),
            range: file
                .lines
                .range(error.start, error.end)
                .unwrap_or_default(),
            severity: Severity::Error,
            message: error.message,
        })
        .collect()
}
