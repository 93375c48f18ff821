//! Maps import paths to directories and directories to package memberships.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, warn};

use crate::build::{
    MemberFile, MemberKind, Origin, PackageId, PackageMembership, ResolutionError, Target,
    Variant,
};
use crate::syntax::{clause, is_go_file, is_test_file};
use crate::workspace::overlay::{OverlaySnapshot, Stamp};

/// A `.go` file found while scanning a directory.
#[derive(Debug, Clone)]
struct ScannedFile {
    path: PathBuf,
    name: String,
    test: bool,
}

pub struct BuildContext {
    root: PathBuf,
    module_path: String,
    goroot: Option<PathBuf>,
    stdlib: Mutex<HashMap<String, PackageMembership>>,
    /// Package clause of each scanned file, valid while its stamp matches.
    clauses: Mutex<HashMap<PathBuf, (Stamp, Option<String>)>>,
    clause_reads: AtomicUsize,
}

impl BuildContext {
    pub fn new(root: PathBuf, module_path: String, goroot: Option<PathBuf>) -> Self {
        debug!(?root, %module_path, ?goroot, "build context created");
        Self {
            root,
            module_path,
            goroot,
            stdlib: Mutex::new(HashMap::new()),
            clauses: Mutex::new(HashMap::new()),
            clause_reads: AtomicUsize::new(0),
        }
    }

    /// Reads the module path from `<root>/go.mod`, falling back to the
    /// configured path and finally to the root directory's name.
    pub fn discover_module_path(root: &Path, configured: Option<&str>) -> String {
        let from_go_mod = std::fs::read_to_string(root.join("go.mod"))
            .ok()
            .and_then(|content| parse_module_directive(&content));

        from_go_mod
            .or_else(|| configured.map(str::to_string))
            .unwrap_or_else(|| {
                root.file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("main")
                    .to_string()
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn goroot(&self) -> Option<&Path> {
        self.goroot.as_deref()
    }

    /// Number of files read to find their package clause.
    pub fn clause_reads(&self) -> usize {
        self.clause_reads.load(Ordering::Relaxed)
    }

    pub fn resolve(
        &self,
        target: &Target,
        overlay: &OverlaySnapshot,
    ) -> Result<PackageMembership, ResolutionError> {
        match target {
            Target::ImportPath(path) => self.resolve_import(path, overlay),
            Target::File(path) => self.resolve_file(path, overlay),
        }
    }

    /// Locates the directory holding an import path.
    pub fn dir_for_import(&self, import_path: &str) -> Result<(PathBuf, Origin), ResolutionError> {
        if import_path == self.module_path {
            return Ok((self.root.clone(), Origin::Workspace));
        }
        if let Some(rest) = import_path
            .strip_prefix(&self.module_path)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            let dir = self.root.join(rest);
            if dir.is_dir() {
                return Ok((dir, Origin::Workspace));
            }
        }
        if let Some(goroot) = &self.goroot {
            let dir = goroot.join("src").join(import_path);
            if dir.is_dir() {
                return Ok((dir, Origin::Stdlib));
            }
        }
        Err(ResolutionError::NotFound(import_path.to_string()))
    }

    /// The import path naming a directory.
    pub fn import_path_for_dir(&self, dir: &Path) -> (String, Origin) {
        if let Some(goroot) = &self.goroot {
            if let Ok(rel) = dir.strip_prefix(goroot.join("src")) {
                return (slash_path(rel), Origin::Stdlib);
            }
        }
        match dir.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => (self.module_path.clone(), Origin::Workspace),
            Ok(rel) => (
                format!("{}/{}", self.module_path, slash_path(rel)),
                Origin::Workspace,
            ),
            Err(_) => (dir.to_string_lossy().into_owned(), Origin::Directory),
        }
    }

    /// Production package importable under `import_path`.
    pub fn resolve_import(
        &self,
        import_path: &str,
        overlay: &OverlaySnapshot,
    ) -> Result<PackageMembership, ResolutionError> {
        if let Some(cached) = self.stdlib.lock().get(import_path) {
            return Ok(cached.clone());
        }

        let (dir, origin) = self.dir_for_import(import_path)?;
        let files = self.scan_dir(&dir, origin, overlay)?;
        let name = primary_name(&files, import_path).ok_or_else(|| {
            debug!(%import_path, ?dir, "directory has no non-test package");
            ResolutionError::NoGoFiles(dir.clone())
        })?;

        let membership = production_membership(import_path, name, dir, origin, &files);
        if origin.is_immutable() {
            self.stdlib
                .lock()
                .insert(import_path.to_string(), membership.clone());
        }
        Ok(membership)
    }

    /// The package `path` belongs to: its own package clause decides, so
    /// sibling packages in the same directory never leak in.
    pub fn resolve_file(
        &self,
        path: &Path,
        overlay: &OverlaySnapshot,
    ) -> Result<PackageMembership, ResolutionError> {
        if !is_go_file(path) {
            return Err(ResolutionError::NotGoFile(path.to_path_buf()));
        }
        let dir = path
            .parent()
            .ok_or_else(|| ResolutionError::NotFound(path.display().to_string()))?
            .to_path_buf();
        let (import_path, origin) = self.import_path_for_dir(&dir);
        let files = self.scan_dir(&dir, origin, overlay)?;

        let Some(own) = files.iter().find(|file| file.path == path) else {
            return Err(ResolutionError::NoPackageClause(path.to_path_buf()));
        };
        let name = own.name.clone();

        if !own.test {
            return Ok(production_membership(
                &import_path,
                name,
                dir,
                origin,
                &files,
            ));
        }

        if name.ends_with("_test") {
            let members = files
                .iter()
                .filter(|file| file.test && file.name == name)
                .map(|file| MemberFile {
                    path: file.path.clone(),
                    kind: MemberKind::ExternalTest,
                })
                .collect();
            return Ok(PackageMembership {
                id: PackageId {
                    import_path: format!("{}_test", import_path),
                    name,
                    variant: Variant::ExternalTest,
                },
                dir,
                files: members,
                origin,
            });
        }

        let mut members: Vec<MemberFile> = files
            .iter()
            .filter(|file| !file.test && file.name == name)
            .map(|file| MemberFile {
                path: file.path.clone(),
                kind: MemberKind::Production,
            })
            .collect();
        members.extend(
            files
                .iter()
                .filter(|file| file.test && file.name == name)
                .map(|file| MemberFile {
                    path: file.path.clone(),
                    kind: MemberKind::InPackageTest,
                }),
        );
        Ok(PackageMembership {
            id: PackageId {
                import_path,
                name,
                variant: Variant::Test,
            },
            dir,
            files: members,
            origin,
        })
    }

    /// Lists the `.go` files directly inside `dir` (never subdirectories),
    /// including unsaved overlay files, sorted by file name.
    fn scan_dir(
        &self,
        dir: &Path,
        origin: Origin,
        overlay: &OverlaySnapshot,
    ) -> Result<Vec<ScannedFile>, ResolutionError> {
        // Installation sources never see overlay edits.
        let empty = OverlaySnapshot::default();
        let overlay = if origin.is_immutable() { &empty } else { overlay };

        let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| is_go_file(path) && path.is_file())
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(ResolutionError::io(dir, e)),
        };
        paths.extend(
            overlay
                .files_in(dir)
                .filter(|path| is_go_file(path))
                .map(Path::to_path_buf),
        );
        paths.sort();
        paths.dedup();

        if paths.is_empty() {
            return Err(ResolutionError::NotFound(dir.display().to_string()));
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let name = match self.package_clause(&path, overlay) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Failed to read {:?}: {}", path, e);
                    continue;
                }
            };
            let Some(name) = name else {
                debug!(?path, "skipping file without package clause");
                continue;
            };
            files.push(ScannedFile {
                name,
                test: is_test_file(&path),
                path,
            });
        }
        Ok(files)
    }

    /// The package name a file declares. Files whose stamp is unchanged since
    /// the last scan are not read again.
    fn package_clause(
        &self,
        path: &Path,
        overlay: &OverlaySnapshot,
    ) -> std::io::Result<Option<String>> {
        let stamp = overlay.stamp(path)?;
        if let Some((cached, name)) = self.clauses.lock().get(path) {
            if *cached == stamp {
                return Ok(name.clone());
            }
        }

        let (content, stamp) = overlay.read(path)?;
        self.clause_reads.fetch_add(1, Ordering::Relaxed);
        let name = clause::package_name(&content).map(str::to_string);
        self.clauses
            .lock()
            .insert(path.to_path_buf(), (stamp, name.clone()));
        Ok(name)
    }
}

fn production_membership(
    import_path: &str,
    name: String,
    dir: PathBuf,
    origin: Origin,
    files: &[ScannedFile],
) -> PackageMembership {
    let members = files
        .iter()
        .filter(|file| !file.test && file.name == name)
        .map(|file| MemberFile {
            path: file.path.clone(),
            kind: MemberKind::Production,
        })
        .collect();
    PackageMembership {
        id: PackageId {
            import_path: import_path.to_string(),
            name,
            variant: Variant::Production,
        },
        dir,
        files: members,
        origin,
    }
}

/// Picks the package an import path refers to when a directory declares
/// several: the one named after the last path element, otherwise the package
/// of the first non-test file in file name order.
fn primary_name(files: &[ScannedFile], import_path: &str) -> Option<String> {
    let last = import_path.rsplit('/').next().unwrap_or(import_path);
    let production = || files.iter().filter(|file| !file.test);

    production()
        .find(|file| file.name == last)
        .or_else(|| production().next())
        .map(|file| file.name.clone())
}

fn parse_module_directive(go_mod: &str) -> Option<String> {
    static MODULE: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = MODULE
        .get_or_init(|| Regex::new(r#"(?m)^\s*module\s+"?([^\s"]+)"?"#).ok())
        .as_ref()?;
    regex
        .captures(go_mod)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::overlay::Overlay;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn names(membership: &PackageMembership) -> Vec<&str> {
        membership
            .files
            .iter()
            .map(|file| crate::syntax::file_name(&file.path))
            .collect()
    }

    fn context(root: &Path) -> BuildContext {
        BuildContext::new(root.to_path_buf(), "test/pkg".to_string(), None)
    }

    #[test]
    fn parse_module_directive_reads_go_mod() {
        assert_eq!(
            parse_module_directive("// comment\nmodule example.com/m\n\ngo 1.21\n"),
            Some("example.com/m".to_string())
        );
        assert_eq!(parse_module_directive("go 1.21\n"), None);
    }

    #[test]
    fn discover_module_path_falls_back_to_configured_then_dir_name() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            BuildContext::discover_module_path(dir.path(), Some("cfg/path")),
            "cfg/path"
        );
        write(dir.path(), "go.mod", "module test/pkg\n");
        assert_eq!(
            BuildContext::discover_module_path(dir.path(), Some("cfg/path")),
            "test/pkg"
        );
    }

    #[test]
    fn resolve_file_returns_own_package_in_multi_package_dir() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.go", "package p; func A() { A() }");
        let main = write(dir.path(), "main.go", "package main; func main() {}");
        let ctx = context(dir.path());
        let overlay = OverlaySnapshot::default();

        let p = ctx.resolve_file(&a, &overlay).unwrap();
        assert_eq!(p.id.name, "p");
        assert_eq!(names(&p), vec!["a.go"]);

        let m = ctx.resolve_file(&main, &overlay).unwrap();
        assert_eq!(m.id.name, "main");
        assert_eq!(names(&m), vec!["main.go"]);
    }

    #[test]
    fn resolve_file_splits_test_and_external_test_packages() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.go", "package p; var A int");
        let a_test = write(dir.path(), "a_test.go", "package p; var X = A");
        let x_test = write(
            dir.path(),
            "x_test.go",
            "package p_test; import \"test/pkg\"; var X = p.A",
        );
        let ctx = context(dir.path());
        let overlay = OverlaySnapshot::default();

        let test = ctx.resolve_file(&a_test, &overlay).unwrap();
        assert!(test.is_test_package());
        assert!(!test.is_external_test_package());
        assert_eq!(names(&test), vec!["a.go", "a_test.go"]);
        assert_eq!(test.files[1].kind, MemberKind::InPackageTest);

        let xtest = ctx.resolve_file(&x_test, &overlay).unwrap();
        assert!(xtest.is_external_test_package());
        assert_eq!(xtest.id.import_path, "test/pkg_test");
        assert_eq!(names(&xtest), vec!["x_test.go"]);

        let production = ctx.resolve_import("test/pkg", &overlay).unwrap();
        assert_eq!(production.id.variant, Variant::Production);
        assert_eq!(names(&production), vec!["a.go"]);
    }

    #[test]
    fn resolve_import_never_includes_subdirectories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.go", "package p");
        write(dir.path(), "d/b.go", "package d");
        let ctx = context(dir.path());
        let overlay = OverlaySnapshot::default();

        let root = ctx.resolve_import("test/pkg", &overlay).unwrap();
        assert_eq!(names(&root), vec!["a.go"]);

        let sub = ctx.resolve_import("test/pkg/d", &overlay).unwrap();
        assert_eq!(sub.id.name, "d");
        assert_eq!(names(&sub), vec!["b.go"]);
    }

    #[test]
    fn resolve_import_reports_unknown_paths_as_not_found() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.go", "package p");
        let ctx = context(dir.path());

        let err = ctx
            .resolve_import("example.com/missing", &OverlaySnapshot::default())
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::NotFound("example.com/missing".to_string())
        );
    }

    #[test]
    fn resolve_import_prefers_package_named_after_path() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.go", "package other");
        write(dir.path(), "b.go", "package pkg");
        let ctx = context(dir.path());

        let membership = ctx
            .resolve_import("test/pkg", &OverlaySnapshot::default())
            .unwrap();
        assert_eq!(membership.id.name, "pkg");
        assert_eq!(names(&membership), vec!["b.go"]);
    }

    #[test]
    fn resolve_sees_unsaved_overlay_files_and_clauses() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.go", "package p");
        let ctx = context(dir.path());
        let overlay = Overlay::new();
        overlay.open(dir.path().join("new.go"), "package p".to_string(), 1);
        overlay.open(a.clone(), "package q".to_string(), 1);

        let membership = ctx.resolve_file(&a, &overlay.snapshot()).unwrap();
        assert_eq!(membership.id.name, "q");
        assert_eq!(names(&membership), vec!["a.go"]);

        let p = ctx
            .resolve_file(&dir.path().join("new.go"), &overlay.snapshot())
            .unwrap();
        assert_eq!(names(&p), vec!["new.go"]);
    }

    #[test]
    fn stdlib_packages_ignore_overlay_and_are_memoized() {
        let goroot = TempDir::new().unwrap();
        let print = write(goroot.path(), "src/fmt/print.go", "package fmt");
        let ws = TempDir::new().unwrap();
        let ctx = BuildContext::new(
            ws.path().to_path_buf(),
            "test/pkg".to_string(),
            Some(goroot.path().to_path_buf()),
        );
        let overlay = Overlay::new();
        overlay.open(print.clone(), "package hacked".to_string(), 1);

        let fmt = ctx.resolve_import("fmt", &overlay.snapshot()).unwrap();
        assert_eq!(fmt.origin, Origin::Stdlib);
        assert_eq!(fmt.id.name, "fmt");
        assert_eq!(ctx.import_path_for_dir(&goroot.path().join("src/fmt")).0, "fmt");
        assert!(ctx.stdlib.lock().contains_key("fmt"));
    }

    #[test]
    fn unchanged_files_are_not_rescanned() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "lib/a.go", "package lib");
        let b = write(dir.path(), "lib/b.go", "package lib");
        let ctx = context(dir.path());
        let overlay = Overlay::new();

        ctx.resolve_import("test/pkg/lib", &overlay.snapshot()).unwrap();
        assert_eq!(ctx.clause_reads(), 2);
        ctx.resolve_import("test/pkg/lib", &overlay.snapshot()).unwrap();
        assert_eq!(ctx.clause_reads(), 2);

        // A different length changes the disk stamp.
        std::fs::write(&b, "package other").unwrap();
        let lib = ctx.resolve_import("test/pkg/lib", &overlay.snapshot()).unwrap();
        assert_eq!(ctx.clause_reads(), 3);
        assert_eq!(names(&lib), vec!["a.go"]);

        overlay.open(b.clone(), "package lib".to_string(), 1);
        let lib = ctx.resolve_import("test/pkg/lib", &overlay.snapshot()).unwrap();
        assert_eq!(ctx.clause_reads(), 4);
        assert_eq!(names(&lib), vec!["a.go", "b.go"]);
    }
}
