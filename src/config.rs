use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::loader::DEFAULT_HISTORY;

/// Returns the path to the data directory for go-lsp.
/// Uses $XDG_DATA_HOME/go-lsp if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/go-lsp,
/// or ./go-lsp if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("go-lsp.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("go-lsp")
}

/// Settings fixed when the server process starts (flags and environment).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDefaults {
    pub goroot: Option<PathBuf>,
    pub root_import_path: Option<String>,
}

impl ServerDefaults {
    /// Flag values win over `$GOROOT`.
    pub fn new(goroot: Option<PathBuf>, root_import_path: Option<String>) -> Self {
        Self::with_env(goroot, root_import_path, std::env::var("GOROOT").ok())
    }

    fn with_env(
        goroot: Option<PathBuf>,
        root_import_path: Option<String>,
        env_goroot: Option<String>,
    ) -> Self {
        Self {
            goroot: goroot.or_else(|| env_goroot.filter(|v| !v.is_empty()).map(PathBuf::from)),
            root_import_path,
        }
    }
}

/// `initializationOptions` sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializationOptions {
    pub goroot: Option<PathBuf>,
    pub root_import_path: Option<String>,
    pub cache_history: Option<usize>,
    pub request_timeout_ms: Option<u64>,
}

/// Everything a workspace needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub root: PathBuf,
    /// Import path of the workspace root when go.mod does not name one.
    pub root_import_path: Option<String>,
    pub goroot: Option<PathBuf>,
    /// Snapshots retained per package.
    pub cache_history: usize,
    /// Deadline applied to each request; none by default.
    pub request_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            root_import_path: None,
            goroot: None,
            cache_history: DEFAULT_HISTORY,
            request_timeout: None,
        }
    }

    pub fn with_defaults(mut self, defaults: &ServerDefaults) -> Self {
        self.goroot = defaults.goroot.clone().or(self.goroot);
        self.root_import_path = defaults
            .root_import_path
            .clone()
            .or(self.root_import_path);
        self
    }

    /// Client options take priority over server defaults.
    pub fn with_options(mut self, options: InitializationOptions) -> Self {
        self.goroot = options.goroot.or(self.goroot);
        self.root_import_path = options.root_import_path.or(self.root_import_path);
        if let Some(history) = options.cache_history {
            self.cache_history = history.max(1);
        }
        if let Some(ms) = options.request_timeout_ms {
            self.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        self
    }

    pub fn with_goroot(mut self, goroot: PathBuf) -> Self {
        self.goroot = Some(goroot);
        self
    }
}
