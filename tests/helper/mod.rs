#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower_lsp::ClientSocket;
use tower_lsp::jsonrpc::Request;
use tower_lsp::lsp_types::Url;

use go_lsp::config::EngineConfig;
use go_lsp::syntax::Position;
use go_lsp::workspace::Workspace;

/// Import path of every fixture workspace root.
pub const ROOT_IMPORT_PATH: &str = "test/pkg";

pub const PRINTLN_SOURCE: &str = r#"package fmt

// Println formats using the default formats for its operands and writes to standard output.
// Spaces are always added between operands and a newline is appended.
// It returns the number of bytes written and any write error encountered.
func Println(a ...interface{}) (n int, err error) {
	return 0, nil
}
"#;

/// A workspace directory populated with Go sources.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let fixture = Self {
            dir: TempDir::new().unwrap(),
        };
        fixture.write(files);
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn uri(&self, name: &str) -> String {
        Url::from_file_path(self.path(name)).unwrap().to_string()
    }

    pub fn write(&self, files: &[(&str, &str)]) {
        write_files(self.dir.path(), files);
    }

    pub fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(self.root().to_path_buf());
        config.root_import_path = Some(ROOT_IMPORT_PATH.to_string());
        config
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.config())
    }

    pub fn workspace_with_goroot(&self, goroot: &Path) -> Workspace {
        Workspace::new(&self.config().with_goroot(goroot.to_path_buf()))
    }
}

pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// A GOROOT holding a minimal `fmt` package.
pub fn fake_goroot() -> TempDir {
    let goroot = TempDir::new().unwrap();
    write_files(goroot.path(), &[("src/fmt/print.go", PRINTLN_SOURCE)]);
    goroot
}

/// Position of the `|` marker once it is matched against `text`.
/// `locate("var X = A", "= |A")` points at `A`.
pub fn locate(text: &str, pattern: &str) -> Position {
    let marker = pattern.find('|').expect("pattern needs a | marker");
    let needle = pattern.replace('|', "");
    let start = text
        .find(&needle)
        .unwrap_or_else(|| panic!("{:?} not found in {:?}", needle, text));
    let offset = start + marker;

    let before = &text[..offset];
    let line = before.matches('\n').count() as u32;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = text[line_start..offset].encode_utf16().count() as u32;
    Position::new(line, column)
}

pub fn create_initialize_request(id: i64, root: &Path, options: Value) -> Request {
    let root_uri = Url::from_file_path(root).unwrap();
    Request::build("initialize")
        .params(json!({
            "capabilities": {},
            "rootUri": root_uri,
            "initializationOptions": options,
        }))
        .id(id)
        .finish()
}

pub fn create_initialized_notification() -> Request {
    Request::build("initialized").params(json!({})).finish()
}

pub fn create_did_open_notification(uri: &str, text: &str) -> Request {
    Request::build("textDocument/didOpen")
        .params(json!({
            "textDocument": {
                "uri": uri,
                "languageId": "go",
                "version": 1,
                "text": text,
            }
        }))
        .finish()
}

pub fn create_did_change_notification(uri: &str, version: i32, text: &str) -> Request {
    Request::build("textDocument/didChange")
        .params(json!({
            "textDocument": { "uri": uri, "version": version },
            "contentChanges": [{ "text": text }],
        }))
        .finish()
}

pub fn create_did_close_notification(uri: &str) -> Request {
    Request::build("textDocument/didClose")
        .params(json!({ "textDocument": { "uri": uri } }))
        .finish()
}

pub fn create_hover_request(id: i64, uri: &str, position: Position) -> Request {
    Request::build("textDocument/hover")
        .params(text_document_position(uri, position))
        .id(id)
        .finish()
}

pub fn create_definition_request(id: i64, uri: &str, position: Position) -> Request {
    Request::build("textDocument/definition")
        .params(text_document_position(uri, position))
        .id(id)
        .finish()
}

fn text_document_position(uri: &str, position: Position) -> Value {
    json!({
        "textDocument": { "uri": uri },
        "position": { "line": position.line, "character": position.column },
    })
}

/// Drains everything the server sends to the client.
pub fn spawn_notification_collector(mut socket: ClientSocket) -> mpsc::UnboundedReceiver<Request> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(request) = socket.next().await {
            if tx.send(request).is_err() {
                break;
            }
        }
    });
    rx
}

/// Next message with `method`, skipping others. `None` after 5 seconds.
pub async fn wait_for_notification(
    rx: &mut mpsc::UnboundedReceiver<Request>,
    method: &str,
) -> Option<Request> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(request) = rx.recv().await {
            if request.method() == method {
                return Some(request);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
