use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tower_lsp::jsonrpc::{self, ErrorCode, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, InitializationOptions, ServerDefaults};
use crate::hover::{HoverFragment, HoverResult};
use crate::lsp::dispatcher::Dispatcher;
use crate::syntax::{self, Position as SourcePosition, Range as SourceRange};
use crate::types::{self, Severity};
use crate::workspace::overlay::OverlaySnapshot;
use crate::workspace::{EngineError, Workspace};

/// State created by `initialize`.
struct Session {
    workspace: Workspace,
    dispatcher: Dispatcher,
}

pub struct Backend {
    client: Client,
    defaults: ServerDefaults,
    session: RwLock<Option<Arc<Session>>>,
}

impl Backend {
    pub fn new(client: Client, defaults: ServerDefaults) -> Self {
        Self {
            client,
            defaults,
            session: RwLock::new(None),
        }
    }

    pub fn server_capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::FULL),
                    ..Default::default()
                },
            )),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            definition_provider: Some(OneOf::Left(true)),
            ..Default::default()
        }
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    fn engine_config(&self, params: &InitializeParams) -> EngineConfig {
        let root = workspace_root(params).unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        });
        let options = params
            .initialization_options
            .clone()
            .map(serde_json::from_value::<InitializationOptions>)
            .transpose()
            .inspect_err(|e| warn!("Ignoring malformed initializationOptions: {}", e))
            .ok()
            .flatten()
            .unwrap_or_default();

        EngineConfig::new(root)
            .with_defaults(&self.defaults)
            .with_options(options)
    }

    /// Publishes diagnostics for `path` and the other open files next to
    /// it, computed against `overlay`. Skipped when a newer edit has already
    /// been applied; that edit publishes its own.
    fn spawn_diagnostics(&self, session: Arc<Session>, path: PathBuf, overlay: OverlaySnapshot) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let mut targets = vec![path.clone()];
            if let Some(dir) = path.parent() {
                targets.extend(
                    overlay
                        .files_in(dir)
                        .filter(|sibling| *sibling != path)
                        .map(Path::to_path_buf),
                );
            }

            for target in targets {
                let Some(open) = overlay.get(&target) else {
                    continue;
                };
                let version = open.version;
                let result = session
                    .dispatcher
                    .dispatch(|token| {
                        let overlay = overlay.clone();
                        let target = target.clone();
                        let session = Arc::clone(&session);
                        async move {
                            session
                                .workspace
                                .diagnostics(&overlay, &target, &token)
                                .await
                        }
                    })
                    .await;

                let diagnostics = match result {
                    Ok(diagnostics) => diagnostics,
                    Err(EngineError::Cancelled) => return,
                    Err(e) => {
                        warn!(path = %target.display(), "Failed to compute diagnostics: {}", e);
                        continue;
                    }
                };
                if session.workspace.snapshot().revision() != overlay.revision() {
                    debug!(path = %target.display(), "Skipping stale diagnostics");
                    return;
                }
                let Ok(uri) = Url::from_file_path(&target) else {
                    continue;
                };
                client
                    .publish_diagnostics(
                        uri,
                        diagnostics.iter().map(to_lsp_diagnostic).collect(),
                        Some(version),
                    )
                    .await;
            }
        });
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        self.client
            .log_message(MessageType::INFO, "LSP server initializing")
            .await;

        let config = self.engine_config(&params);
        info!(root = %config.root.display(), "Initializing workspace");
        let session = Session {
            dispatcher: Dispatcher::new(config.request_timeout),
            workspace: Workspace::new(&config),
        };
        *self.session.write() = Some(Arc::new(session));

        Ok(InitializeResult {
            capabilities: Self::server_capabilities(),
            server_info: Some(ServerInfo {
                name: "go-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "LSP server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.client
            .log_message(MessageType::INFO, "LSP server shutting down")
            .await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Some((session, path)) = self.document(&params.text_document.uri) else {
            return;
        };
        let document = params.text_document;
        let overlay = session.dispatcher.apply(|| {
            session
                .workspace
                .did_open(path.clone(), document.text, document.version);
            session.workspace.snapshot()
        });
        self.spawn_diagnostics(session, path, overlay);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some((session, path)) = self.document(&params.text_document.uri) else {
            return;
        };
        // Full sync: the last change carries the whole document.
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        let version = params.text_document.version;
        let overlay = session.dispatcher.apply(|| {
            session
                .workspace
                .did_change(path.clone(), change.text, version);
            session.workspace.snapshot()
        });
        self.spawn_diagnostics(session, path, overlay);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        let Some((session, path)) = self.document(&uri) else {
            return;
        };
        let overlay = session.dispatcher.apply(|| {
            session.workspace.did_close(&path);
            session.workspace.snapshot()
        });
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
        self.spawn_diagnostics(session, path, overlay);
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params;
        let (session, path) = self.request_target(&position.text_document.uri)?;
        let overlay = session.workspace.snapshot();
        let at = to_source_position(position.position);

        let result = session
            .dispatcher
            .dispatch(|token| {
                let session = Arc::clone(&session);
                async move {
                    session
                        .workspace
                        .hover(&overlay, &path, at, &token)
                        .await
                }
            })
            .await
            .map_err(to_rpc_error)?;

        Ok(result.map(to_lsp_hover))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params;
        let (session, path) = self.request_target(&position.text_document.uri)?;
        let overlay = session.workspace.snapshot();
        let at = to_source_position(position.position);

        let location = session
            .dispatcher
            .dispatch(|token| {
                let session = Arc::clone(&session);
                async move {
                    session
                        .workspace
                        .definition(&overlay, &path, at, &token)
                        .await
                }
            })
            .await
            .map_err(to_rpc_error)?;

        Ok(location.and_then(|location| {
            let uri = Url::from_file_path(&location.path).ok()?;
            Some(GotoDefinitionResponse::Scalar(Location::new(
                uri,
                to_lsp_range(location.range),
            )))
        }))
    }
}

impl Backend {
    /// Session and path for a document notification. Non-Go documents and
    /// notifications before `initialize` are ignored.
    fn document(&self, uri: &Url) -> Option<(Arc<Session>, PathBuf)> {
        let Some(session) = self.session() else {
            warn!(%uri, "Notification before initialize ignored");
            return None;
        };
        let path = uri.to_file_path().ok()?;
        if !syntax::is_go_file(&path) {
            debug!(%uri, "Ignoring non-Go document");
            return None;
        }
        Some((session, path))
    }

    fn request_target(&self, uri: &Url) -> Result<(Arc<Session>, PathBuf)> {
        let session = self.session().ok_or_else(|| {
            error!(%uri, "Request before initialize");
            jsonrpc::Error::invalid_request()
        })?;
        let path = uri
            .to_file_path()
            .map_err(|_| jsonrpc::Error::invalid_params(format!("not a file URI: {}", uri)))?;
        Ok((session, path))
    }
}

fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    #[allow(deprecated)]
    let root_uri = params.root_uri.as_ref();
    root_uri
        .and_then(|uri| uri.to_file_path().ok())
        .or_else(|| {
            params
                .workspace_folders
                .as_ref()?
                .iter()
                .find_map(|folder| folder.uri.to_file_path().ok())
        })
}

fn to_source_position(position: Position) -> SourcePosition {
    SourcePosition::new(position.line, position.character)
}

fn to_lsp_range(range: SourceRange) -> Range {
    Range::new(
        Position::new(range.start.line, range.start.column),
        Position::new(range.end.line, range.end.column),
    )
}

fn to_lsp_hover(result: HoverResult) -> Hover {
    let contents = result
        .fragments
        .into_iter()
        .map(|fragment| match fragment {
            HoverFragment::Code(value) => MarkedString::LanguageString(LanguageString {
                language: "go".to_string(),
                value,
            }),
            HoverFragment::Text(value) => MarkedString::String(value),
        })
        .collect();
    Hover {
        contents: HoverContents::Array(contents),
        range: Some(to_lsp_range(result.range)),
    }
}

fn to_lsp_diagnostic(diagnostic: &types::Diagnostic) -> Diagnostic {
    Diagnostic {
        range: to_lsp_range(diagnostic.range),
        severity: Some(match diagnostic.severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
        }),
        source: Some("go-lsp".to_string()),
        message: diagnostic.message.clone(),
        ..Default::default()
    }
}

fn to_rpc_error(err: EngineError) -> jsonrpc::Error {
    match err {
        EngineError::Cancelled => jsonrpc::Error {
            code: ErrorCode::RequestCancelled,
            message: "request cancelled".into(),
            data: None,
        },
        EngineError::Position(e) => jsonrpc::Error::invalid_params(e.to_string()),
        other => {
            warn!("Request failed: {}", other);
            jsonrpc::Error {
                code: ErrorCode::InternalError,
                message: other.to_string().into(),
                data: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::PositionError;

    #[test]
    fn cancellation_maps_to_request_cancelled() {
        assert_eq!(
            to_rpc_error(EngineError::Cancelled).code,
            ErrorCode::RequestCancelled
        );
        assert_eq!(
            to_rpc_error(EngineError::Position(PositionError::LineOutOfRange {
                line: 9,
                lines: 1
            }))
            .code,
            ErrorCode::InvalidParams
        );
    }

    #[test]
    fn hover_fragments_become_marked_strings() {
        let hover = to_lsp_hover(HoverResult {
            fragments: vec![
                HoverFragment::Code("func A()".to_string()),
                HoverFragment::Text("A does a. \n\n".to_string()),
            ],
            range: SourceRange {
                start: SourcePosition::new(0, 16),
                end: SourcePosition::new(0, 17),
            },
        });

        let HoverContents::Array(contents) = hover.contents else {
            panic!("expected array contents");
        };
        assert_eq!(
            contents,
            vec![
                MarkedString::LanguageString(LanguageString {
                    language: "go".to_string(),
                    value: "func A()".to_string(),
                }),
                MarkedString::String("A does a. \n\n".to_string()),
            ]
        );
        assert_eq!(
            hover.range,
            Some(Range::new(Position::new(0, 16), Position::new(0, 17)))
        );
    }

    #[test]
    fn workspace_root_prefers_root_uri_over_folders() {
        #[allow(deprecated)]
        let params = InitializeParams {
            root_uri: Some(Url::parse("file:///ws/root").unwrap()),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: Url::parse("file:///ws/folder").unwrap(),
                name: "folder".to_string(),
            }]),
            ..Default::default()
        };
        assert_eq!(workspace_root(&params), Some(PathBuf::from("/ws/root")));

        let params = InitializeParams {
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: Url::parse("file:///ws/folder").unwrap(),
                name: "folder".to_string(),
            }]),
            ..Default::default()
        };
        assert_eq!(workspace_root(&params), Some(PathBuf::from("/ws/folder")));
    }
}
