use tower_lsp::{LspService, Server};
use tracing::info;

use crate::config::ServerDefaults;
use crate::log::init;
use crate::lsp::backend::Backend;

pub async fn run_server(defaults: ServerDefaults) -> anyhow::Result<()> {
    let _log_guard = init()?;

    info!(goroot = ?defaults.goroot, "Starting go-lsp server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(move |client| Backend::new(client, defaults));
    Server::new(stdin, stdout, socket).serve(service).await;

    info!("go-lsp server stopped");
    Ok(())
}
