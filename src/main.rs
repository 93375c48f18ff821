use std::path::PathBuf;

use clap::Parser;

use go_lsp::config::ServerDefaults;
use go_lsp::lsp::server::run_server;

#[derive(Parser)]
#[command(name = "go-lsp")]
#[command(version, about = "Language server answering hover and definition queries for Go")]
struct Cli {
    /// Go installation used to resolve standard library imports (defaults to $GOROOT)
    #[arg(long, value_name = "DIR")]
    goroot: Option<PathBuf>,

    /// Import path of the workspace root when it has no go.mod
    #[arg(long, value_name = "PATH")]
    root_import_path: Option<String>,

    /// Communicate over stdio (the only supported transport)
    #[arg(long, hide = true)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_server(ServerDefaults::new(cli.goroot, cli.root_import_path)).await
}
