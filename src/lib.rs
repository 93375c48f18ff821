pub mod build;
pub mod config;
pub mod hover;
pub mod loader;
pub mod log;
pub mod lsp;
pub mod syntax;
pub mod types;
pub mod workspace;
