// LSP protocol layer
// - server.rs: stdio server setup
// - backend.rs: LanguageServer trait implementation
// - dispatcher.rs: request lifecycle, cancellation and deadlines

pub mod backend;
pub mod dispatcher;
pub mod server;
