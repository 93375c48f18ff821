//! Syntax layer
//! - position.rs: protocol position <-> byte offset translation
//! - clause.rs: cheap package clause scanning used by the build context

pub mod clause;
pub mod position;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;
use tree_sitter::{Node, Tree};

use crate::workspace::overlay::Stamp;
pub use position::{LineIndex, Position, PositionError, Range};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    #[error("Parse failed: {0}")]
    ParseFailed(String),
}

/// A syntax error found while parsing, as a byte range plus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub start: usize,
    pub end: usize,
    pub message: String,
}

/// One parsed Go source file.
pub struct ParsedFile {
    pub path: PathBuf,
    pub text: Arc<str>,
    pub stamp: Stamp,
    pub lines: LineIndex,
    tree: Tree,
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("path", &self.path)
            .field("stamp", &self.stamp)
            .finish_non_exhaustive()
    }
}

impl ParsedFile {
    pub fn parse(path: PathBuf, text: Arc<str>, stamp: Stamp) -> Result<Self, ParseError> {
        let mut parser = tree_sitter::Parser::new();
        let language = tree_sitter_go::LANGUAGE;
        parser.set_language(&language.into()).map_err(|e| {
            warn!("Failed to set Go language for tree-sitter: {}", e);
            ParseError::TreeSitter(e.to_string())
        })?;

        let tree = parser.parse(text.as_bytes(), None).ok_or_else(|| {
            warn!("Failed to parse {:?}", path);
            ParseError::ParseFailed(format!("Failed to parse {}", path.display()))
        })?;

        Ok(Self {
            lines: LineIndex::new(Arc::clone(&text)),
            path,
            text,
            stamp,
            tree,
        })
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text_of(&self, node: Node<'_>) -> &str {
        &self.text[node.byte_range()]
    }

    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }

    pub fn is_test_file(&self) -> bool {
        is_test_file(&self.path)
    }

    /// Collects `ERROR` and `MISSING` nodes.
    pub fn syntax_errors(&self) -> Vec<SyntaxError> {
        let mut errors = Vec::new();
        if self.root().has_error() {
            self.collect_errors(self.root(), &mut errors);
        }
        errors
    }

    fn collect_errors(&self, node: Node<'_>, errors: &mut Vec<SyntaxError>) {
        if node.is_missing() {
            errors.push(SyntaxError {
                start: node.start_byte(),
                end: node.end_byte(),
                message: format!("syntax error: missing {}", node.kind()),
            });
            return;
        }
        if node.is_error() {
            let snippet: String = self.text_of(node).chars().take(32).collect();
            errors.push(SyntaxError {
                start: node.start_byte(),
                end: node.end_byte(),
                message: format!("syntax error: unexpected {}", snippet.trim()),
            });
            return;
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.has_error() {
                self.collect_errors(child, errors);
            }
        }
    }
}

pub fn file_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
}

/// True for `*_test.go` files.
pub fn is_test_file(path: &Path) -> bool {
    file_name(path).ends_with("_test.go")
}

/// True for `*.go` files.
pub fn is_go_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "go")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedFile {
        ParsedFile::parse(PathBuf::from("/ws/a.go"), Arc::from(text), Stamp::Immutable).unwrap()
    }

    #[test]
    fn parse_produces_source_file_root() {
        let file = parse("package p; func A() { A() }");
        assert_eq!(file.root().kind(), "source_file");
        assert!(file.syntax_errors().is_empty());
    }

    #[test]
    fn syntax_errors_are_reported_not_raised() {
        let file = parse("package p\n\nfunc A( {\n");
        assert!(!file.syntax_errors().is_empty());
    }

    #[test]
    fn test_files_are_detected_by_suffix() {
        assert!(is_test_file(Path::new("/ws/a_test.go")));
        assert!(!is_test_file(Path::new("/ws/test.go")));
        assert!(is_go_file(Path::new("/ws/test.go")));
        assert!(!is_go_file(Path::new("/ws/go.mod")));
    }
}
