//! Error type for swiftgraph-core.

use std::fmt;
use thiserror::Error;

/// Core error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A `.swift` file failed to tokenize. Non-fatal to an indexing pass:
    /// the file is skipped and its previously-indexed entities are left alone.
    Parse,
    /// A project manifest (`Project.swift`) could not be parsed or located.
    Manifest,
    /// A tree-sitter grammar failed to load.
    Grammar,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Manifest => "manifest",
            ErrorKind::Grammar => "grammar",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Core error type.
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct CoreError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Manifest, message)
    }

    pub fn grammar(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Grammar, message)
    }
}

impl From<tree_sitter::LanguageError> for CoreError {
    fn from(err: tree_sitter::LanguageError) -> Self {
        CoreError::grammar(format!("tree-sitter language error: {}", err)).with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = CoreError::parse("unexpected token");
        assert_eq!(format!("{}", err), "[parse] unexpected token");
    }

    #[test]
    fn with_source_preserves_message() {
        use std::io;
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err = CoreError::manifest("could not read Project.swift").with_source(io_err);
        assert_eq!(err.kind, ErrorKind::Manifest);
        assert!(err.source.is_some());
    }
}
