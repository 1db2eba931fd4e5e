//! Error type for swiftgraph-service.
//!
//! Wraps `CoreError`/`StorageError` and adds the caller-facing kinds
//! `spec.md` §7 lists that don't originate lower down: `NotFound` and
//! `FilterMismatch` already exist in `StorageError` and pass through
//! unwrapped; `Git` covers branch-determination failures (non-fatal for a
//! query — treated as "no overlay" — fatal for the feature indexer).

use std::fmt;
use thiserror::Error;

use swiftgraph_core::CoreError;
use swiftgraph_storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Core,
    Storage,
    /// The current branch, a worktree, or a commit range could not be
    /// determined from the configured `GitSource`.
    Git,
    NotFound,
    FilterMismatch,
    /// Config values that don't type-check against the repo on disk
    /// (e.g. `repo_path` doesn't exist).
    Config,
    /// Feature-db file removal during a reset (`spec.md` §4.9).
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Core => "core",
            ErrorKind::Storage => "storage",
            ErrorKind::Git => "git",
            ErrorKind::NotFound => "not_found",
            ErrorKind::FilterMismatch => "filter_mismatch",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct ServiceError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ServiceError {
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

    pub fn git(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Git, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::new(ErrorKind::Io, err.to_string()).with_source(err)
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        ServiceError::new(ErrorKind::Core, err.to_string()).with_source(err)
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        let kind = match err.kind {
            swiftgraph_storage::ErrorKind::NotFound => ErrorKind::NotFound,
            swiftgraph_storage::ErrorKind::FilterMismatch => ErrorKind::FilterMismatch,
            _ => ErrorKind::Storage,
        };
        ServiceError::new(kind, err.to_string()).with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_maps_to_service_not_found() {
        let storage_err = StorageError::not_found("Ghost");
        let err: ServiceError = storage_err.into();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn storage_filter_mismatch_maps_through() {
        let storage_err = StorageError::filter_mismatch("PresenterTests", "app");
        let err: ServiceError = storage_err.into();
        assert_eq!(err.kind, ErrorKind::FilterMismatch);
    }

    #[test]
    fn git_error_constructor() {
        let err = ServiceError::git("could not resolve HEAD");
        assert_eq!(err.kind, ErrorKind::Git);
    }
}
