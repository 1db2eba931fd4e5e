//! swiftgraph-service: the branch-aware façade tying indexing and querying
//! together (`spec.md` §4.8, §4.9, §9).
//!
//! - `settings`: `Settings`/`ProjectSystem`/`ParserOptions` — the ambient
//!   configuration layer (`SPEC_FULL.md` §B).
//! - `git`: `GitSource` — the abstraction over the repository reads the
//!   indexers need, plus an in-memory test double.
//! - `indexer`: `IndexerService` — initial/incremental indexing of the
//!   default branch.
//! - `feature_indexer`: `FeatureBranchIndexer` — on-demand overlay indexing
//!   of the current feature branch.
//! - `query_service`: `QueryService` — the branch-aware read façade.
//! - `cache`: `GraphCache` — per-instance graph payload cache.
//! - `error`: `ServiceError`.
//!
//! This crate and everything beneath it (`swiftgraph-core`,
//! `swiftgraph-storage`) is synchronous; no async runtime is pulled in
//! (`SPEC_FULL.md` §D).

pub mod cache;
pub mod error;
pub mod feature_indexer;
pub mod git;
pub mod indexer;
pub mod query_service;
pub mod settings;

pub use cache::{CacheStats, GraphCache};
pub use error::{ErrorKind, Result, ServiceError};
pub use feature_indexer::{FeatureBranchIndexer, FeatureUpdateResult};
pub use git::{CommitInfo, FileChangeStatus, GitSource, InMemoryGitSource};
pub use indexer::IndexerService;
pub use query_service::{GraphRequest, QueryService};
pub use settings::{ParserOptions, ProjectSystem, Settings};
