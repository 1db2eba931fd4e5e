//! `Settings`: the fully-populated configuration value the service layer
//! is constructed from (`spec.md` §6, `SPEC_FULL.md` §B "Configuration").
//!
//! Ported from `original_source/config.py::Settings`/`ParserOptions`. No
//! env var reads or network clients happen anywhere in this crate — the
//! caller (a CLI, a test harness) is responsible for producing a
//! `Settings` value however it likes.

use std::path::PathBuf;

/// Which manifest dialect the module resolver should expect.
///
/// Both variants resolve identically today: `original_source`'s
/// `GekoDependenciesWorker` is a bare subclass of
/// `TuistDependenciesWorker` with no behavioral override. Kept as an enum
/// so the config surface can name the dialect even though the resolver
/// logic doesn't currently branch on it (`SPEC_FULL.md` §E.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectSystem {
    Tuist,
    Geko,
}

impl ProjectSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectSystem::Tuist => "tuist",
            ProjectSystem::Geko => "geko",
        }
    }
}

/// Swift-parser tuning knobs threaded down to `swiftgraph_core::SwiftParser`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
    /// File globs excluded from indexing regardless of `languages`
    /// (build artifacts, generated code, `Pods/`, `.build/`).
    pub exclude_globs: Vec<String>,
    /// Whether `*Tests.swift` / `*UITests.swift` files are indexed with
    /// `target_type = "test"` or skipped outright.
    pub index_tests: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            exclude_globs: vec!["**/Pods/**".to_string(), "**/.build/**".to_string(), "**/DerivedData/**".to_string()],
            index_tests: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Root of the checked-out monorepo worktree to index.
    pub repo_path: PathBuf,
    /// Path to the master SQLite store.
    pub db_path: PathBuf,
    /// Path to the on-demand feature-branch SQLite store
    /// (`spec.md` §4.9); `None` disables feature-branch overlay entirely.
    pub feature_db_path: Option<PathBuf>,
    /// The branch master indexing tracks and queries fall back to.
    pub default_branch: String,
    /// Source languages indexed; only `"swift"` has a frontend today.
    pub languages: Vec<String>,
    pub project_system: ProjectSystem,
    pub parser_options: ParserOptions,
    /// Seconds a `GraphCache` entry stays valid before being treated as
    /// stale regardless of commit-hash match (`spec.md` §9 `GraphCache`).
    pub cache_ttl_seconds: u64,
}

impl Settings {
    pub fn new(repo_path: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            db_path: db_path.into(),
            feature_db_path: None,
            default_branch: "master".to_string(),
            languages: vec!["swift".to_string()],
            project_system: ProjectSystem::Tuist,
            parser_options: ParserOptions::default(),
            cache_ttl_seconds: 300,
        }
    }

    pub fn with_feature_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.feature_db_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_settings_default_to_swift_and_master() {
        let settings = Settings::new("/repo", "/repo/.swiftgraph/graph.db");
        assert_eq!(settings.default_branch, "master");
        assert_eq!(settings.languages, vec!["swift".to_string()]);
        assert!(settings.feature_db_path.is_none());
    }

    #[test]
    fn with_feature_db_path_sets_optional_field() {
        let settings = Settings::new("/repo", "/repo/.swiftgraph/graph.db").with_feature_db_path("/repo/.swiftgraph/feature.db");
        assert_eq!(settings.feature_db_path, Some(PathBuf::from("/repo/.swiftgraph/feature.db")));
    }

    #[test]
    fn both_project_systems_report_distinct_names() {
        assert_eq!(ProjectSystem::Tuist.as_str(), "tuist");
        assert_eq!(ProjectSystem::Geko.as_str(), "geko");
    }
}
