//! `IndexerService`: the initial/incremental master-branch indexer
//! (`spec.md` §4.8).
//!
//! Ported from `original_source/indexer/service.py::IndexerService`. One
//! `SwiftParser` (and its `TypeRegistry`) is built once per service and
//! reused across every `initialize`/`update` call, so later files benefit
//! from types the earlier ones already registered, exactly as the
//! original's one-`ParserRegistry`-per-service lifetime does.

use std::path::Path;

use swiftgraph_core::{ModuleResolver, SwiftParser};
use swiftgraph_storage::Repository;

use crate::error::Result;
use crate::git::{CommitInfo, GitSource};
use crate::settings::Settings;

pub struct IndexerService<G: GitSource> {
    settings: Settings,
    git: G,
    parser: SwiftParser,
}

impl<G: GitSource> IndexerService<G> {
    pub fn new(settings: Settings, git: G) -> Result<Self> {
        let resolver = ModuleResolver::from_project_root(&settings.repo_path)?;
        let parser = SwiftParser::with_resolver(resolver)?;
        Ok(Self { settings, git, parser })
    }

    /// Index every tracked `.swift` file at `default_branch`'s tip as a
    /// single commit row. Returns the indexed commit hash.
    pub fn initialize(&mut self) -> Result<String> {
        let head = self.git.head_commit(&self.settings.default_branch)?;
        let tracked = self.git.tracked_files()?;
        tracing::info!(branch = %self.settings.default_branch, commit = %head.hash, files = tracked.len(), "initializing master index");

        let mut repo = Repository::open(&self.settings.db_path)?;
        let commit_id = repo.record_commit(&head.hash, head.parent_hash.as_deref(), &self.settings.default_branch, true)?;

        for rel_path in &tracked {
            let Some(content) = self.git.file_content_at(&head, Path::new(rel_path))? else {
                continue;
            };
            self.index_file(&mut repo, commit_id, rel_path, &content)?;
        }
        repo.rebuild_latest_tables()?;
        Ok(head.hash)
    }

    /// Process every commit after the store's last-recorded master commit,
    /// oldest first. Returns the processed commit hashes, in order.
    pub fn update(&mut self) -> Result<Vec<String>> {
        let mut repo = Repository::open(&self.settings.db_path)?;
        let last_hash = repo.latest_master_commit()?;
        let commits = self.git.commits_since(last_hash.as_deref(), &self.settings.default_branch)?;
        if commits.is_empty() {
            return Ok(Vec::new());
        }

        let mut processed = Vec::with_capacity(commits.len());
        for commit in &commits {
            let commit_id = repo.record_commit(&commit.hash, commit.parent_hash.as_deref(), &self.settings.default_branch, true)?;
            self.index_commit(&mut repo, commit, commit_id)?;
            processed.push(commit.hash.clone());
        }
        repo.rebuild_latest_tables()?;
        Ok(processed)
    }

    fn index_commit(&mut self, repo: &mut Repository, commit: &CommitInfo, commit_id: i64) -> Result<()> {
        for rel_path in self.git.changed_files(commit)? {
            match self.git.file_content_at(commit, Path::new(&rel_path))? {
                Some(content) => self.index_file(repo, commit_id, &rel_path, &content)?,
                None => {
                    tracing::debug!(file = %rel_path, commit = %commit.hash, "file deleted, tombstoning");
                    repo.mark_entities_deleted_for_file(&rel_path, commit_id)?;
                }
            }
        }
        Ok(())
    }

    fn index_file(&mut self, repo: &mut Repository, commit_id: i64, rel_path: &str, content: &str) -> Result<()> {
        let parsed = match self.parser.parse(content, Path::new(rel_path)) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(file = rel_path, error = %err, "skipping file that failed to parse");
                return Ok(());
            }
        };
        let entity_ids = repo.persist_entities(commit_id, &parsed.entities)?;
        repo.persist_extensions(commit_id, &parsed.extensions)?;
        repo.persist_relationships(commit_id, &entity_ids, &parsed.relationships)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::InMemoryGitSource;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        Settings::new(dir.path(), dir.path().join("graph.db"))
    }

    #[test]
    fn initialize_indexes_every_tracked_file_as_one_commit() {
        let dir = TempDir::new().unwrap();
        let mut git = InMemoryGitSource::new();
        let mut changes = HashMap::new();
        changes.insert("Presenter.swift".to_string(), Some("class Presenter {}".to_string()));
        git.push_commit("master", "c1", changes);
        git.set_tracked_files(vec!["Presenter.swift".to_string()]);

        let mut indexer = IndexerService::new(settings(&dir), git).unwrap();
        let head_hash = indexer.initialize().unwrap();
        assert_eq!(head_hash, "c1");

        let repo = Repository::open(dir.path().join("graph.db")).unwrap();
        assert_eq!(repo.latest_master_commit().unwrap(), Some("c1".to_string()));
        let results = swiftgraph_storage::search::find_entities(repo.connection(), "Presenter", None, 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn update_with_no_new_commits_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut git = InMemoryGitSource::new();
        git.push_commit("master", "c1", HashMap::new());
        git.set_tracked_files(vec![]);

        let mut indexer = IndexerService::new(settings(&dir), git).unwrap();
        indexer.initialize().unwrap();
        let processed = indexer.update().unwrap();
        assert!(processed.is_empty());
    }

    #[test]
    fn update_tombstones_deleted_files() {
        let dir = TempDir::new().unwrap();
        let mut git = InMemoryGitSource::new();
        let mut initial = HashMap::new();
        initial.insert("Presenter.swift".to_string(), Some("class Presenter {}".to_string()));
        git.push_commit("master", "c1", initial);
        git.set_tracked_files(vec!["Presenter.swift".to_string()]);

        let mut indexer = IndexerService::new(settings(&dir), git.clone()).unwrap();
        indexer.initialize().unwrap();

        let mut deletion = HashMap::new();
        deletion.insert("Presenter.swift".to_string(), None);
        git.push_commit("master", "c2", deletion);

        let mut indexer = IndexerService::new(settings(&dir), git).unwrap();
        let processed = indexer.update().unwrap();
        assert_eq!(processed, vec!["c2".to_string()]);

        let repo = Repository::open(dir.path().join("graph.db")).unwrap();
        let results = swiftgraph_storage::search::find_entities(repo.connection(), "Presenter", None, 10).unwrap();
        assert!(results.is_empty());
    }
}
