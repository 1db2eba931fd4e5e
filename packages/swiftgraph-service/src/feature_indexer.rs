//! `FeatureBranchIndexer`: the on-demand overlay indexer for the current
//! feature branch (`spec.md` §4.9).
//!
//! Ported from `original_source/indexer/feature_service.py::FeatureBranchIndexer`.
//! One deliberate deviation from that sample: `_index_branch_commits` there
//! calls `store.persist_entities` but never `store.persist_relationships`,
//! which would silently drop every edge a feature branch introduces.
//! `spec.md` §4.9 says to "process anchor..HEAD like the master indexer,"
//! and the master indexer does persist relationships, so this
//! implementation does too (see `DESIGN.md`).

use std::path::{Path, PathBuf};

use swiftgraph_core::{ModuleResolver, SwiftParser};
use swiftgraph_storage::Repository;

use crate::error::{Result, ServiceError};
use crate::git::{FileChangeStatus, GitSource};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureUpdateResult {
    pub branch: Option<String>,
    pub commits: Vec<String>,
    pub worktree_files: Vec<String>,
    pub skipped_reason: Option<String>,
}

impl FeatureUpdateResult {
    pub fn skipped(&self) -> bool {
        self.skipped_reason.is_some()
    }

    fn skip(branch: Option<String>, reason: &str) -> Self {
        Self {
            branch,
            commits: Vec::new(),
            worktree_files: Vec::new(),
            skipped_reason: Some(reason.to_string()),
        }
    }
}

pub struct FeatureBranchIndexer<G: GitSource> {
    settings: Settings,
    feature_db_path: PathBuf,
    git: G,
    parser: SwiftParser,
}

impl<G: GitSource> FeatureBranchIndexer<G> {
    pub fn new(settings: Settings, git: G) -> Result<Self> {
        let feature_db_path = settings
            .feature_db_path
            .clone()
            .ok_or_else(|| ServiceError::config("feature_db_path is not configured"))?;
        let resolver = ModuleResolver::from_project_root(&settings.repo_path)?;
        let parser = SwiftParser::with_resolver(resolver)?;
        Ok(Self { settings, feature_db_path, git, parser })
    }

    pub fn update(&mut self) -> Result<FeatureUpdateResult> {
        let Some(branch) = self.git.current_branch()? else {
            return Ok(FeatureUpdateResult::skip(None, "detached HEAD"));
        };
        if branch == self.settings.default_branch {
            return Ok(FeatureUpdateResult::skip(Some(branch), "on default branch"));
        }

        if self.tracked_branch_conflicts(&branch)? {
            tracing::info!(branch = %branch, "feature db tracks a different branch, resetting");
            reset_feature_db(&self.feature_db_path)?;
        }

        let mut repo = Repository::open(&self.feature_db_path)?;
        repo.set_feature_branch(&branch)?;
        let commits = self.index_branch_commits(&mut repo, &branch)?;
        let worktree_files = self.index_worktree(&mut repo, &branch)?;
        repo.rebuild_latest_tables()?;

        Ok(FeatureUpdateResult {
            branch: Some(branch),
            commits,
            worktree_files,
            skipped_reason: None,
        })
    }

    fn index_branch_commits(&mut self, repo: &mut Repository, branch: &str) -> Result<Vec<String>> {
        let anchor = match repo.latest_real_commit_for_branch(branch)? {
            Some(hash) => Some(hash),
            None => self.git.merge_base(branch, &self.settings.default_branch)?,
        };
        let commits = self.git.commits_since(anchor.as_deref(), branch)?;
        let mut processed = Vec::with_capacity(commits.len());
        for commit in &commits {
            let commit_id = repo.record_commit(&commit.hash, commit.parent_hash.as_deref(), branch, false)?;
            for rel_path in self.git.changed_files(commit)? {
                match self.git.file_content_at(commit, Path::new(&rel_path))? {
                    Some(content) => self.index_file(repo, commit_id, &rel_path, &content)?,
                    None => repo.mark_entities_deleted_for_file(&rel_path, commit_id)?,
                }
            }
            processed.push(commit.hash.clone());
        }
        Ok(processed)
    }

    fn index_worktree(&mut self, repo: &mut Repository, branch: &str) -> Result<Vec<String>> {
        let changes = self.git.worktree_changes()?;
        let worktree_hash = format!("worktree:{branch}");
        repo.delete_commit_by_hash(&worktree_hash)?;
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let parent_hash = self.git.head_commit(branch).ok().map(|c| c.hash);
        let commit_id = repo.record_commit(&worktree_hash, parent_hash.as_deref(), branch, false)?;

        let mut touched: Vec<String> = changes.keys().cloned().collect();
        touched.sort();
        for rel_path in &touched {
            match changes[rel_path] {
                FileChangeStatus::Deleted => repo.mark_entities_deleted_for_file(rel_path, commit_id)?,
                FileChangeStatus::Modified | FileChangeStatus::Untracked => {
                    let Some(content) = self.git.worktree_file_content(Path::new(rel_path))? else {
                        continue;
                    };
                    self.index_file(repo, commit_id, rel_path, &content)?;
                }
            }
        }
        Ok(touched)
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

    fn tracked_branch_conflicts(&self, branch: &str) -> Result<bool> {
        if !self.feature_db_path.exists() {
            return Ok(false);
        }
        let repo = Repository::open(&self.feature_db_path)?;
        Ok(match repo.feature_branch()? {
            Some(tracked) => tracked != branch,
            None => false,
        })
    }
}

fn reset_feature_db(feature_db_path: &Path) -> Result<()> {
    if feature_db_path.exists() {
        std::fs::remove_file(feature_db_path)?;
    }
    for suffix in ["-wal", "-shm"] {
        let sidecar = sidecar_path(feature_db_path, suffix);
        if sidecar.exists() {
            std::fs::remove_file(sidecar)?;
        }
    }
    Ok(())
}

fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    db_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::InMemoryGitSource;
    use std::collections::HashMap;
    use swiftgraph_storage::search::find_entities;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        Settings::new(dir.path(), dir.path().join("master.db")).with_feature_db_path(dir.path().join("feature.db"))
    }

    #[test]
    fn detached_head_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut git = InMemoryGitSource::new();
        git.set_current_branch(None);
        let mut indexer = FeatureBranchIndexer::new(settings(&dir), git).unwrap();
        let result = indexer.update().unwrap();
        assert!(result.skipped());
        assert_eq!(result.skipped_reason.as_deref(), Some("detached HEAD"));
    }

    #[test]
    fn default_branch_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut git = InMemoryGitSource::new();
        git.set_current_branch(Some("master"));
        let mut indexer = FeatureBranchIndexer::new(settings(&dir), git).unwrap();
        let result = indexer.update().unwrap();
        assert!(result.skipped());
        assert_eq!(result.skipped_reason.as_deref(), Some("on default branch"));
    }

    #[test]
    fn feature_branch_indexes_commits_and_relationships() {
        let dir = TempDir::new().unwrap();
        let mut git = InMemoryGitSource::new();
        git.set_current_branch(Some("feature/login"));
        let mut changes = HashMap::new();
        changes.insert("Login.swift".to_string(), Some("class Login {}".to_string()));
        git.push_commit("feature/login", "f1", changes);

        let mut indexer = FeatureBranchIndexer::new(settings(&dir), git).unwrap();
        let result = indexer.update().unwrap();
        assert!(!result.skipped());
        assert_eq!(result.branch, Some("feature/login".to_string()));
        assert_eq!(result.commits, vec!["f1".to_string()]);

        let repo = Repository::open(dir.path().join("feature.db")).unwrap();
        assert_eq!(repo.feature_branch().unwrap(), Some("feature/login".to_string()));
        let results = find_entities(repo.connection(), "Login", None, 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn branch_switch_resets_feature_db() {
        let dir = TempDir::new().unwrap();
        let mut git = InMemoryGitSource::new();
        git.set_current_branch(Some("feature/a"));
        let mut changes = HashMap::new();
        changes.insert("A.swift".to_string(), Some("class A {}".to_string()));
        git.push_commit("feature/a", "a1", changes);
        let mut indexer = FeatureBranchIndexer::new(settings(&dir), git.clone()).unwrap();
        indexer.update().unwrap();

        let mut other_git = git.clone();
        other_git.set_current_branch(Some("feature/b"));
        let mut changes = HashMap::new();
        changes.insert("B.swift".to_string(), Some("class B {}".to_string()));
        other_git.push_commit("feature/b", "b1", changes);

        let mut indexer = FeatureBranchIndexer::new(settings(&dir), other_git).unwrap();
        let result = indexer.update().unwrap();
        assert_eq!(result.branch, Some("feature/b".to_string()));

        let repo = Repository::open(dir.path().join("feature.db")).unwrap();
        assert!(find_entities(repo.connection(), "A", None, 10).unwrap().is_empty());
        assert_eq!(find_entities(repo.connection(), "B", None, 10).unwrap().len(), 1);
    }

    #[test]
    fn worktree_changes_recorded_under_a_pseudo_commit() {
        let dir = TempDir::new().unwrap();
        let mut git = InMemoryGitSource::new();
        git.set_current_branch(Some("feature/wip"));
        git.set_worktree_change("Draft.swift", FileChangeStatus::Untracked, Some("class Draft {}"));

        let mut indexer = FeatureBranchIndexer::new(settings(&dir), git).unwrap();
        let result = indexer.update().unwrap();
        assert_eq!(result.worktree_files, vec!["Draft.swift".to_string()]);

        let repo = Repository::open(dir.path().join("feature.db")).unwrap();
        assert_eq!(find_entities(repo.connection(), "Draft", None, 10).unwrap().len(), 1);
    }
}
