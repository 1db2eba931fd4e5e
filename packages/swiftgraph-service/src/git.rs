//! `GitSource`: the git-read interface the indexers are driven through.
//!
//! `spec.md` places reading a real git-worktree out of scope; this trait is
//! the seam that boundary sits at, grounded on the call shapes
//! `original_source/indexer/git_utils.py` actually needs (`open_repo`,
//! `get_branch_head`, `commits_since`, `changed_swift_files`,
//! `file_content_at_commit`), plus the worktree-scanning calls
//! `original_source/indexer/feature_service.py::_collect_worktree_changes`/
//! `_read_worktree_content` make directly against `self.repo`/the
//! filesystem. An in-memory test double lives alongside it for unit tests;
//! a real implementation (shelling out to `git` or linking `git2`) is
//! someone else's crate.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ErrorKind, Result, ServiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub parent_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeStatus {
    Modified,
    Deleted,
    Untracked,
}

/// Everything the indexer layer needs from a git checkout. Implementors
/// read whatever underlying VCS state they like; this crate only consumes
/// the trait.
pub trait GitSource {
    /// The tip commit of `branch`. Errors (rather than returning `Option`)
    /// because master indexing cannot proceed without it
    /// (`original_source::get_branch_head` raises `ValueError`).
    fn head_commit(&self, branch: &str) -> Result<CommitInfo>;

    /// `None` on detached HEAD, mirroring
    /// `original_source::_current_branch`'s swallowed `TypeError`.
    fn current_branch(&self) -> Result<Option<String>>;

    /// Commits strictly after `since` (exclusive) up to and including
    /// `branch`'s tip, oldest first. `since = None` means "from the root".
    fn commits_since(&self, since: Option<&str>, branch: &str) -> Result<Vec<CommitInfo>>;

    /// `.swift` paths that differ between `commit` and its first parent
    /// (or every tracked `.swift` blob, for a root commit), sorted.
    fn changed_files(&self, commit: &CommitInfo) -> Result<Vec<String>>;

    /// File content at `commit`, or `None` if the path didn't exist there
    /// (interpreted by callers as "this commit deleted the file").
    fn file_content_at(&self, commit: &CommitInfo, path: &Path) -> Result<Option<String>>;

    /// Every `.swift` path tracked at HEAD, for the initial full index.
    fn tracked_files(&self) -> Result<Vec<String>>;

    /// Uncommitted `.swift` changes in the working tree: modified/deleted
    /// tracked files plus untracked new files.
    fn worktree_changes(&self) -> Result<HashMap<String, FileChangeStatus>>;

    /// Current on-disk content of a worktree-relative path, or `None` if
    /// it no longer exists (race between diffing and reading).
    fn worktree_file_content(&self, path: &Path) -> Result<Option<String>>;

    /// The merge-base commit hash of `branch` and `base_branch`, or `None`
    /// if either ref is missing or they share no history.
    fn merge_base(&self, branch: &str, base_branch: &str) -> Result<Option<String>>;
}

/// An in-memory `GitSource` for tests: commits are recorded in the order
/// given, per branch, with a fixed file-content snapshot per commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGitSource {
    branches: HashMap<String, Vec<CommitInfo>>,
    /// commit hash -> (path -> Some(content) | None for a deletion)
    commit_files: HashMap<String, HashMap<String, Option<String>>>,
    current_branch: Option<String>,
    tracked_files: Vec<String>,
    worktree_changes: HashMap<String, FileChangeStatus>,
    worktree_files: HashMap<String, String>,
    merge_bases: HashMap<(String, String), String>,
}

impl InMemoryGitSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a commit to `branch`'s history with the given per-file
    /// changes (`None` means the commit deletes that path).
    pub fn push_commit(&mut self, branch: &str, hash: &str, changes: HashMap<String, Option<String>>) {
        let parent_hash = self.branches.get(branch).and_then(|c| c.last()).map(|c| c.hash.clone());
        self.branches.entry(branch.to_string()).or_default().push(CommitInfo {
            hash: hash.to_string(),
            parent_hash,
        });
        self.commit_files.insert(hash.to_string(), changes);
    }

    pub fn set_current_branch(&mut self, branch: Option<&str>) {
        self.current_branch = branch.map(str::to_string);
    }

    pub fn set_tracked_files(&mut self, files: Vec<String>) {
        self.tracked_files = files;
    }

    pub fn set_worktree_change(&mut self, path: &str, status: FileChangeStatus, content: Option<&str>) {
        self.worktree_changes.insert(path.to_string(), status);
        if let Some(content) = content {
            self.worktree_files.insert(path.to_string(), content.to_string());
        }
    }

    pub fn set_merge_base(&mut self, branch: &str, base_branch: &str, hash: &str) {
        self.merge_bases.insert((branch.to_string(), base_branch.to_string()), hash.to_string());
    }
}

impl GitSource for InMemoryGitSource {
    fn head_commit(&self, branch: &str) -> Result<CommitInfo> {
        self.branches
            .get(branch)
            .and_then(|commits| commits.last())
            .cloned()
            .ok_or_else(|| ServiceError::new(ErrorKind::Git, format!("branch '{branch}' not found")))
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.current_branch.clone())
    }

    fn commits_since(&self, since: Option<&str>, branch: &str) -> Result<Vec<CommitInfo>> {
        let commits = self.branches.get(branch).cloned().unwrap_or_default();
        match since {
            None => Ok(commits),
            Some(since_hash) => {
                let position = commits.iter().position(|c| c.hash == since_hash);
                Ok(match position {
                    Some(idx) => commits[idx + 1..].to_vec(),
                    None => commits,
                })
            }
        }
    }

    fn changed_files(&self, commit: &CommitInfo) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .commit_files
            .get(&commit.hash)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        Ok(paths)
    }

    fn file_content_at(&self, commit: &CommitInfo, path: &Path) -> Result<Option<String>> {
        let path_str = path.to_string_lossy().to_string();
        Ok(self.commit_files.get(&commit.hash).and_then(|files| files.get(&path_str).cloned()).flatten())
    }

    fn tracked_files(&self) -> Result<Vec<String>> {
        let mut files = self.tracked_files.clone();
        files.sort();
        Ok(files)
    }

    fn worktree_changes(&self) -> Result<HashMap<String, FileChangeStatus>> {
        Ok(self.worktree_changes.clone())
    }

    fn worktree_file_content(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.worktree_files.get(&path.to_string_lossy().to_string()).cloned())
    }

    fn merge_base(&self, branch: &str, base_branch: &str) -> Result<Option<String>> {
        Ok(self.merge_bases.get(&(branch.to_string(), base_branch.to_string())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_since_excludes_the_anchor_and_keeps_order() {
        let mut git = InMemoryGitSource::new();
        git.push_commit("master", "c1", HashMap::new());
        git.push_commit("master", "c2", HashMap::new());
        git.push_commit("master", "c3", HashMap::new());

        let commits = git.commits_since(Some("c1"), "master").unwrap();
        assert_eq!(commits.iter().map(|c| c.hash.clone()).collect::<Vec<_>>(), vec!["c2", "c3"]);
    }

    #[test]
    fn head_commit_on_unknown_branch_is_a_git_error() {
        let git = InMemoryGitSource::new();
        let err = git.head_commit("master").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Git);
    }

    #[test]
    fn changed_files_reports_deletions_as_none_content() {
        let mut git = InMemoryGitSource::new();
        let mut changes = HashMap::new();
        changes.insert("Old.swift".to_string(), None);
        changes.insert("New.swift".to_string(), Some("class New {}".to_string()));
        git.push_commit("master", "c1", changes);

        let commit = git.head_commit("master").unwrap();
        let files = git.changed_files(&commit).unwrap();
        assert_eq!(files, vec!["New.swift".to_string(), "Old.swift".to_string()]);
        assert_eq!(git.file_content_at(&commit, Path::new("Old.swift")).unwrap(), None);
        assert!(git.file_content_at(&commit, Path::new("New.swift")).unwrap().is_some());
    }
}
