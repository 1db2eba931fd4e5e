//! `QueryService`: the branch-aware façade over `swiftgraph-storage`'s
//! query engine (`spec.md` §4.9, §9).
//!
//! Ported from `original_source/db/query_service.py::QueryService`. The
//! four-condition feature-db eligibility check
//! (`_should_use_feature_db`/`_get_current_branch`/`_get_feature_db_branch`)
//! is reproduced exactly; branch determination there shells out to
//! `GitPython`, here it goes through the same `GitSource` the indexers use
//! so a test double can drive it without a real repository.

use std::path::Path;

use swiftgraph_storage::search::{EntitySummary, MemberSummary};
use swiftgraph_storage::{Direction, GraphPayload, Repository, TargetTypeFilter};

use crate::cache::GraphCache;
use crate::error::Result;
use crate::git::GitSource;
use crate::settings::Settings;

/// Parameters for [`QueryService::get_graph`], mirroring
/// `query_service.py::QueryService.get_graph`'s keyword arguments.
pub struct GraphRequest<'a> {
    pub entity_name: &'a str,
    pub stop_name: Option<&'a str>,
    pub direction: Direction,
    pub include_sibling_subgraphs: bool,
    pub max_hops: Option<u32>,
    pub target_type: TargetTypeFilter,
    pub stop_at_module_boundary: Option<bool>,
}

pub struct QueryService<G: GitSource> {
    settings: Settings,
    git: G,
    cache: GraphCache,
}

impl<G: GitSource> QueryService<G> {
    pub fn new(settings: Settings, git: G) -> Self {
        let ttl = if settings.cache_ttl_seconds == 0 { None } else { Some(settings.cache_ttl_seconds) };
        Self { settings, git, cache: GraphCache::new(ttl) }
    }

    pub fn find_entities(&self, query: &str, target_type: Option<TargetTypeFilter>, limit: u32) -> Result<Vec<EntitySummary>> {
        let repo = Repository::open(&self.settings.db_path)?;
        let filter = target_type.map(|t| t.as_str());
        Ok(swiftgraph_storage::search::find_entities(repo.connection(), query, filter, limit)?)
    }

    pub fn get_members(&self, entity_stable_id: &str) -> Result<Vec<MemberSummary>> {
        let repo = Repository::open(&self.settings.db_path)?;
        Ok(swiftgraph_storage::search::get_members(repo.connection(), entity_stable_id)?)
    }

    /// Build a graph centered on `request.entity_name`, transparently
    /// overlaying the feature database when the current branch state makes
    /// it eligible, and caching the assembled payload per master commit.
    pub fn get_graph(&self, request: GraphRequest<'_>) -> Result<GraphPayload> {
        let master = Repository::open(&self.settings.db_path)?;
        let commit_hash = master.latest_master_commit()?.unwrap_or_default();
        let feature = if self.should_use_feature_db()? {
            Some(Repository::open(self.settings.feature_db_path.as_ref().expect("checked by should_use_feature_db"))?)
        } else {
            None
        };

        let query = swiftgraph_storage::GraphQuery {
            entity_name: request.entity_name.to_string(),
            stop_name: request.stop_name.map(str::to_string),
            direction: request.direction,
            include_sibling_subgraphs: request.include_sibling_subgraphs,
            max_hops: request.max_hops,
            target_type: request.target_type,
            stop_at_module_boundary: request.stop_at_module_boundary,
        };

        self.cache.get_or_load(
            request.entity_name,
            request.stop_name,
            request.direction,
            request.include_sibling_subgraphs,
            request.max_hops,
            request.target_type,
            &commit_hash,
            || swiftgraph_storage::graph::query_graph(master.connection(), feature.as_ref().map(Repository::connection), &query),
        )
    }

    /// Same as `get_graph`, but walks the graph incrementally from
    /// per-entity lookups rather than the materialized views (`spec.md`
    /// §4.6.3). Bypasses the cache: lazy queries are for databases too
    /// fresh/large for `entity_latest` to be trustworthy, and the
    /// `swiftgraph-storage` entry point itself rejects
    /// `include_sibling_subgraphs` for this path.
    pub fn get_graph_lazy(&self, request: GraphRequest<'_>) -> Result<GraphPayload> {
        let master = Repository::open(&self.settings.db_path)?;
        let query = swiftgraph_storage::GraphQuery {
            entity_name: request.entity_name.to_string(),
            stop_name: request.stop_name.map(str::to_string),
            direction: request.direction,
            include_sibling_subgraphs: request.include_sibling_subgraphs,
            max_hops: request.max_hops,
            target_type: request.target_type,
            stop_at_module_boundary: request.stop_at_module_boundary,
        };
        Ok(swiftgraph_storage::graph::query_graph_lazy(master.connection(), &query)?)
    }

    /// Drop every cached graph payload. Call after indexing so the next
    /// query reflects newly ingested commits even within the same master
    /// commit hash window (`spec.md` §9).
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    fn should_use_feature_db(&self) -> Result<bool> {
        let Some(feature_db_path) = &self.settings.feature_db_path else {
            return Ok(false);
        };
        if !feature_db_path.exists() {
            return Ok(false);
        }

        let Some(current_branch) = self.git.current_branch()? else {
            return Ok(false);
        };
        if current_branch == self.settings.default_branch {
            return Ok(false);
        }

        Ok(self.feature_db_branch(feature_db_path)? == Some(current_branch))
    }

    fn feature_db_branch(&self, feature_db_path: &Path) -> Result<Option<String>> {
        let repo = Repository::open(feature_db_path)?;
        Ok(repo.feature_branch()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::InMemoryGitSource;
    use std::collections::HashMap;
    use swiftgraph_core::{EntityKind, EntityRecord};
    use tempfile::TempDir;

    fn entity(name: &str, stable_id: &str, module: &str) -> EntityRecord {
        EntityRecord {
            stable_id: stable_id.to_string(),
            name: name.to_string(),
            kind: EntityKind::Class,
            module: module.to_string(),
            language: "swift".to_string(),
            file_path: format!("{name}.swift"),
            start_line: 1,
            end_line: 10,
            signature: format!("class {name}"),
            docstring: None,
            code: format!("class {name} {{}}"),
            members: Vec::new(),
            properties: HashMap::new(),
        }
    }

    fn seed_master(dir: &TempDir) {
        let mut repo = Repository::open(dir.path().join("master.db")).unwrap();
        let commit = repo.record_commit("m1", None, "master", true).unwrap();
        repo.persist_entities(commit, &[entity("Presenter", "stable-presenter", "Login")]).unwrap();
        repo.rebuild_latest_tables().unwrap();
    }

    #[test]
    fn find_entities_reaches_the_master_db() {
        let dir = TempDir::new().unwrap();
        seed_master(&dir);
        let settings = Settings::new(dir.path(), dir.path().join("master.db"));
        let service = QueryService::new(settings, InMemoryGitSource::new());
        let results = service.find_entities("Presenter", None, 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn feature_db_unused_without_a_configured_path() {
        let dir = TempDir::new().unwrap();
        seed_master(&dir);
        let settings = Settings::new(dir.path(), dir.path().join("master.db"));
        let service = QueryService::new(settings, InMemoryGitSource::new());
        assert!(!service.should_use_feature_db().unwrap());
    }

    #[test]
    fn feature_db_unused_on_default_branch() {
        let dir = TempDir::new().unwrap();
        seed_master(&dir);
        let feature_path = dir.path().join("feature.db");
        let mut feature_repo = Repository::open(&feature_path).unwrap();
        feature_repo.set_feature_branch("feature/login").unwrap();

        let settings = Settings::new(dir.path(), dir.path().join("master.db")).with_feature_db_path(feature_path);
        let mut git = InMemoryGitSource::new();
        git.set_current_branch(Some("master"));
        let service = QueryService::new(settings, git);
        assert!(!service.should_use_feature_db().unwrap());
    }

    #[test]
    fn feature_db_used_when_branch_matches_indexed_branch() {
        let dir = TempDir::new().unwrap();
        seed_master(&dir);
        let feature_path = dir.path().join("feature.db");
        let mut feature_repo = Repository::open(&feature_path).unwrap();
        feature_repo.set_feature_branch("feature/login").unwrap();

        let settings = Settings::new(dir.path(), dir.path().join("master.db")).with_feature_db_path(feature_path);
        let mut git = InMemoryGitSource::new();
        git.set_current_branch(Some("feature/login"));
        let service = QueryService::new(settings, git);
        assert!(service.should_use_feature_db().unwrap());
    }

    #[test]
    fn feature_db_unused_when_indexed_for_a_different_branch() {
        let dir = TempDir::new().unwrap();
        seed_master(&dir);
        let feature_path = dir.path().join("feature.db");
        let mut feature_repo = Repository::open(&feature_path).unwrap();
        feature_repo.set_feature_branch("feature/other").unwrap();

        let settings = Settings::new(dir.path(), dir.path().join("master.db")).with_feature_db_path(feature_path);
        let mut git = InMemoryGitSource::new();
        git.set_current_branch(Some("feature/login"));
        let service = QueryService::new(settings, git);
        assert!(!service.should_use_feature_db().unwrap());
    }

    #[test]
    fn get_graph_returns_a_payload_centered_on_the_entity() {
        let dir = TempDir::new().unwrap();
        seed_master(&dir);
        let settings = Settings::new(dir.path(), dir.path().join("master.db"));
        let service = QueryService::new(settings, InMemoryGitSource::new());
        let payload = service
            .get_graph(GraphRequest {
                entity_name: "Presenter",
                stop_name: None,
                direction: Direction::Both,
                include_sibling_subgraphs: false,
                max_hops: None,
                target_type: TargetTypeFilter::All,
                stop_at_module_boundary: None,
            })
            .unwrap();
        assert_eq!(payload.entity_name, "Presenter");
    }
}
