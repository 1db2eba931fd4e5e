//! End-to-end coverage across the indexer/feature-indexer/query-service
//! seam, driven entirely through `InMemoryGitSource` (no real repository
//! checkout involved). Mirrors the master-branch scenarios from
//! `original_source/tests/test_service.py` and `test_query_service.py`.

use std::collections::HashMap;

use swiftgraph_service::{FeatureBranchIndexer, GraphRequest, IndexerService, InMemoryGitSource, QueryService, Settings};
use swiftgraph_storage::{Direction, Repository, TargetTypeFilter};
use tempfile::TempDir;

fn changes(pairs: &[(&str, Option<&str>)]) -> HashMap<String, Option<String>> {
    pairs.iter().map(|(path, content)| (path.to_string(), content.map(str::to_string))).collect()
}

/// S1: initialize indexes the tracked tree as one commit; a follow-up
/// commit that adds a member to the same type is picked up by `update`.
#[test]
fn init_then_update_tracks_new_members() {
    let dir = TempDir::new().unwrap();
    let mut git = InMemoryGitSource::new();
    git.push_commit("master", "c1", changes(&[("Sources/Greeter.swift", Some("struct Greeter { func greet() {} }"))]));
    git.set_tracked_files(vec!["Sources/Greeter.swift".to_string()]);

    let settings = Settings::new(dir.path(), dir.path().join("graph.db"));
    let mut indexer = IndexerService::new(settings.clone(), git.clone()).unwrap();
    let head = indexer.initialize().unwrap();
    assert_eq!(head, "c1");

    let repo = Repository::open(&settings.db_path).unwrap();
    let found = swiftgraph_storage::search::find_entities(repo.connection(), "Greeter", None, 10).unwrap();
    assert_eq!(found.len(), 1);
    let members = swiftgraph_storage::search::get_members(repo.connection(), &found[0].stable_id).unwrap();
    assert_eq!(members.len(), 1);
    drop(repo);

    git.push_commit(
        "master",
        "c2",
        changes(&[("Sources/Greeter.swift", Some("struct Greeter { func greet() {}\nfunc bye() {} }"))]),
    );
    let mut indexer = IndexerService::new(settings.clone(), git).unwrap();
    let processed = indexer.update().unwrap();
    assert_eq!(processed, vec!["c2".to_string()]);

    let repo = Repository::open(&settings.db_path).unwrap();
    let found = swiftgraph_storage::search::find_entities(repo.connection(), "Greeter", None, 10).unwrap();
    assert_eq!(found.len(), 1);
    let members = swiftgraph_storage::search::get_members(repo.connection(), &found[0].stable_id).unwrap();
    assert_eq!(members.len(), 2);
}

/// S2: deleting the file that defines an entity tombstones both the
/// entity and every relationship that referenced it.
#[test]
fn file_deletion_tombstones_entity_and_incoming_edges() {
    let dir = TempDir::new().unwrap();
    let mut git = InMemoryGitSource::new();
    git.push_commit(
        "master",
        "c1",
        changes(&[
            ("Sources/ObsoleteView.swift", Some("class ObsoleteView {}")),
            ("Sources/Presenter.swift", Some("class Presenter { let view: ObsoleteView? }")),
        ]),
    );
    git.set_tracked_files(vec!["Sources/ObsoleteView.swift".to_string(), "Sources/Presenter.swift".to_string()]);

    let settings = Settings::new(dir.path(), dir.path().join("graph.db"));
    let mut indexer = IndexerService::new(settings.clone(), git.clone()).unwrap();
    indexer.initialize().unwrap();

    git.push_commit("master", "c2", changes(&[("Sources/ObsoleteView.swift", None)]));
    let mut indexer = IndexerService::new(settings.clone(), git).unwrap();
    indexer.update().unwrap();

    let repo = Repository::open(&settings.db_path).unwrap();
    let found = swiftgraph_storage::search::find_entities(repo.connection(), "ObsoleteView", None, 10).unwrap();
    assert!(found.is_empty());
}

/// S7: a forward reference resolves once the referenced type is parsed and
/// the materialized views are rebuilt.
#[test]
fn forward_reference_resolves_after_both_files_are_indexed() {
    let dir = TempDir::new().unwrap();
    let mut git = InMemoryGitSource::new();
    git.push_commit(
        "master",
        "c1",
        changes(&[
            ("Sources/Assembly.swift", Some("class Assembly { let presenter: Presenter? }")),
            ("Sources/Presenter.swift", Some("class Presenter {}")),
        ]),
    );
    git.set_tracked_files(vec!["Sources/Assembly.swift".to_string(), "Sources/Presenter.swift".to_string()]);

    let settings = Settings::new(dir.path(), dir.path().join("graph.db"));
    let mut indexer = IndexerService::new(settings.clone(), git).unwrap();
    indexer.initialize().unwrap();

    let repo = Repository::open(&settings.db_path).unwrap();
    let found = swiftgraph_storage::search::find_entities(repo.connection(), "Presenter", None, 10).unwrap();
    assert_eq!(found.len(), 1);
}

/// Feature-branch overlay: a query on the feature branch sees the
/// feature-origin edge; switching back to the default branch sees the
/// unmodified master graph.
#[test]
fn feature_branch_overlay_is_used_only_while_checked_out() {
    let dir = TempDir::new().unwrap();
    let mut git = InMemoryGitSource::new();
    git.push_commit(
        "master",
        "m1",
        changes(&[
            ("Sources/Presenter.swift", Some("class Presenter {}")),
            ("Sources/View.swift", Some("class View {}")),
        ]),
    );
    git.set_tracked_files(vec!["Sources/Presenter.swift".to_string(), "Sources/View.swift".to_string()]);

    let settings =
        Settings::new(dir.path(), dir.path().join("master.db")).with_feature_db_path(dir.path().join("feature.db"));
    let mut master_indexer = IndexerService::new(settings.clone(), git.clone()).unwrap();
    master_indexer.initialize().unwrap();

    git.set_current_branch(Some("feature/rework"));
    git.push_commit("feature/rework", "f1", changes(&[("Sources/Presenter.swift", Some("class Presenter { var other: View? }"))]));

    let mut feature_indexer = FeatureBranchIndexer::new(settings.clone(), git.clone()).unwrap();
    let result = feature_indexer.update().unwrap();
    assert!(!result.skipped());

    let request = || GraphRequest {
        entity_name: "Presenter",
        stop_name: None,
        direction: Direction::Both,
        include_sibling_subgraphs: false,
        max_hops: None,
        target_type: TargetTypeFilter::All,
        stop_at_module_boundary: None,
    };

    let feature_service = QueryService::new(settings.clone(), git.clone());
    let feature_payload = feature_service.get_graph(request()).unwrap();
    assert!(feature_payload.nodes.iter().any(|n| n.name == "Presenter" && n.origin == "feature"));

    let mut default_git = git;
    default_git.set_current_branch(Some("master"));
    let default_service = QueryService::new(settings, default_git);
    let default_payload = default_service.get_graph(request()).unwrap();
    assert!(default_payload.nodes.iter().all(|n| n.origin == "master"));
}
