//! `find_entities`/`get_members` (`spec.md` §4.7, `SPEC_FULL.md` §C).
//!
//! Ported from `original_source/db/queries.py::find_entities`/`get_members`:
//! comma-split query terms when a comma is present, else whitespace-split,
//! each matched as a separate `LIKE` substring against
//! `name`/`module`/`file_path` (OR across terms, OR across columns), with
//! `%`/`_` escaped so literal underscores in Swift type names don't act as
//! SQL wildcards, and a caller-facing `*` wildcard mapped onto SQL's `%`.

use rusqlite::Connection;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySummary {
    pub stable_id: String,
    pub name: String,
    pub kind: String,
    pub module: Option<String>,
    pub file_path: Option<String>,
    pub signature: Option<String>,
    pub target_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSummary {
    pub name: String,
    pub kind: String,
}

/// Split on comma when the query contains one, else on whitespace; drop
/// empty terms. Mirrors `queries.py::_split_query_terms`.
fn split_query_terms(query: &str) -> Vec<String> {
    if query.contains(',') {
        query.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect()
    } else {
        query.split_whitespace().map(str::to_string).collect()
    }
}

/// Escape `%`, `_`, and the escape character itself, then map the
/// caller-facing `*` wildcard onto SQL's `%`. Mirrors
/// `queries.py::_escape_like_pattern`'s `.replace("*", "%")`.
fn escape_like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if ch == '%' || ch == '_' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    let escaped = escaped.replace('*', "%");
    format!("%{escaped}%")
}

/// Search entities by name/module/file-path substring (`spec.md` §4.7.1).
///
/// Every comma/space-separated term in `query` matches if it hits at least
/// one of name/module/file_path (OR across terms, OR across columns per
/// term), then that OR'd group is further narrowed by `target_type` when
/// given. An empty or all-whitespace query matches everything, subject to
/// `limit`.
pub fn find_entities(conn: &Connection, query: &str, target_type: Option<&str>, limit: u32) -> Result<Vec<EntitySummary>> {
    let terms = split_query_terms(query);

    let mut term_clauses: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();
    for term in &terms {
        let pattern = escape_like_pattern(term);
        term_clauses.push(
            "(name LIKE ? ESCAPE '\\' OR module LIKE ? ESCAPE '\\' OR file_path LIKE ? ESCAPE '\\')".to_string(),
        );
        params.push(pattern.clone());
        params.push(pattern.clone());
        params.push(pattern);
    }

    let mut where_clauses: Vec<String> = Vec::new();
    if !term_clauses.is_empty() {
        where_clauses.push(format!("({})", term_clauses.join(" OR ")));
    }
    if let Some(target_type) = target_type {
        where_clauses.push("target_type = ?".to_string());
        params.push(target_type.to_string());
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let sql = format!(
        "SELECT stable_id, name, kind, module, file_path, signature, target_type
         FROM entity_latest
         {where_sql}
         ORDER BY name ASC
         LIMIT ?"
    );
    params.push(limit.to_string());

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        Ok(EntitySummary {
            stable_id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            module: row.get(3)?,
            file_path: row.get(4)?,
            signature: row.get(5)?,
            target_type: row.get(6)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// List the members of an entity resolved by `stable_id` (`spec.md`
/// §4.7.2). Returns an empty vec when the entity does not exist, matching
/// `queries.py::get_members`'s behavior of silently returning nothing
/// rather than raising.
pub fn get_members(conn: &Connection, entity_stable_id: &str) -> Result<Vec<MemberSummary>> {
    let mut stmt = conn.prepare(
        "SELECT m.name, m.kind
         FROM members m
         JOIN entities e ON e.id = m.entity_id
         WHERE e.stable_id = ?1
         ORDER BY m.name ASC",
    )?;
    let rows = stmt.query_map(rusqlite::params![entity_stable_id], |row| {
        Ok(MemberSummary {
            name: row.get(0)?,
            kind: row.get(1)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;
    use std::collections::HashMap;
    use swiftgraph_core::{EntityKind, EntityRecord, MemberKind, MemberRecord};

    fn member(name: &str, kind: MemberKind) -> MemberRecord {
        MemberRecord {
            name: name.to_string(),
            kind,
            start_line: 1,
            end_line: 1,
            signature: name.to_string(),
            code: name.to_string(),
        }
    }

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
            members: vec![member("load", MemberKind::Function), member("title", MemberKind::Property)],
            properties: HashMap::new(),
        }
    }

    #[test]
    fn find_entities_matches_substring_case_sensitively_by_default() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        repo.persist_entities(
            commit,
            &[entity("LoginPresenter", "stable-lp", "Login"), entity("SignupPresenter", "stable-sp", "Signup")],
        )
        .unwrap();
        repo.rebuild_latest_tables().unwrap();

        let results = find_entities(repo.connection(), "Presenter", None, 50).unwrap();
        assert_eq!(results.len(), 2);

        let results = find_entities(repo.connection(), "Login Presenter", None, 50).unwrap();
        assert_eq!(results.len(), 2, "space-separated terms OR together");
    }

    #[test]
    fn find_entities_comma_separated_terms_are_ored() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        repo.persist_entities(
            commit,
            &[entity("LoginPresenter", "stable-lp", "Login"), entity("SignupPresenter", "stable-sp", "Signup")],
        )
        .unwrap();
        repo.rebuild_latest_tables().unwrap();

        let results = find_entities(repo.connection(), "Login,Signup", None, 50).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn find_entities_star_wildcard_maps_to_sql_like() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        repo.persist_entities(
            commit,
            &[entity("LoginPresenter", "stable-lp", "Login"), entity("SignupPresenter", "stable-sp", "Signup")],
        )
        .unwrap();
        repo.rebuild_latest_tables().unwrap();

        let results = find_entities(repo.connection(), "Login*", None, 50).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "LoginPresenter");
    }

    #[test]
    fn find_entities_escapes_like_wildcards_in_query() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        repo.persist_entities(
            commit,
            &[entity("My_Type", "stable-mt", "Core"), entity("MyXType", "stable-mx", "Core")],
        )
        .unwrap();
        repo.rebuild_latest_tables().unwrap();

        let results = find_entities(repo.connection(), "My_Type", None, 50).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "My_Type");
    }

    #[test]
    fn find_entities_empty_query_returns_everything_up_to_limit() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        repo.persist_entities(commit, &[entity("A", "stable-a", "M"), entity("B", "stable-b", "M")]).unwrap();
        repo.rebuild_latest_tables().unwrap();

        let results = find_entities(repo.connection(), "", None, 1).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn get_members_lists_entity_members_sorted_by_name() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        repo.persist_entities(commit, &[entity("LoginPresenter", "stable-lp", "Login")]).unwrap();
        repo.rebuild_latest_tables().unwrap();

        let members = get_members(repo.connection(), "stable-lp").unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "load");
        assert_eq!(members[1].name, "title");
    }

    #[test]
    fn get_members_unknown_entity_returns_empty() {
        let repo = Repository::open_in_memory().unwrap();
        let members = get_members(repo.connection(), "stable-ghost").unwrap();
        assert!(members.is_empty());
    }
}
