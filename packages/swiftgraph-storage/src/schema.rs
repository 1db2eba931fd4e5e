//! Declarative table/index/materialized-view DDL (`spec.md` §6).
//!
//! Ported from `original_source/db/schema.py::apply_schema`. One
//! `execute_batch` call; every statement is `CREATE ... IF NOT EXISTS` so
//! applying the schema against an already-initialized database is a no-op.

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 4;

pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS commits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hash TEXT UNIQUE NOT NULL,
            parent_hash TEXT,
            branch TEXT NOT NULL,
            is_master INTEGER DEFAULT 0,
            indexed_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT UNIQUE NOT NULL,
            language TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stable_id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            module TEXT,
            language TEXT NOT NULL,
            primary_file_id INTEGER REFERENCES files(id) ON DELETE SET NULL,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS entity_files (
            entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            is_primary INTEGER DEFAULT 0,
            UNIQUE(entity_id, file_id)
        );

        CREATE TABLE IF NOT EXISTS entity_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            commit_id INTEGER NOT NULL REFERENCES commits(id) ON DELETE CASCADE,
            file_id INTEGER REFERENCES files(id) ON DELETE SET NULL,
            start_line INTEGER,
            end_line INTEGER,
            signature TEXT,
            docstring TEXT,
            code TEXT,
            properties TEXT,
            is_deleted INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            stable_id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS member_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            commit_id INTEGER NOT NULL REFERENCES commits(id) ON DELETE CASCADE,
            file_id INTEGER REFERENCES files(id) ON DELETE SET NULL,
            start_line INTEGER,
            end_line INTEGER,
            signature TEXT,
            code TEXT,
            is_deleted INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS entity_relationships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            target_entity_id INTEGER REFERENCES entities(id) ON DELETE SET NULL,
            target_name TEXT NOT NULL,
            target_module TEXT,
            edge_type TEXT NOT NULL,
            metadata TEXT,
            commit_id INTEGER NOT NULL REFERENCES commits(id) ON DELETE CASCADE,
            is_deleted INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS extensions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stable_id TEXT UNIQUE NOT NULL,
            entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            extended_type TEXT NOT NULL,
            module TEXT,
            language TEXT NOT NULL DEFAULT 'swift'
        );

        CREATE TABLE IF NOT EXISTS extension_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            extension_id INTEGER NOT NULL REFERENCES extensions(id) ON DELETE CASCADE,
            commit_id INTEGER NOT NULL REFERENCES commits(id) ON DELETE CASCADE,
            file_id INTEGER REFERENCES files(id) ON DELETE SET NULL,
            start_line INTEGER,
            end_line INTEGER,
            signature TEXT,
            code TEXT,
            visibility TEXT,
            constraints TEXT,
            conformances TEXT,
            properties TEXT,
            is_deleted INTEGER DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);
        CREATE INDEX IF NOT EXISTS idx_entities_module ON entities(module);
        CREATE INDEX IF NOT EXISTS idx_entity_files_file ON entity_files(file_id);
        CREATE INDEX IF NOT EXISTS idx_entity_versions_entity_commit
            ON entity_versions(entity_id, commit_id);
        CREATE INDEX IF NOT EXISTS idx_members_name ON members(name);
        CREATE INDEX IF NOT EXISTS idx_member_versions_member_commit
            ON member_versions(member_id, commit_id);

        CREATE INDEX IF NOT EXISTS idx_relationships_source
            ON entity_relationships(source_entity_id, edge_type);
        CREATE INDEX IF NOT EXISTS idx_relationships_target
            ON entity_relationships(target_entity_id, edge_type);

        CREATE INDEX IF NOT EXISTS idx_entity_versions_lookup
            ON entity_versions(entity_id, commit_id DESC);
        CREATE INDEX IF NOT EXISTS idx_entity_versions_not_deleted
            ON entity_versions(is_deleted, entity_id, commit_id DESC)
            WHERE is_deleted = 0;
        CREATE INDEX IF NOT EXISTS idx_relationships_composite
            ON entity_relationships(
                source_entity_id,
                target_entity_id,
                target_name,
                edge_type,
                commit_id DESC
            );
        CREATE INDEX IF NOT EXISTS idx_members_entity ON members(entity_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_commit
            ON entity_relationships(commit_id, is_deleted);

        CREATE TABLE IF NOT EXISTS entity_latest (
            stable_id TEXT PRIMARY KEY,
            entity_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            module TEXT,
            file_path TEXT,
            signature TEXT,
            properties TEXT,
            member_names TEXT,
            target_type TEXT,
            visibility TEXT,
            commit_hash TEXT
        );

        CREATE TABLE IF NOT EXISTS relationship_latest (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_stable_id TEXT NOT NULL,
            source_name TEXT NOT NULL,
            target_stable_id TEXT,
            target_name TEXT NOT NULL,
            target_module TEXT,
            edge_type TEXT NOT NULL,
            metadata TEXT,
            UNIQUE(source_stable_id, target_stable_id, target_name, target_module, edge_type)
        );

        CREATE INDEX IF NOT EXISTS idx_entity_latest_name ON entity_latest(name);
        CREATE INDEX IF NOT EXISTS idx_relationship_latest_source
            ON relationship_latest(source_stable_id);
        CREATE INDEX IF NOT EXISTS idx_relationship_latest_target
            ON relationship_latest(target_stable_id);

        CREATE TABLE IF NOT EXISTS extension_latest (
            stable_id TEXT PRIMARY KEY,
            extension_id INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            entity_stable_id TEXT NOT NULL,
            extended_type TEXT NOT NULL,
            module TEXT,
            file_path TEXT,
            signature TEXT,
            visibility TEXT,
            constraints TEXT,
            conformances TEXT,
            member_names TEXT,
            target_type TEXT,
            commit_hash TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_extensions_entity ON extensions(entity_id);
        CREATE INDEX IF NOT EXISTS idx_extension_versions_extension_commit
            ON extension_versions(extension_id, commit_id);
        CREATE INDEX IF NOT EXISTS idx_extension_latest_entity
            ON extension_latest(entity_stable_id);
        ",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
        rusqlite::params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read `schema_meta.version` and fail if it doesn't match this crate's
/// `SCHEMA_VERSION` (`spec.md` §7 "Schema error: store missing required
/// tables; fatal").
pub fn check_schema_version(conn: &Connection) -> Result<()> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .ok();
    match value {
        Some(v) if v == SCHEMA_VERSION.to_string() => Ok(()),
        Some(v) => Err(crate::error::StorageError::schema(format!(
            "schema_meta.version is {v}, expected {SCHEMA_VERSION}"
        ))),
        None => Err(crate::error::StorageError::schema("schema_meta has no version row")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
        check_schema_version(&conn).unwrap();
    }

    #[test]
    fn missing_version_row_is_a_schema_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);")
            .unwrap();
        assert_eq!(check_schema_version(&conn).unwrap_err().kind, crate::error::ErrorKind::Schema);
    }
}
