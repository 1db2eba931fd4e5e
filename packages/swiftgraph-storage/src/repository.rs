//! Write-path repository (`spec.md` §4.5).
//!
//! One outer transaction per public mutating call. Grounded on
//! `original_source/db/repository.py::MetadataRepository` for
//! entity/member persistence; extension persistence, relationship
//! tombstone-then-insert, and the materialized-view rebuild are not shown
//! in that sample and are implemented directly from `spec.md` §4.5/§4.6.2.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use swiftgraph_core::{EntityRecord, ExtensionRecord, MemberRecord, RelationshipRecord};

use crate::error::Result;
use crate::schema;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::apply_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Raw connection access for the read-path (`graph`/`search` modules
    /// open their own statements against the same file).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // --- commit helpers ---

    pub fn record_commit(&self, commit_hash: &str, parent_hash: Option<&str>, branch: &str, is_master: bool) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO commits (hash, parent_hash, branch, is_master) VALUES (?1, ?2, ?3, ?4)",
            params![commit_hash, parent_hash, branch, is_master as i64],
        )?;
        let id = self
            .conn
            .query_row("SELECT id FROM commits WHERE hash = ?1", params![commit_hash], |row| row.get(0))?;
        Ok(id)
    }

    pub fn latest_master_commit(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT hash FROM commits WHERE is_master = 1 ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn latest_commit(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT hash FROM commits ORDER BY id DESC LIMIT 1", [], |row| row.get(0))
            .optional()?)
    }

    /// Most recent non-worktree commit recorded for `branch` (`spec.md`
    /// §4.9 feature-branch anchor resolution). Worktree pseudo-commits use
    /// the `worktree:<branch>` hash convention and are excluded so the
    /// anchor always points at a real commit.
    pub fn latest_real_commit_for_branch(&self, branch: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT hash FROM commits WHERE branch = ?1 AND hash NOT LIKE 'worktree:%' ORDER BY id DESC LIMIT 1",
                params![branch],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn delete_commit_by_hash(&self, hash: &str) -> Result<()> {
        self.conn.execute("DELETE FROM commits WHERE hash = ?1", params![hash])?;
        Ok(())
    }

    // --- schema_meta helpers ---

    pub fn set_feature_branch(&self, branch: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO schema_meta (key, value) VALUES ('feature_branch', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![branch],
        )?;
        Ok(())
    }

    pub fn feature_branch(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM schema_meta WHERE key = 'feature_branch'", [], |row| row.get(0))
            .optional()?)
    }

    // --- files ---

    pub fn ensure_file(&self, path: &str, language: &str) -> Result<i64> {
        ensure_file_tx(&self.conn, path, language)
    }

    // --- entities ---

    /// Ensure the file row, upsert, version, then upsert+version each
    /// member, for every record. Returns `stable_id -> entity_id`.
    pub fn persist_entities(&mut self, commit_id: i64, records: &[EntityRecord]) -> Result<HashMap<String, i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut entity_ids = HashMap::with_capacity(records.len());
        for record in records {
            let file_id = ensure_file_tx(&tx, &record.file_path, &record.language)?;
            let entity_id = upsert_entity_tx(&tx, record, file_id)?;
            record_entity_version_tx(&tx, entity_id, commit_id, file_id, record, false)?;
            for member in &record.members {
                let member_id = upsert_member_tx(&tx, entity_id, member)?;
                record_member_version_tx(&tx, member_id, commit_id, file_id, member, false)?;
            }
            entity_ids.insert(record.stable_id.clone(), entity_id);
        }
        tx.commit()?;
        Ok(entity_ids)
    }

    /// Ensure an owning-entity stub row, upsert, version, then upsert+version
    /// each member, for every extension record. Returns `stable_id -> extension_id`.
    pub fn persist_extensions(&mut self, commit_id: i64, records: &[ExtensionRecord]) -> Result<HashMap<String, i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut extension_ids = HashMap::with_capacity(records.len());
        for record in records {
            let file_id = ensure_file_tx(&tx, &record.file_path, &record.language)?;
            let entity_id = ensure_owning_entity_tx(&tx, &record.extended_type, &record.module, &record.language)?;
            let extension_id = upsert_extension_tx(&tx, record, entity_id)?;
            record_extension_version_tx(&tx, extension_id, commit_id, file_id, record, false)?;
            extension_ids.insert(record.stable_id.clone(), extension_id);
        }
        tx.commit()?;
        Ok(extension_ids)
    }

    /// `spec.md` §4.5: append a deletion version for every entity (and its
    /// members, and its outgoing relationships) whose join row names this
    /// file, and for every extension whose latest version was in this file;
    /// then drop the join rows.
    pub fn mark_entities_deleted_for_file(&mut self, file_path: &str, commit_id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(file_id) = file_id_for_path(&tx, file_path)? else {
            tx.commit()?;
            return Ok(());
        };

        let entity_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT entity_id FROM entity_files WHERE file_id = ?1")?;
            stmt.query_map(params![file_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for entity_id in &entity_ids {
            tx.execute(
                "INSERT INTO entity_versions (entity_id, commit_id, file_id, is_deleted) VALUES (?1, ?2, ?3, 1)",
                params![entity_id, commit_id, file_id],
            )?;
            let member_ids: Vec<i64> = {
                let mut stmt = tx.prepare("SELECT id FROM members WHERE entity_id = ?1")?;
                stmt.query_map(params![entity_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            for member_id in member_ids {
                tx.execute(
                    "INSERT INTO member_versions (member_id, commit_id, file_id, is_deleted) VALUES (?1, ?2, ?3, 1)",
                    params![member_id, commit_id, file_id],
                )?;
            }
            tombstone_active_relationships_tx(&tx, *entity_id, commit_id)?;
        }
        tx.execute("DELETE FROM entity_files WHERE file_id = ?1", params![file_id])?;

        mark_extensions_deleted_for_file_tx(&tx, file_id, commit_id)?;

        tx.commit()?;
        Ok(())
    }

    // --- relationships ---

    /// `spec.md` §4.5 Persist-relationships: tombstone every active edge
    /// from each source in `entity_ids`, then insert the new set, resolving
    /// `(name, module)` then `(name)` for each target.
    pub fn persist_relationships(
        &mut self,
        commit_id: i64,
        entity_ids: &HashMap<String, i64>,
        relationships: &[RelationshipRecord],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        let mut sources = std::collections::HashSet::new();
        let mut source_id_by_stable_id = HashMap::new();
        for rel in relationships {
            if source_id_by_stable_id.contains_key(&rel.source_stable_id) {
                continue;
            }
            let source_id = match entity_ids.get(&rel.source_stable_id) {
                Some(id) => *id,
                None => ensure_source_entity_id_tx(&tx, &rel.source_stable_id)?,
            };
            source_id_by_stable_id.insert(rel.source_stable_id.clone(), source_id);
            sources.insert(source_id);
        }
        for source_id in &sources {
            tombstone_active_relationships_tx(&tx, *source_id, commit_id)?;
        }

        for rel in relationships {
            let source_entity_id = source_id_by_stable_id[&rel.source_stable_id];
            let target_entity_id = resolve_target_entity_id_tx(&tx, &rel.target_name, rel.target_module.as_deref())?;
            insert_relationship_tx(&tx, source_entity_id, target_entity_id, rel, commit_id)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Scan `entity_relationships` for null targets and fill them in where
    /// resolvable. Never touches tombstoned rows.
    pub fn resolve_pending_relationships(&mut self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        resolve_pending_relationships_tx(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Truncate and repopulate `entity_latest`/`relationship_latest`/
    /// `extension_latest`. Resolves pending relationship targets first so
    /// the rebuilt `relationship_latest` reflects forward references
    /// resolved by entities persisted earlier in the same indexing pass
    /// (`spec.md` §8 S7).
    pub fn rebuild_latest_tables(&mut self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        resolve_pending_relationships_tx(&tx)?;
        rebuild_entity_latest_tx(&tx)?;
        rebuild_relationship_latest_tx(&tx)?;
        rebuild_extension_latest_tx(&tx)?;
        tx.commit()?;
        Ok(())
    }
}

fn ensure_file_tx(conn: &Connection, path: &str, language: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO files (path, language) VALUES (?1, ?2)",
        params![path, language],
    )?;
    Ok(conn.query_row("SELECT id FROM files WHERE path = ?1", params![path], |row| row.get(0))?)
}

fn file_id_for_path(conn: &Connection, path: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT id FROM files WHERE path = ?1", params![path], |row| row.get(0))
        .optional()?)
}

fn upsert_entity_tx(conn: &Connection, record: &EntityRecord, file_id: i64) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM entities WHERE stable_id = ?1", params![record.stable_id], |row| row.get(0))
        .optional()?;
    let entity_id = if let Some(entity_id) = existing {
        conn.execute(
            "UPDATE entities SET name = ?1, kind = ?2, module = ?3, language = ?4, primary_file_id = ?5 WHERE id = ?6",
            params![record.name, record.kind.as_str(), record.module, record.language, file_id, entity_id],
        )?;
        entity_id
    } else {
        conn.execute(
            "INSERT INTO entities (stable_id, name, kind, module, language, primary_file_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![record.stable_id, record.name, record.kind.as_str(), record.module, record.language, file_id],
        )?;
        conn.last_insert_rowid()
    };
    conn.execute(
        "INSERT INTO entity_files (entity_id, file_id, is_primary) VALUES (?1, ?2, 1)
         ON CONFLICT(entity_id, file_id) DO UPDATE SET is_primary = excluded.is_primary",
        params![entity_id, file_id],
    )?;
    Ok(entity_id)
}

fn record_entity_version_tx(
    conn: &Connection,
    entity_id: i64,
    commit_id: i64,
    file_id: i64,
    record: &EntityRecord,
    is_deleted: bool,
) -> Result<()> {
    let properties = serde_json::to_string(&record.properties)?;
    conn.execute(
        "INSERT INTO entity_versions (entity_id, commit_id, file_id, start_line, end_line, signature, docstring, code, properties, is_deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entity_id,
            commit_id,
            file_id,
            record.start_line,
            record.end_line,
            record.signature,
            record.docstring,
            record.code,
            properties,
            is_deleted as i64,
        ],
    )?;
    Ok(())
}

fn member_stable_id(entity_id: i64, member: &MemberRecord) -> String {
    format!("{entity_id}:{}:{}", member.kind.as_str(), member.name)
}

fn upsert_member_tx(conn: &Connection, entity_id: i64, member: &MemberRecord) -> Result<i64> {
    let stable_id = member_stable_id(entity_id, member);
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM members WHERE stable_id = ?1", params![stable_id], |row| row.get(0))
        .optional()?;
    if let Some(member_id) = existing {
        conn.execute(
            "UPDATE members SET name = ?1, kind = ?2 WHERE id = ?3",
            params![member.name, member.kind.as_str(), member_id],
        )?;
        Ok(member_id)
    } else {
        conn.execute(
            "INSERT INTO members (entity_id, stable_id, name, kind) VALUES (?1, ?2, ?3, ?4)",
            params![entity_id, stable_id, member.name, member.kind.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

fn record_member_version_tx(
    conn: &Connection,
    member_id: i64,
    commit_id: i64,
    file_id: i64,
    member: &MemberRecord,
    is_deleted: bool,
) -> Result<()> {
    conn.execute(
        "INSERT INTO member_versions (member_id, commit_id, file_id, start_line, end_line, signature, code, is_deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            member_id,
            commit_id,
            file_id,
            member.start_line,
            member.end_line,
            member.signature,
            member.code,
            is_deleted as i64,
        ],
    )?;
    Ok(())
}

/// Get-or-create the entities row backing an extension's extended type.
/// If the real declaration hasn't been parsed yet, a stub row is inserted
/// with `kind = "extension"`; `upsert_entity_tx` silently promotes it to
/// the real kind once that declaration is persisted (same `stable_id`).
fn ensure_owning_entity_tx(conn: &Connection, extended_type: &str, module: &str, language: &str) -> Result<i64> {
    let stable_id = swiftgraph_core::stable_id(language, module, extended_type);
    ensure_stub_entity_tx(conn, &stable_id, extended_type, module, language)
}

/// Get-or-create the entities row a relationship's source stable_id
/// resolves to. Used when an extension's relationships route through its
/// own stable_id (the extended type was unknown to the in-parser
/// `TypeRegistry` this session) rather than an owning entity's.
fn ensure_source_entity_id_tx(conn: &Connection, source_stable_id: &str) -> Result<i64> {
    if let Some(id) = conn
        .query_row("SELECT id FROM entities WHERE stable_id = ?1", params![source_stable_id], |row| row.get(0))
        .optional()?
    {
        return Ok(id);
    }
    ensure_stub_entity_tx(conn, source_stable_id, source_stable_id, "", "swift")
}

fn ensure_stub_entity_tx(conn: &Connection, stable_id: &str, name: &str, module: &str, language: &str) -> Result<i64> {
    if let Some(id) = conn
        .query_row("SELECT id FROM entities WHERE stable_id = ?1", params![stable_id], |row| row.get(0))
        .optional()?
    {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO entities (stable_id, name, kind, module, language, primary_file_id) VALUES (?1, ?2, 'extension', ?3, ?4, NULL)",
        params![stable_id, name, module, language],
    )?;
    Ok(conn.last_insert_rowid())
}

fn upsert_extension_tx(conn: &Connection, record: &ExtensionRecord, entity_id: i64) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM extensions WHERE stable_id = ?1", params![record.stable_id], |row| row.get(0))
        .optional()?;
    if let Some(extension_id) = existing {
        conn.execute(
            "UPDATE extensions SET entity_id = ?1, extended_type = ?2, module = ?3, language = ?4 WHERE id = ?5",
            params![entity_id, record.extended_type, record.module, record.language, extension_id],
        )?;
        Ok(extension_id)
    } else {
        conn.execute(
            "INSERT INTO extensions (stable_id, entity_id, extended_type, module, language) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![record.stable_id, entity_id, record.extended_type, record.module, record.language],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

fn record_extension_version_tx(
    conn: &Connection,
    extension_id: i64,
    commit_id: i64,
    file_id: i64,
    record: &ExtensionRecord,
    is_deleted: bool,
) -> Result<()> {
    let conformances = serde_json::to_string(&record.conformances)?;
    let member_names: Vec<&str> = record.members.iter().map(|m| m.name.as_str()).collect();
    let mut properties = record.properties.clone();
    properties.insert("member_names".to_string(), serde_json::json!(member_names.join("|")));
    let properties = serde_json::to_string(&properties)?;
    conn.execute(
        "INSERT INTO extension_versions (extension_id, commit_id, file_id, start_line, end_line, signature, code, visibility, constraints, conformances, properties, is_deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            extension_id,
            commit_id,
            file_id,
            record.start_line,
            record.end_line,
            record.signature,
            record.code,
            record.visibility,
            record.constraints,
            conformances,
            properties,
            is_deleted as i64,
        ],
    )?;
    Ok(())
}

fn mark_extensions_deleted_for_file_tx(conn: &Connection, file_id: i64, commit_id: i64) -> Result<()> {
    let extension_ids: Vec<i64> = {
        let mut stmt = conn.prepare(
            "WITH latest AS (
                SELECT extension_id, MAX(commit_id) AS commit_id
                FROM extension_versions WHERE is_deleted = 0 GROUP BY extension_id
            )
            SELECT xv.extension_id FROM latest
            JOIN extension_versions xv ON xv.extension_id = latest.extension_id AND xv.commit_id = latest.commit_id
            WHERE xv.file_id = ?1",
        )?;
        stmt.query_map(params![file_id], |row| row.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for extension_id in extension_ids {
        conn.execute(
            "INSERT INTO extension_versions (extension_id, commit_id, file_id, is_deleted) VALUES (?1, ?2, ?3, 1)",
            params![extension_id, commit_id, file_id],
        )?;
    }
    Ok(())
}

fn tombstone_active_relationships_tx(conn: &Connection, source_entity_id: i64, commit_id: i64) -> Result<()> {
    let active: Vec<(Option<i64>, String, Option<String>, String, Option<String>)> = {
        let mut stmt = conn.prepare(
            "SELECT target_entity_id, target_name, target_module, edge_type, metadata
             FROM entity_relationships WHERE source_entity_id = ?1 AND is_deleted = 0",
        )?;
        stmt.query_map(params![source_entity_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
    };
    for (target_entity_id, target_name, target_module, edge_type, metadata) in active {
        conn.execute(
            "INSERT INTO entity_relationships (source_entity_id, target_entity_id, target_name, target_module, edge_type, metadata, commit_id, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![source_entity_id, target_entity_id, target_name, target_module, edge_type, metadata, commit_id],
        )?;
    }
    Ok(())
}

fn resolve_target_entity_id_tx(conn: &Connection, name: &str, module: Option<&str>) -> Result<Option<i64>> {
    if let Some(module) = module {
        let hit: Option<i64> = conn
            .query_row(
                "SELECT id FROM entities WHERE name = ?1 AND module = ?2 ORDER BY id DESC LIMIT 1",
                params![name, module],
                |row| row.get(0),
            )
            .optional()?;
        if hit.is_some() {
            return Ok(hit);
        }
    }
    Ok(conn
        .query_row("SELECT id FROM entities WHERE name = ?1 ORDER BY id DESC LIMIT 1", params![name], |row| row.get(0))
        .optional()?)
}

fn insert_relationship_tx(
    conn: &Connection,
    source_entity_id: i64,
    target_entity_id: Option<i64>,
    rel: &RelationshipRecord,
    commit_id: i64,
) -> Result<()> {
    let metadata = serde_json::to_string(&rel.metadata)?;
    conn.execute(
        "INSERT INTO entity_relationships (source_entity_id, target_entity_id, target_name, target_module, edge_type, metadata, commit_id, is_deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
        params![
            source_entity_id,
            target_entity_id,
            rel.target_name,
            rel.target_module,
            rel.edge_type.as_str(),
            metadata,
            commit_id,
        ],
    )?;
    Ok(())
}

fn resolve_pending_relationships_tx(conn: &Connection) -> Result<()> {
    let pending: Vec<(i64, String, Option<String>)> = {
        let mut stmt = conn.prepare(
            "SELECT id, target_name, target_module FROM entity_relationships WHERE target_entity_id IS NULL AND is_deleted = 0",
        )?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };
    for (id, name, module) in pending {
        if let Some(target_id) = resolve_target_entity_id_tx(conn, &name, module.as_deref())? {
            conn.execute("UPDATE entity_relationships SET target_entity_id = ?1 WHERE id = ?2", params![target_id, id])?;
        }
    }
    Ok(())
}

fn rebuild_entity_latest_tx(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM entity_latest", [])?;
    let rows: Vec<(String, i64, String, String, Option<String>, Option<String>, Option<String>, Option<String>, Option<String>, Option<String>)> = {
        let mut stmt = conn.prepare(
            "WITH latest AS (
                SELECT entity_id, MAX(commit_id) AS commit_id FROM entity_versions WHERE is_deleted = 0 GROUP BY entity_id
            )
            SELECT
                e.stable_id, e.id, e.name, e.kind, e.module, f.path, ev.signature, ev.properties, commits.hash,
                (SELECT GROUP_CONCAT(m.name, '|') FROM members m WHERE m.entity_id = e.id) AS member_names
            FROM latest
            JOIN entity_versions ev ON ev.entity_id = latest.entity_id AND ev.commit_id = latest.commit_id
            JOIN entities e ON e.id = latest.entity_id
            LEFT JOIN files f ON f.id = ev.file_id
            JOIN commits ON commits.id = ev.commit_id",
        )?;
        stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
    };

    for (stable_id, entity_id, name, kind, module, file_path, signature, properties, commit_hash, member_names) in rows {
        let props: serde_json::Value = properties
            .as_deref()
            .and_then(|p| serde_json::from_str(p).ok())
            .unwrap_or(serde_json::Value::Null);
        let target_type = props.get("target_type").and_then(|v| v.as_str()).map(str::to_string);
        let visibility = props.get("visibility").and_then(|v| v.as_str()).map(str::to_string);
        conn.execute(
            "INSERT INTO entity_latest (stable_id, entity_id, name, kind, module, file_path, signature, properties, member_names, target_type, visibility, commit_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![stable_id, entity_id, name, kind, module, file_path, signature, properties, member_names, target_type, visibility, commit_hash],
        )?;
    }
    Ok(())
}

fn rebuild_relationship_latest_tx(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM relationship_latest", [])?;
    let rows: Vec<(String, String, Option<String>, String, Option<String>, String, Option<String>)> = {
        let mut stmt = conn.prepare(
            "WITH ranked AS (
                SELECT er.*, ROW_NUMBER() OVER (
                    PARTITION BY
                        er.source_entity_id,
                        COALESCE(er.target_entity_id, -1),
                        er.target_name,
                        COALESCE(er.target_module, ''),
                        er.edge_type
                    ORDER BY er.commit_id DESC, er.id DESC
                ) AS rn
                FROM entity_relationships er
            )
            SELECT src.stable_id, src.name, tgt.stable_id, ranked.target_name, ranked.target_module, ranked.edge_type, ranked.metadata
            FROM ranked
            JOIN entities src ON src.id = ranked.source_entity_id
            LEFT JOIN entities tgt ON tgt.id = ranked.target_entity_id
            WHERE ranked.rn = 1 AND ranked.is_deleted = 0",
        )?;
        stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
    };
    for (source_stable_id, source_name, target_stable_id, target_name, target_module, edge_type, metadata) in rows {
        conn.execute(
            "INSERT OR IGNORE INTO relationship_latest (source_stable_id, source_name, target_stable_id, target_name, target_module, edge_type, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![source_stable_id, source_name, target_stable_id, target_name, target_module, edge_type, metadata],
        )?;
    }
    Ok(())
}

fn rebuild_extension_latest_tx(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM extension_latest", [])?;
    #[allow(clippy::type_complexity)]
    let rows: Vec<(
        String,
        i64,
        i64,
        String,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    )> = {
        let mut stmt = conn.prepare(
            "WITH latest AS (
                SELECT extension_id, MAX(commit_id) AS commit_id FROM extension_versions WHERE is_deleted = 0 GROUP BY extension_id
            )
            SELECT
                x.stable_id, x.id, x.entity_id, e.stable_id, x.extended_type, x.module, f.path,
                xv.signature, xv.visibility, xv.constraints, xv.conformances, xv.properties, commits.hash
            FROM latest
            JOIN extension_versions xv ON xv.extension_id = latest.extension_id AND xv.commit_id = latest.commit_id
            JOIN extensions x ON x.id = latest.extension_id
            JOIN entities e ON e.id = x.entity_id
            LEFT JOIN files f ON f.id = xv.file_id
            JOIN commits ON commits.id = xv.commit_id",
        )?;
        stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
    };

    for (stable_id, extension_id, entity_id, entity_stable_id, extended_type, module, file_path, signature, visibility, constraints, conformances, properties, commit_hash) in rows {
        let props: serde_json::Value = properties
            .as_deref()
            .and_then(|p| serde_json::from_str(p).ok())
            .unwrap_or(serde_json::Value::Null);
        let target_type = props.get("target_type").and_then(|v| v.as_str()).map(str::to_string);
        let member_names = props.get("member_names").and_then(|v| v.as_str()).map(str::to_string);
        conn.execute(
            "INSERT INTO extension_latest (stable_id, extension_id, entity_id, entity_stable_id, extended_type, module, file_path, signature, visibility, constraints, conformances, member_names, target_type, commit_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                stable_id,
                extension_id,
                entity_id,
                entity_stable_id,
                extended_type,
                module,
                file_path,
                signature,
                visibility,
                constraints,
                conformances,
                member_names,
                target_type,
                commit_hash,
            ],
        )?;
    }
    Ok(())
}
