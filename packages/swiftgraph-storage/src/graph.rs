//! Centered-graph query engine (`spec.md` §4.6).
//!
//! Grounded on `original_source/db/queries.py::get_entity_graph` and its
//! private helpers (`_collect_focus_nodes`, `_append_reference_edges_full`,
//! `_append_reference_edges_limited`, `_attach_created_by_edges`). Two
//! things that sample does not implement are added here per `spec.md`
//! §4.6.1/§4.6.2: hop-bounded reference-edge BFS (`max_hops`) and
//! target-type filtering, plus the unconditional structural-edge
//! passthrough. The edge/node-label convention (edges carry entity
//! *names*, not stable_ids — `_entity_label` in the original) is kept as-is;
//! nodes separately carry `stable_id`.

use std::collections::{HashMap, HashSet, VecDeque};

use rusqlite::Connection;

use crate::error::{ErrorKind, Result, StorageError};

/// Traversal direction relative to the start entity (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Upstream,
    Downstream,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
            Direction::Both => "both",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "upstream" => Some(Direction::Upstream),
            "downstream" => Some(Direction::Downstream),
            "both" => Some(Direction::Both),
            _ => None,
        }
    }

    fn expands_reference_edges(&self) -> bool {
        matches!(self, Direction::Downstream | Direction::Both)
    }

    fn keeps_ancestors_without_edges(&self) -> bool {
        matches!(self, Direction::Upstream | Direction::Both)
    }
}

/// `app`/`test`/`all` entity filter (`spec.md` §4.6, GLOSSARY "Target type").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetTypeFilter {
    App,
    Test,
    All,
}

impl TargetTypeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetTypeFilter::App => "app",
            TargetTypeFilter::Test => "test",
            TargetTypeFilter::All => "all",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "app" => Some(TargetTypeFilter::App),
            "test" => Some(TargetTypeFilter::Test),
            "all" => Some(TargetTypeFilter::All),
            _ => None,
        }
    }

    fn passes(&self, target_type: Option<&str>) -> bool {
        match self {
            TargetTypeFilter::All => true,
            TargetTypeFilter::Test => target_type == Some("test"),
            TargetTypeFilter::App => target_type != Some("test"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Master,
    Feature,
}

impl Origin {
    fn as_str(&self) -> &'static str {
        match self {
            Origin::Master => "master",
            Origin::Feature => "feature",
        }
    }
}

#[derive(Debug)]
struct EntityRow {
    stable_id: String,
    name: String,
    kind: String,
    module: Option<String>,
    file_path: Option<String>,
    signature: Option<String>,
    member_names: Vec<String>,
    target_type: Option<String>,
    visibility: Option<String>,
    origin: Origin,
}

type RelKey = (String, Option<String>, String, Option<String>, String);

#[derive(Debug, Clone)]
struct RelationshipRow {
    source_stable_id: String,
    source_name: String,
    target_stable_id: Option<String>,
    target_name: String,
    target_module: Option<String>,
    edge_type: String,
    metadata: serde_json::Value,
    origin: Origin,
}

impl RelationshipRow {
    fn dedup_key(&self) -> RelKey {
        (
            self.source_stable_id.clone(),
            self.target_stable_id.clone(),
            self.target_name.clone(),
            self.target_module.clone(),
            self.edge_type.clone(),
        )
    }
}

/// A request to `query_graph`/`query_graph_lazy`.
pub struct GraphQuery {
    pub entity_name: String,
    pub stop_name: Option<String>,
    pub direction: Direction,
    pub include_sibling_subgraphs: bool,
    pub max_hops: Option<u32>,
    pub target_type: TargetTypeFilter,
    /// Accepted at the wire boundary, never consulted here (`spec.md` §9,
    /// `SPEC_FULL.md` §E.1: specified but disabled until a coherent
    /// semantics for module-boundary stopping is defined upstream).
    pub stop_at_module_boundary: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub edge_type: String,
    pub source: String,
    pub target: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionSummary {
    pub stable_id: String,
    pub extended_type: String,
    pub file_path: Option<String>,
    pub signature: Option<String>,
    pub visibility: Option<String>,
    pub constraints: Option<String>,
    pub conformances: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub name: String,
    pub stable_id: String,
    pub module: Option<String>,
    pub kind: String,
    pub target_type: Option<String>,
    pub visibility: Option<String>,
    pub file_path: Option<String>,
    pub signature: Option<String>,
    pub members: Vec<String>,
    pub origin: String,
    pub extensions: Vec<ExtensionSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphPayload {
    pub entity_name: String,
    pub entity_module: Option<String>,
    pub entity_kind: String,
    pub entity_stable_id: String,
    pub stop_at: Option<String>,
    pub direction: Direction,
    pub include_sibling_subgraphs: bool,
    pub max_hops: Option<u32>,
    pub target_type_filter: TargetTypeFilter,
    pub edges: Vec<GraphEdge>,
    pub nodes: Vec<GraphNode>,
}

// --- loading: fast path (materialized views, no tombstone tracking needed) ---

fn load_entities_fast(conn: &Connection, origin: Origin) -> Result<HashMap<String, EntityRow>> {
    let mut stmt = conn.prepare(
        "SELECT stable_id, name, kind, module, file_path, signature, member_names, target_type, visibility
         FROM entity_latest",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, Option<String>>(8)?,
        ))
    })?;
    let mut out = HashMap::new();
    for row in rows {
        let (stable_id, name, kind, module, file_path, signature, member_names, target_type, visibility) = row?;
        out.insert(
            stable_id.clone(),
            EntityRow {
                stable_id,
                name,
                kind,
                module,
                file_path,
                signature,
                member_names: split_member_names(member_names.as_deref()),
                target_type,
                visibility,
                origin,
            },
        );
    }
    Ok(out)
}

fn load_relationships_fast(conn: &Connection, origin: Origin) -> Result<Vec<RelationshipRow>> {
    let mut stmt = conn.prepare(
        "SELECT source_stable_id, source_name, target_stable_id, target_name, target_module, edge_type, metadata
         FROM relationship_latest",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (source_stable_id, source_name, target_stable_id, target_name, target_module, edge_type, metadata) = row?;
        out.push(RelationshipRow {
            source_stable_id,
            source_name,
            target_stable_id,
            target_name,
            target_module,
            edge_type,
            metadata: parse_metadata(metadata.as_deref()),
            origin,
        });
    }
    Ok(out)
}

// --- loading: versioned path (tombstone-aware, used for the feature overlay) ---

fn load_entities_versioned(conn: &Connection, origin: Origin) -> Result<(HashMap<String, EntityRow>, HashSet<String>)> {
    let mut stmt = conn.prepare(
        "WITH latest AS (
            SELECT entity_id, MAX(commit_id) AS commit_id FROM entity_versions GROUP BY entity_id
        )
        SELECT e.stable_id, e.name, e.kind, e.module, f.path, ev.signature, ev.properties, ev.is_deleted,
            (SELECT GROUP_CONCAT(m.name, '|') FROM members m WHERE m.entity_id = e.id)
        FROM latest
        JOIN entity_versions ev ON ev.entity_id = latest.entity_id AND ev.commit_id = latest.commit_id
        JOIN entities e ON e.id = latest.entity_id
        LEFT JOIN files f ON f.id = ev.file_id",
    )?;
    #[allow(clippy::type_complexity)]
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, i64>(7)?,
            row.get::<_, Option<String>>(8)?,
        ))
    })?;
    let mut active = HashMap::new();
    let mut tombstoned = HashSet::new();
    for row in rows {
        let (stable_id, name, kind, module, file_path, signature, properties, is_deleted, member_names) = row?;
        if is_deleted != 0 {
            tombstoned.insert(stable_id);
            continue;
        }
        let props: serde_json::Value = properties
            .as_deref()
            .and_then(|p| serde_json::from_str(p).ok())
            .unwrap_or(serde_json::Value::Null);
        let target_type = props.get("target_type").and_then(|v| v.as_str()).map(str::to_string);
        let visibility = props.get("visibility").and_then(|v| v.as_str()).map(str::to_string);
        active.insert(
            stable_id.clone(),
            EntityRow {
                stable_id,
                name,
                kind,
                module,
                file_path,
                signature,
                member_names: split_member_names(member_names.as_deref()),
                target_type,
                visibility,
                origin,
            },
        );
    }
    Ok((active, tombstoned))
}

fn load_relationships_versioned(conn: &Connection, origin: Origin) -> Result<(Vec<RelationshipRow>, HashSet<RelKey>)> {
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
        SELECT src.stable_id, src.name, tgt.stable_id, ranked.target_name, ranked.target_module,
               ranked.edge_type, ranked.metadata, ranked.is_deleted
        FROM ranked
        JOIN entities src ON src.id = ranked.source_entity_id
        LEFT JOIN entities tgt ON tgt.id = ranked.target_entity_id
        WHERE ranked.rn = 1",
    )?;
    #[allow(clippy::type_complexity)]
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, i64>(7)?,
        ))
    })?;
    let mut active = Vec::new();
    let mut tombstoned = HashSet::new();
    for row in rows {
        let (source_stable_id, source_name, target_stable_id, target_name, target_module, edge_type, metadata, is_deleted) = row?;
        let rel = RelationshipRow {
            source_stable_id,
            source_name,
            target_stable_id,
            target_name,
            target_module,
            edge_type,
            metadata: parse_metadata(metadata.as_deref()),
            origin,
        };
        if is_deleted != 0 {
            tombstoned.insert(rel.dedup_key());
        } else {
            active.push(rel);
        }
    }
    Ok((active, tombstoned))
}

fn split_member_names(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| s.split('|').filter(|p| !p.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn parse_metadata(raw: Option<&str>) -> serde_json::Value {
    raw.and_then(|m| serde_json::from_str(m).ok()).unwrap_or_else(|| serde_json::json!({}))
}

// --- overlay merge (`spec.md` §4.6 step 1, invariant 9) ---

fn merge_entities(
    master: HashMap<String, EntityRow>,
    feature: Option<(HashMap<String, EntityRow>, HashSet<String>)>,
) -> HashMap<String, EntityRow> {
    let mut merged = master;
    if let Some((feature_entities, feature_tombstoned)) = feature {
        for stable_id in &feature_tombstoned {
            merged.remove(stable_id);
        }
        for (stable_id, row) in feature_entities {
            merged.insert(stable_id, row);
        }
    }
    merged
}

fn merge_relationships(
    master: Vec<RelationshipRow>,
    feature: Option<(Vec<RelationshipRow>, HashSet<RelKey>)>,
) -> Vec<RelationshipRow> {
    let mut by_key: HashMap<RelKey, RelationshipRow> = HashMap::new();
    for rel in master {
        by_key.insert(rel.dedup_key(), rel);
    }
    if let Some((feature_rels, feature_tombstoned)) = feature {
        for key in &feature_tombstoned {
            by_key.remove(key);
        }
        for rel in feature_rels {
            by_key.insert(rel.dedup_key(), rel);
        }
    }
    by_key.into_values().collect()
}

/// `spec.md` §4.6 step 2 tie-break: feature origin wins, then module
/// ascending, then stable_id.
fn pick_by_name<'a>(entities: &'a HashMap<String, EntityRow>, name: &str) -> Option<&'a EntityRow> {
    let mut matches: Vec<&EntityRow> = entities.values().filter(|e| e.name == name).collect();
    if matches.is_empty() {
        return None;
    }
    matches.sort_by(|a, b| {
        let rank = |e: &EntityRow| if e.origin == Origin::Feature { 0 } else { 1 };
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.module.as_deref().unwrap_or("").cmp(b.module.as_deref().unwrap_or("")))
            .then_with(|| a.stable_id.cmp(&b.stable_id))
    });
    Some(matches[0])
}

/// The public entry point for the default (fast/general) path: loads the
/// master store's materialized views, optionally overlays a feature store
/// loaded tombstone-aware from its versioned tables, and builds the
/// centered-graph payload.
pub fn query_graph(master: &Connection, feature: Option<&Connection>, query: &GraphQuery) -> Result<GraphPayload> {
    let master_entities = load_entities_fast(master, Origin::Master)?;
    let master_rels = load_relationships_fast(master, Origin::Master)?;

    let (entities, relationships) = match feature {
        Some(feature_conn) => {
            let (feature_entities, feature_tombstoned) = load_entities_versioned(feature_conn, Origin::Feature)?;
            let (feature_rels, feature_rel_tombstoned) = load_relationships_versioned(feature_conn, Origin::Feature)?;
            (
                merge_entities(master_entities, Some((feature_entities, feature_tombstoned))),
                merge_relationships(master_rels, Some((feature_rels, feature_rel_tombstoned))),
            )
        }
        None => (master_entities, master_rels),
    };

    assemble_payload(master, feature, &entities, &relationships, query)
}

/// Lazy path (`spec.md` §4.6.2): BFS outward from the start entity, loading
/// neighbor entities and their edges on demand from `relationship_latest`
/// rather than bulk-loading the whole store. Master-only; does not support
/// sibling-subgraph expansion.
pub fn query_graph_lazy(master: &Connection, query: &GraphQuery) -> Result<GraphPayload> {
    if query.include_sibling_subgraphs {
        return Err(StorageError::new(
            ErrorKind::Schema,
            "the lazy graph path does not support include_sibling_subgraphs",
        ));
    }

    let start = load_entity_by_name_fast(master, &query.entity_name)?
        .ok_or_else(|| StorageError::not_found(query.entity_name.clone()))?;
    if !query.target_type.passes(start.target_type.as_deref()) {
        return Err(StorageError::filter_mismatch(query.entity_name.clone(), query.target_type.as_str()));
    }

    let mut entities: HashMap<String, EntityRow> = HashMap::new();
    entities.insert(start.stable_id.clone(), start.clone());
    if let Some(stop_name) = &query.stop_name {
        if let Some(stop_row) = load_entity_by_name_fast(master, stop_name)? {
            entities.insert(stop_row.stable_id.clone(), stop_row);
        }
    }

    let mut relationships: Vec<RelationshipRow> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.stable_id.clone());
    let mut frontier = vec![start.stable_id.clone()];
    let hop_cap = query.max_hops.unwrap_or(u32::MAX);
    let mut hop = 0;
    while hop < hop_cap && !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        for node_id in &frontier {
            let touching = load_relationships_touching(master, node_id)?;
            for rel in touching {
                let neighbor = other_endpoint(&rel, node_id);
                if let Some(neighbor_id) = &neighbor {
                    if !entities.contains_key(neighbor_id) {
                        if let Some(row) = load_entity_by_stable_id_fast(master, neighbor_id)? {
                            entities.insert(neighbor_id.clone(), row);
                        }
                    }
                    if visited.insert(neighbor_id.clone()) {
                        next_frontier.push(neighbor_id.clone());
                    }
                }
                relationships.push(rel);
            }
        }
        frontier = next_frontier;
        hop += 1;
    }

    assemble_payload(master, None, &entities, &relationships, query)
}

fn other_endpoint(rel: &RelationshipRow, node_id: &str) -> Option<String> {
    if rel.source_stable_id == node_id {
        rel.target_stable_id.clone()
    } else {
        Some(rel.source_stable_id.clone())
    }
}

fn load_entity_by_name_fast(conn: &Connection, name: &str) -> Result<Option<EntityRow>> {
    let entities = load_entities_fast(conn, Origin::Master)?;
    Ok(pick_by_name(&entities, name).cloned())
}

fn load_entity_by_stable_id_fast(conn: &Connection, stable_id: &str) -> Result<Option<EntityRow>> {
    let mut stmt = conn.prepare(
        "SELECT stable_id, name, kind, module, file_path, signature, member_names, target_type, visibility
         FROM entity_latest WHERE stable_id = ?1",
    )?;
    let mut rows = stmt.query(rusqlite::params![stable_id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(EntityRow {
            stable_id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            module: row.get(3)?,
            file_path: row.get(4)?,
            signature: row.get(5)?,
            member_names: split_member_names(row.get::<_, Option<String>>(6)?.as_deref()),
            target_type: row.get(7)?,
            visibility: row.get(8)?,
            origin: Origin::Master,
        }))
    } else {
        Ok(None)
    }
}

fn load_relationships_touching(conn: &Connection, stable_id: &str) -> Result<Vec<RelationshipRow>> {
    let mut stmt = conn.prepare(
        "SELECT source_stable_id, source_name, target_stable_id, target_name, target_module, edge_type, metadata
         FROM relationship_latest WHERE source_stable_id = ?1 OR target_stable_id = ?1",
    )?;
    let rows = stmt.query_map(rusqlite::params![stable_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (source_stable_id, source_name, target_stable_id, target_name, target_module, edge_type, metadata) = row?;
        out.push(RelationshipRow {
            source_stable_id,
            source_name,
            target_stable_id,
            target_name,
            target_module,
            edge_type,
            metadata: parse_metadata(metadata.as_deref()),
            origin: Origin::Master,
        });
    }
    Ok(out)
}

impl Clone for EntityRow {
    fn clone(&self) -> Self {
        Self {
            stable_id: self.stable_id.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            module: self.module.clone(),
            file_path: self.file_path.clone(),
            signature: self.signature.clone(),
            member_names: self.member_names.clone(),
            target_type: self.target_type.clone(),
            visibility: self.visibility.clone(),
            origin: self.origin,
        }
    }
}

// --- payload assembly (`spec.md` §4.6.1) ---

/// Internal accumulator mirroring the original's `edges`/`edge_keys`/
/// `nodes_included` triple, threaded through edge emission.
struct PayloadBuilder<'a> {
    entities: &'a HashMap<String, EntityRow>,
    stop_id: Option<&'a str>,
    edges: Vec<GraphEdge>,
    edge_keys: HashSet<(String, String, String, String)>,
    nodes_included: HashSet<String>,
}

impl<'a> PayloadBuilder<'a> {
    fn label(&self, stable_id: Option<&str>, fallback: &str) -> String {
        stable_id
            .and_then(|id| self.entities.get(id))
            .map(|e| e.name.clone())
            .unwrap_or_else(|| fallback.to_string())
    }

    fn add_node(&mut self, stable_id: &str) {
        if Some(stable_id) == self.stop_id {
            return;
        }
        self.nodes_included.insert(stable_id.to_string());
    }

    fn append_reference_edge(&mut self, rel: &RelationshipRow) {
        let key = (
            rel.source_stable_id.clone(),
            rel.target_stable_id.clone().unwrap_or_default(),
            rel.target_name.clone(),
            rel.edge_type.clone(),
        );
        if !self.edge_keys.insert(key) {
            return;
        }
        let mut metadata = rel.metadata.clone();
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert("origin".to_string(), serde_json::json!(rel.origin.as_str()));
        }
        let source_label = self.label(Some(&rel.source_stable_id), &rel.source_name);
        let target_label = self.label(rel.target_stable_id.as_deref(), &rel.target_name);
        self.edges.push(GraphEdge {
            edge_type: rel.edge_type.clone(),
            source: source_label,
            target: target_label,
            metadata,
        });
        self.add_node(&rel.source_stable_id);
        if let Some(target_id) = &rel.target_stable_id {
            self.add_node(target_id);
        }
    }

    fn append_created_by_edge(&mut self, rel: &RelationshipRow) {
        let child_key = rel.target_stable_id.clone().unwrap_or_else(|| rel.target_name.clone());
        let key = ("createdBy".to_string(), child_key, rel.source_stable_id.clone(), String::new());
        if !self.edge_keys.insert(key) {
            return;
        }
        let mut metadata = rel.metadata.clone();
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert("origin".to_string(), serde_json::json!(rel.origin.as_str()));
            obj.insert("creator".to_string(), serde_json::json!(rel.source_name));
        }
        let child_label = self.label(rel.target_stable_id.as_deref(), &rel.target_name);
        let parent_label = self.label(Some(&rel.source_stable_id), &rel.source_name);
        self.edges.push(GraphEdge {
            edge_type: "createdBy".to_string(),
            source: child_label,
            target: parent_label,
            metadata,
        });
        if let Some(child_id) = &rel.target_stable_id {
            self.add_node(child_id);
        }
        self.add_node(&rel.source_stable_id);
    }
}

fn assemble_payload(
    master: &Connection,
    feature: Option<&Connection>,
    entities: &HashMap<String, EntityRow>,
    relationships: &[RelationshipRow],
    query: &GraphQuery,
) -> Result<GraphPayload> {
    let start = pick_by_name(entities, &query.entity_name)
        .ok_or_else(|| StorageError::not_found(query.entity_name.clone()))?;
    if !query.target_type.passes(start.target_type.as_deref()) {
        return Err(StorageError::filter_mismatch(query.entity_name.clone(), query.target_type.as_str()));
    }
    let stop = query.stop_name.as_deref().and_then(|name| pick_by_name(entities, name));
    let start_id = start.stable_id.clone();
    let stop_id = stop.map(|e| e.stable_id.clone());

    if query.max_hops == Some(0) {
        let node = serialize_node(master, feature, start)?;
        return Ok(GraphPayload {
            entity_name: start.name.clone(),
            entity_module: start.module.clone(),
            entity_kind: start.kind.clone(),
            entity_stable_id: start.stable_id.clone(),
            stop_at: stop.map(|e| e.name.clone()),
            direction: query.direction,
            include_sibling_subgraphs: query.include_sibling_subgraphs,
            max_hops: query.max_hops,
            target_type_filter: query.target_type,
            edges: Vec::new(),
            nodes: vec![node],
        });
    }

    let passes = |id: &str| -> bool {
        entities.get(id).map(|e| query.target_type.passes(e.target_type.as_deref())).unwrap_or(false)
    };
    let relevant: Vec<&RelationshipRow> = relationships
        .iter()
        .filter(|r| passes(&r.source_stable_id) && r.target_stable_id.as_deref().map(passes).unwrap_or(true))
        .collect();

    let mut creates_by_child: HashMap<String, Vec<&RelationshipRow>> = HashMap::new();
    let mut refs_outgoing: HashMap<String, Vec<&RelationshipRow>> = HashMap::new();
    let mut refs_incoming: HashMap<String, Vec<&RelationshipRow>> = HashMap::new();
    let mut reference_edges: Vec<&RelationshipRow> = Vec::new();
    let mut structural_edges: Vec<&RelationshipRow> = Vec::new();
    for rel in &relevant {
        if rel.edge_type == "creates" {
            if let Some(target) = &rel.target_stable_id {
                creates_by_child.entry(target.clone()).or_default().push(rel);
            }
        } else {
            reference_edges.push(rel);
            refs_outgoing.entry(rel.source_stable_id.clone()).or_default().push(rel);
            if let Some(target) = &rel.target_stable_id {
                refs_incoming.entry(target.clone()).or_default().push(rel);
            }
            if rel.edge_type == "superclass" || rel.edge_type == "conforms" {
                structural_edges.push(rel);
            }
        }
    }

    let focus = collect_focus_nodes(&start_id, stop_id.as_deref(), &creates_by_child);

    let mut display_nodes: HashSet<String> = focus.clone();
    for rel in &reference_edges {
        let source_in_focus = focus.contains(&rel.source_stable_id);
        let target_in_focus = rel.target_stable_id.as_ref().map(|t| focus.contains(t)).unwrap_or(false);
        if source_in_focus || target_in_focus {
            display_nodes.insert(rel.source_stable_id.clone());
            if let Some(target) = &rel.target_stable_id {
                display_nodes.insert(target.clone());
            }
        }
    }

    let mut builder = PayloadBuilder {
        entities,
        stop_id: stop_id.as_deref(),
        edges: Vec::new(),
        edge_keys: HashSet::new(),
        nodes_included: HashSet::new(),
    };

    let hop_cap = query.max_hops.unwrap_or(u32::MAX);

    if query.include_sibling_subgraphs {
        bfs_reference_edges(&start_id, &refs_outgoing, &refs_incoming, hop_cap, &mut display_nodes, &mut builder);
        attach_created_by_edges(&display_nodes, &creates_by_child, &mut builder);
    } else {
        attach_created_by_edges(&display_nodes, &creates_by_child, &mut builder);
        if query.direction.expands_reference_edges() {
            bfs_reference_edges_from_set(&focus, &refs_outgoing, &refs_incoming, hop_cap, &mut display_nodes, &mut builder);
        }
    }

    if query.direction.keeps_ancestors_without_edges() && !query.include_sibling_subgraphs {
        for node_id in &focus {
            if stop_id.as_deref() != Some(node_id.as_str()) {
                builder.nodes_included.insert(node_id.clone());
            }
        }
    }

    for rel in &structural_edges {
        if display_nodes.contains(&rel.source_stable_id) || builder.nodes_included.contains(&rel.source_stable_id) {
            builder.append_reference_edge(rel);
        }
    }

    if stop_id.as_deref() != Some(start_id.as_str()) {
        builder.nodes_included.insert(start_id.clone());
    }

    let mut stable_ids: Vec<&String> = builder.nodes_included.iter().filter(|id| entities.contains_key(*id)).collect();
    stable_ids.sort_by(|a, b| entities[*a].name.cmp(&entities[*b].name).then_with(|| a.cmp(b)));

    let mut nodes = Vec::with_capacity(stable_ids.len());
    for stable_id in stable_ids {
        nodes.push(serialize_node(master, feature, &entities[stable_id])?);
    }

    Ok(GraphPayload {
        entity_name: start.name.clone(),
        entity_module: start.module.clone(),
        entity_kind: start.kind.clone(),
        entity_stable_id: start.stable_id.clone(),
        stop_at: stop.map(|e| e.name.clone()),
        direction: query.direction,
        include_sibling_subgraphs: query.include_sibling_subgraphs,
        max_hops: query.max_hops,
        target_type_filter: query.target_type,
        edges: builder.edges,
        nodes,
    })
}

/// Walk `creates_by_child` upward from `start_id`, stopping at `stop_id`
/// (`spec.md` §4.6.1 "Focus nodes").
fn collect_focus_nodes(
    start_id: &str,
    stop_id: Option<&str>,
    creates_by_child: &HashMap<String, Vec<&RelationshipRow>>,
) -> HashSet<String> {
    let mut focus = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(start_id.to_string());
    while let Some(node_id) = queue.pop_front() {
        if focus.contains(&node_id) {
            continue;
        }
        focus.insert(node_id.clone());
        if let Some(rels) = creates_by_child.get(&node_id) {
            for rel in rels {
                let parent_id = rel.source_stable_id.clone();
                if !focus.contains(&parent_id) {
                    focus.insert(parent_id.clone());
                    if stop_id != Some(parent_id.as_str()) {
                        queue.push_back(parent_id);
                    }
                }
            }
        }
    }
    focus
}

fn attach_created_by_edges(
    display_nodes: &HashSet<String>,
    creates_by_child: &HashMap<String, Vec<&RelationshipRow>>,
    builder: &mut PayloadBuilder,
) {
    for node_id in display_nodes {
        if let Some(rels) = creates_by_child.get(node_id) {
            for rel in rels {
                builder.append_created_by_edge(rel);
            }
        }
    }
}

/// Mode A: hop-bounded BFS seeded from every focus node at once
/// (`spec.md` §4.6.1 Mode A, generalized with `max_hops`; the teacher's
/// sample has no hop bound and treats this as a single unbounded pass).
fn bfs_reference_edges_from_set(
    focus: &HashSet<String>,
    refs_outgoing: &HashMap<String, Vec<&RelationshipRow>>,
    refs_incoming: &HashMap<String, Vec<&RelationshipRow>>,
    hop_cap: u32,
    display_nodes: &mut HashSet<String>,
    builder: &mut PayloadBuilder,
) {
    let mut visited: HashSet<String> = focus.clone();
    let mut frontier: Vec<String> = focus.iter().cloned().collect();
    let mut hop = 0;
    while hop < hop_cap && !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        for node_id in &frontier {
            for rel in refs_outgoing.get(node_id).into_iter().flatten() {
                builder.append_reference_edge(rel);
                if let Some(target) = &rel.target_stable_id {
                    if visited.insert(target.clone()) {
                        display_nodes.insert(target.clone());
                        next_frontier.push(target.clone());
                    }
                }
            }
            for rel in refs_incoming.get(node_id).into_iter().flatten() {
                builder.append_reference_edge(rel);
                if visited.insert(rel.source_stable_id.clone()) {
                    display_nodes.insert(rel.source_stable_id.clone());
                    next_frontier.push(rel.source_stable_id.clone());
                }
            }
        }
        frontier = next_frontier;
        hop += 1;
    }
}

/// Mode B: full bidirectional reference-edge BFS from the start node alone
/// (`spec.md` §4.6.1 Mode B), hop-bounded the same way as Mode A.
fn bfs_reference_edges(
    start_id: &str,
    refs_outgoing: &HashMap<String, Vec<&RelationshipRow>>,
    refs_incoming: &HashMap<String, Vec<&RelationshipRow>>,
    hop_cap: u32,
    display_nodes: &mut HashSet<String>,
    builder: &mut PayloadBuilder,
) {
    let seed: HashSet<String> = std::iter::once(start_id.to_string()).collect();
    bfs_reference_edges_from_set(&seed, refs_outgoing, refs_incoming, hop_cap, display_nodes, builder);
}

fn serialize_node(master: &Connection, feature: Option<&Connection>, entity: &EntityRow) -> Result<GraphNode> {
    let conn = match entity.origin {
        Origin::Feature => feature.unwrap_or(master),
        Origin::Master => master,
    };
    let extensions = load_extensions(conn, &entity.stable_id)?;
    Ok(GraphNode {
        name: entity.name.clone(),
        stable_id: entity.stable_id.clone(),
        module: entity.module.clone(),
        kind: entity.kind.clone(),
        target_type: entity.target_type.clone(),
        visibility: entity.visibility.clone(),
        file_path: entity.file_path.clone(),
        signature: entity.signature.clone(),
        members: entity.member_names.clone(),
        origin: entity.origin.as_str().to_string(),
        extensions,
    })
}

fn load_extensions(conn: &Connection, entity_stable_id: &str) -> Result<Vec<ExtensionSummary>> {
    let mut stmt = conn.prepare(
        "SELECT stable_id, extended_type, file_path, signature, visibility, constraints, conformances
         FROM extension_latest WHERE entity_stable_id = ?1 ORDER BY stable_id",
    )?;
    let rows = stmt.query_map(rusqlite::params![entity_stable_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (stable_id, extended_type, file_path, signature, visibility, constraints, conformances) = row?;
        let conformances: Vec<String> = conformances
            .as_deref()
            .and_then(|c| serde_json::from_str(c).ok())
            .unwrap_or_default();
        out.push(ExtensionSummary {
            stable_id,
            extended_type,
            file_path,
            signature,
            visibility,
            constraints,
            conformances,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;
    use std::collections::HashMap as Map;
    use swiftgraph_core::{EdgeType, EntityKind, EntityRecord, RelationshipRecord};

    fn entity(name: &str, stable_id: &str, file: &str) -> EntityRecord {
        EntityRecord {
            stable_id: stable_id.to_string(),
            name: name.to_string(),
            kind: EntityKind::Class,
            module: "MyModule".to_string(),
            language: "swift".to_string(),
            file_path: file.to_string(),
            start_line: 1,
            end_line: 10,
            signature: format!("class {name}"),
            docstring: None,
            code: format!("class {name} {{}}"),
            members: Vec::new(),
            properties: Map::new(),
        }
    }

    fn rel(source: &str, target: &str, edge_type: EdgeType) -> RelationshipRecord {
        RelationshipRecord {
            source_stable_id: source.to_string(),
            target_name: target.to_string(),
            target_module: Some("MyModule".to_string()),
            edge_type,
            metadata: Map::new(),
        }
    }

    #[test]
    fn max_hops_zero_returns_solitary_start_node() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        let ids = repo
            .persist_entities(commit, &[entity("A", "stable-a", "A.swift"), entity("B", "stable-b", "B.swift")])
            .unwrap();
        repo.persist_relationships(commit, &ids, &[rel("stable-a", "B", EdgeType::StrongReference)]).unwrap();
        repo.rebuild_latest_tables().unwrap();

        let payload = query_graph(
            repo.connection(),
            None,
            &GraphQuery {
                entity_name: "A".to_string(),
                stop_name: None,
                direction: Direction::Both,
                include_sibling_subgraphs: false,
                max_hops: Some(0),
                target_type: TargetTypeFilter::All,
                stop_at_module_boundary: None,
            },
        )
        .unwrap();
        assert_eq!(payload.nodes.len(), 1);
        assert!(payload.edges.is_empty());
        assert_eq!(payload.nodes[0].name, "A");
    }

    #[test]
    fn max_hops_one_stops_chain_expansion() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        let ids = repo
            .persist_entities(
                commit,
                &[
                    entity("A", "stable-a", "A.swift"),
                    entity("B", "stable-b", "B.swift"),
                    entity("C", "stable-c", "C.swift"),
                    entity("D", "stable-d", "D.swift"),
                ],
            )
            .unwrap();
        repo.persist_relationships(commit, &ids, &[rel("stable-a", "B", EdgeType::StrongReference)]).unwrap();
        repo.persist_relationships(commit, &ids, &[rel("stable-b", "C", EdgeType::StrongReference)]).unwrap();
        repo.persist_relationships(commit, &ids, &[rel("stable-c", "D", EdgeType::StrongReference)]).unwrap();
        repo.rebuild_latest_tables().unwrap();

        let payload = query_graph(
            repo.connection(),
            None,
            &GraphQuery {
                entity_name: "A".to_string(),
                stop_name: None,
                direction: Direction::Both,
                include_sibling_subgraphs: true,
                max_hops: Some(1),
                target_type: TargetTypeFilter::All,
                stop_at_module_boundary: None,
            },
        )
        .unwrap();
        assert!(payload.edges.iter().any(|e| e.source == "A" && e.target == "B"));
        assert!(!payload.edges.iter().any(|e| e.source == "B" && e.target == "C"));
        assert!(!payload.edges.iter().any(|e| e.source == "C" && e.target == "D"));
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let repo = Repository::open_in_memory().unwrap();
        let err = query_graph(
            repo.connection(),
            None,
            &GraphQuery {
                entity_name: "Ghost".to_string(),
                stop_name: None,
                direction: Direction::Both,
                include_sibling_subgraphs: false,
                max_hops: None,
                target_type: TargetTypeFilter::All,
                stop_at_module_boundary: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn target_type_filter_rejects_test_start_entity_under_app() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        let mut record = entity("PresenterTests", "stable-pt", "PresenterTests.swift");
        record.properties.insert("target_type".to_string(), serde_json::json!("test"));
        repo.persist_entities(commit, &[record]).unwrap();
        repo.rebuild_latest_tables().unwrap();

        let err = query_graph(
            repo.connection(),
            None,
            &GraphQuery {
                entity_name: "PresenterTests".to_string(),
                stop_name: None,
                direction: Direction::Both,
                include_sibling_subgraphs: false,
                max_hops: None,
                target_type: TargetTypeFilter::App,
                stop_at_module_boundary: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FilterMismatch);
    }

    #[test]
    fn stop_node_excluded_but_created_by_edge_references_it() {
        let mut repo = Repository::open_in_memory().unwrap();
        let commit = repo.record_commit("c1", None, "master", true).unwrap();
        let ids = repo
            .persist_entities(
                commit,
                &[
                    entity("Assembly", "stable-assembly", "Assembly.swift"),
                    entity("Presenter", "stable-presenter", "Presenter.swift"),
                    entity("View", "stable-view", "View.swift"),
                ],
            )
            .unwrap();
        repo.persist_relationships(commit, &ids, &[rel("stable-assembly", "Presenter", EdgeType::Creates)]).unwrap();
        repo.persist_relationships(commit, &ids, &[rel("stable-assembly", "View", EdgeType::Creates)]).unwrap();
        repo.persist_relationships(commit, &ids, &[rel("stable-view", "Presenter", EdgeType::StrongReference)]).unwrap();
        repo.rebuild_latest_tables().unwrap();

        let payload = query_graph(
            repo.connection(),
            None,
            &GraphQuery {
                entity_name: "View".to_string(),
                stop_name: Some("Assembly".to_string()),
                direction: Direction::Both,
                include_sibling_subgraphs: false,
                max_hops: None,
                target_type: TargetTypeFilter::All,
                stop_at_module_boundary: None,
            },
        )
        .unwrap();
        assert!(!payload.nodes.iter().any(|n| n.name == "Assembly"));
        assert!(payload.edges.iter().any(|e| e.source == "View" && e.target == "Assembly" && e.edge_type == "createdBy"));
        assert!(payload.edges.iter().any(|e| e.source == "Presenter" && e.target == "Assembly" && e.edge_type == "createdBy"));
        assert!(payload.nodes.iter().any(|n| n.name == "Presenter"));
    }
}
