//! Swift source parser (`spec.md` §4.4).
//!
//! Three passes over one tree-sitter tree: entity collection, extension
//! collection, then relationship derivation (property/creation/inheritance
//! edges) against the results of the first two. Grounded on
//! `original_source/indexer/swift_parser.py`, generalized per `spec.md` §4.4
//! for extension and inheritance/conformance handling the original sample
//! doesn't show.

mod extract;
mod registry;

use std::collections::HashMap;
use std::path::Path;

use tree_sitter::Node;

use crate::error::Result;
use crate::hash::stable_id;
use crate::model::{
    EdgeType, EntityKind, EntityRecord, ExtensionRecord, MemberKind, MemberRecord, ParsedSource,
    RelationshipRecord,
};
use crate::resolver::ModuleResolver;
use crate::ts;

use extract::{
    extract_visibility, find_created_types, header_of, match_property_decl, parse_inheritance_clause,
    signature_of,
};
use registry::{KnownKind, TypeRegistry};

const ENTITY_NODE_TYPES: [&str; 5] = [
    "class_declaration",
    "struct_declaration",
    "enum_declaration",
    "protocol_declaration",
    "extension_declaration",
];

const MEMBER_NODE_TYPES: [&str; 8] = [
    "function_declaration",
    "initializer_declaration",
    "deinitializer_declaration",
    "subscript_declaration",
    "variable_declaration",
    "property_declaration",
    "constant_declaration",
    "typealias_declaration",
];

struct EntityContext {
    record: EntityRecord,
    inherited: Vec<String>,
}

struct ExtensionContext {
    record: ExtensionRecord,
    source_stable_id: String,
}

/// Walks a tree-sitter syntax tree to extract entities, members, extensions,
/// and relationships. The `TypeRegistry` persists across calls to `parse` on
/// the same instance, so later files in an indexing pass benefit from types
/// seen earlier (`spec.md` §4.4 TypeRegistry).
pub struct SwiftParser {
    parser: tree_sitter::Parser,
    resolver: ModuleResolver,
    registry: TypeRegistry,
}

impl SwiftParser {
    pub fn new(project_root: Option<&Path>) -> Result<Self> {
        let parser = ts::new_parser()?;
        let resolver = match project_root {
            Some(root) => ModuleResolver::from_project_root(root)?,
            None => ModuleResolver::empty(),
        };
        Ok(Self {
            parser,
            resolver,
            registry: TypeRegistry::new(),
        })
    }

    /// Construct a parser with an already-built resolver (the indexer keeps
    /// one resolver per pass and wires it into a fresh parser otherwise).
    pub fn with_resolver(resolver: ModuleResolver) -> Result<Self> {
        Ok(Self {
            parser: ts::new_parser()?,
            resolver,
            registry: TypeRegistry::new(),
        })
    }

    pub fn parse(&mut self, source: &str, path: &Path) -> Result<ParsedSource> {
        let tree = ts::parse_source(&mut self.parser, source)?;
        let bytes = source.as_bytes();
        let root = tree.root_node();
        let (module, target_type) = self.resolver.resolve(path);
        let path_string = path.to_string_lossy().to_string();

        let mut entity_contexts = Vec::new();
        let mut extension_contexts = Vec::new();
        for node in ts::walk_preorder(root) {
            if !ENTITY_NODE_TYPES.contains(&node.kind()) {
                continue;
            }
            if node.kind() == "extension_declaration" {
                if let Some(ctx) = self.extract_extension(node, bytes, &path_string, &module, &target_type) {
                    extension_contexts.push(ctx);
                }
            } else if let Some(ctx) = self.extract_entity(node, bytes, &path_string, &module, &target_type) {
                entity_contexts.push(ctx);
            }
        }

        let mut relationships = Vec::new();
        for ctx in &entity_contexts {
            relationships.extend(self.derive_entity_relationships(ctx));
        }
        for ctx in &extension_contexts {
            relationships.extend(derive_extension_relationships(ctx));
        }

        Ok(ParsedSource {
            entities: entity_contexts.into_iter().map(|ctx| ctx.record).collect(),
            extensions: extension_contexts.into_iter().map(|ctx| ctx.record).collect(),
            relationships,
        })
    }

    fn extract_entity(
        &mut self,
        node: Node,
        bytes: &[u8],
        path: &str,
        module: &str,
        target_type: &str,
    ) -> Option<EntityContext> {
        let name = extract_name(node, bytes)?;
        let code = ts::node_text(node, bytes).to_string();
        let header = header_of(&code).to_string();
        let kind = derive_entity_kind(&header, node.kind())?;
        let start_line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;
        let id = stable_id("swift", module, &name);
        let members = extract_members(node, bytes);
        let visibility = extract_visibility(&header);
        let (inherited, _where_clause) = parse_inheritance_clause(&header);

        let mut properties: HashMap<String, serde_json::Value> = HashMap::new();
        properties.insert("visibility".to_string(), serde_json::json!(visibility));
        properties.insert("target_type".to_string(), serde_json::json!(target_type));
        properties.insert("member_count".to_string(), serde_json::json!(members.len()));

        self.registry.register(&name, known_kind_of(kind), &id);

        let record = EntityRecord {
            stable_id: id,
            name,
            kind,
            module: module.to_string(),
            language: "swift".to_string(),
            file_path: path.to_string(),
            start_line,
            end_line,
            signature: signature_of(&code),
            docstring: None,
            code,
            members,
            properties,
        };
        Some(EntityContext { record, inherited })
    }

    fn extract_extension(
        &mut self,
        node: Node,
        bytes: &[u8],
        path: &str,
        module: &str,
        target_type: &str,
    ) -> Option<ExtensionContext> {
        let extended_type = extract_name(node, bytes)?;
        let code = ts::node_text(node, bytes).to_string();
        let header = header_of(&code).to_string();
        let start_line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;
        let stable_name = format!("{extended_type}::extension::{path}:{start_line}");
        let id = stable_id("swift", module, &stable_name);
        let members = extract_members(node, bytes);
        let visibility = extract_visibility(&header);
        let (conformances, where_clause) = parse_inheritance_clause(&header);

        let mut properties: HashMap<String, serde_json::Value> = HashMap::new();
        properties.insert("target_type".to_string(), serde_json::json!(target_type));
        properties.insert("member_count".to_string(), serde_json::json!(members.len()));

        let source_stable_id = self
            .registry
            .stable_id_for(&extended_type)
            .map(|s| s.to_string())
            .unwrap_or_else(|| id.clone());

        let record = ExtensionRecord {
            stable_id: id,
            extended_type,
            module: module.to_string(),
            language: "swift".to_string(),
            file_path: path.to_string(),
            start_line,
            end_line,
            signature: signature_of(&code),
            code,
            visibility,
            constraints: where_clause,
            conformances,
            members,
            properties,
        };
        Some(ExtensionContext {
            record,
            source_stable_id,
        })
    }

    /// Property/creation/inheritance edges for one entity (`spec.md` §4.4 Pass 3).
    fn derive_entity_relationships(&self, ctx: &EntityContext) -> Vec<RelationshipRecord> {
        let mut rels = Vec::new();
        rels.extend(property_relationships(
            &ctx.record.stable_id,
            &ctx.record.module,
            &ctx.record.members,
            false,
        ));
        rels.extend(creation_relationships(&ctx.record.stable_id, &ctx.record.module, &ctx.record.members));
        rels.extend(self.inheritance_relationships(ctx));
        rels
    }

    fn inheritance_relationships(&self, ctx: &EntityContext) -> Vec<RelationshipRecord> {
        if ctx.inherited.is_empty() {
            return Vec::new();
        }
        let source_id = &ctx.record.stable_id;
        let module = &ctx.record.module;
        if ctx.record.kind != EntityKind::Class {
            return ctx
                .inherited
                .iter()
                .map(|name| conforms_edge(source_id, module, name, false))
                .collect();
        }

        let superclass_idx = ctx.inherited.iter().position(|name| self.registry.is_known_class(name));
        let chosen_idx = superclass_idx.unwrap_or(0);
        let assumed = superclass_idx.is_none();

        let mut rels = Vec::with_capacity(ctx.inherited.len());
        let mut metadata = HashMap::new();
        if assumed {
            metadata.insert("assumed".to_string(), "true".to_string());
        }
        rels.push(RelationshipRecord {
            source_stable_id: source_id.clone(),
            target_name: ctx.inherited[chosen_idx].clone(),
            target_module: Some(module.clone()),
            edge_type: EdgeType::Superclass,
            metadata,
        });
        for (idx, name) in ctx.inherited.iter().enumerate() {
            if idx == chosen_idx {
                continue;
            }
            rels.push(conforms_edge(source_id, module, name, false));
        }
        rels
    }
}

fn derive_extension_relationships(ctx: &ExtensionContext) -> Vec<RelationshipRecord> {
    let mut rels = Vec::new();
    rels.extend(property_relationships(
        &ctx.source_stable_id,
        &ctx.record.module,
        &ctx.record.members,
        true,
    ));
    rels.extend(creation_relationships(&ctx.source_stable_id, &ctx.record.module, &ctx.record.members));
    for conformance in &ctx.record.conformances {
        rels.push(conforms_edge(&ctx.source_stable_id, &ctx.record.module, conformance, true));
    }
    rels
}

fn property_relationships(
    source_stable_id: &str,
    module: &str,
    members: &[MemberRecord],
    declared_via_extension: bool,
) -> Vec<RelationshipRecord> {
    let mut rels = Vec::new();
    for member in members.iter().filter(|m| m.kind.is_storage()) {
        let Some(matched) = match_property_decl(&member.code) else {
            continue;
        };
        let edge_type = if matched.is_weak {
            EdgeType::WeakReference
        } else {
            EdgeType::StrongReference
        };
        let mut metadata = HashMap::new();
        metadata.insert("member".to_string(), member.name.clone());
        metadata.insert("storage".to_string(), "property".to_string());
        metadata.insert("accessor".to_string(), member.kind.as_str().to_string());
        metadata.insert(
            "strength".to_string(),
            if matched.is_weak { "weak" } else { "strong" }.to_string(),
        );
        if declared_via_extension {
            metadata.insert("declaredVia".to_string(), "extension".to_string());
        }
        rels.push(RelationshipRecord {
            source_stable_id: source_stable_id.to_string(),
            target_name: matched.normalized_type,
            target_module: Some(module.to_string()),
            edge_type,
            metadata,
        });
    }
    rels
}

fn creation_relationships(source_stable_id: &str, module: &str, members: &[MemberRecord]) -> Vec<RelationshipRecord> {
    let mut rels = Vec::new();
    for member in members.iter().filter(|m| m.kind.is_callable()) {
        let mut created: Vec<String> = find_created_types(&member.code).into_iter().collect();
        created.sort();
        for type_name in created {
            let mut metadata = HashMap::new();
            metadata.insert("member".to_string(), member.name.clone());
            rels.push(RelationshipRecord {
                source_stable_id: source_stable_id.to_string(),
                target_name: type_name,
                target_module: Some(module.to_string()),
                edge_type: EdgeType::Creates,
                metadata,
            });
        }
    }
    rels
}

fn conforms_edge(source_stable_id: &str, module: &str, target_name: &str, declared_via_extension: bool) -> RelationshipRecord {
    let mut metadata = HashMap::new();
    if declared_via_extension {
        metadata.insert("declaredVia".to_string(), "extension".to_string());
    }
    RelationshipRecord {
        source_stable_id: source_stable_id.to_string(),
        target_name: target_name.to_string(),
        target_module: Some(module.to_string()),
        edge_type: EdgeType::Conforms,
        metadata,
    }
}

fn known_kind_of(kind: EntityKind) -> KnownKind {
    match kind {
        EntityKind::Class => KnownKind::Class,
        EntityKind::Struct => KnownKind::Struct,
        EntityKind::Enum => KnownKind::Enum,
        EntityKind::Protocol => KnownKind::Protocol,
        EntityKind::Extension => unreachable!("extensions are never classified as entity kinds"),
    }
}

fn derive_entity_kind(header: &str, node_kind: &str) -> Option<EntityKind> {
    let keyword = header.trim_start().split_whitespace().next().unwrap_or("");
    match keyword {
        "struct" => Some(EntityKind::Struct),
        "class" => Some(EntityKind::Class),
        "enum" => Some(EntityKind::Enum),
        "protocol" => Some(EntityKind::Protocol),
        _ => match node_kind {
            "class_declaration" => Some(EntityKind::Class),
            "struct_declaration" => Some(EntityKind::Struct),
            "enum_declaration" => Some(EntityKind::Enum),
            "protocol_declaration" => Some(EntityKind::Protocol),
            _ => None,
        },
    }
}

fn member_kind_of(node_kind: &str) -> Option<MemberKind> {
    match node_kind {
        "function_declaration" => Some(MemberKind::Function),
        "initializer_declaration" => Some(MemberKind::Initializer),
        "deinitializer_declaration" => Some(MemberKind::Deinitializer),
        "subscript_declaration" => Some(MemberKind::Subscript),
        "variable_declaration" => Some(MemberKind::Variable),
        "property_declaration" => Some(MemberKind::Property),
        "constant_declaration" => Some(MemberKind::Constant),
        "typealias_declaration" => Some(MemberKind::Typealias),
        _ => None,
    }
}

fn extract_members(entity_node: Node, bytes: &[u8]) -> Vec<MemberRecord> {
    let mut out = Vec::new();
    for child in ts::walk_preorder(entity_node) {
        if child.id() == entity_node.id() {
            continue;
        }
        if !MEMBER_NODE_TYPES.contains(&child.kind()) {
            continue;
        }
        let Some(kind) = member_kind_of(child.kind()) else {
            continue;
        };
        let Some(name) = extract_member_name(child, bytes) else {
            continue;
        };
        let code = ts::node_text(child, bytes).to_string();
        let start_line = child.start_position().row as u32 + 1;
        let end_line = child.end_position().row as u32 + 1;
        out.push(MemberRecord {
            name,
            kind,
            start_line,
            end_line,
            signature: signature_of(&code),
            code,
        });
    }
    out
}

fn extract_name(node: Node, bytes: &[u8]) -> Option<String> {
    if let Some(target) = node.child_by_field_name("name").or_else(|| node.child_by_field_name("type")) {
        return Some(ts::node_text(target, bytes).to_string());
    }
    scan_children_for_identifier(node, bytes)
}

fn extract_member_name(node: Node, bytes: &[u8]) -> Option<String> {
    if let Some(target) = node.child_by_field_name("name") {
        return Some(ts::node_text(target, bytes).to_string());
    }
    if let Some(name) = scan_children_for_identifier(node, bytes) {
        return Some(name);
    }
    let code = ts::node_text(node, bytes);
    let first_line = code.trim().lines().next().unwrap_or("");
    let tokens: Vec<&str> = first_line.split_whitespace().collect();
    if tokens.len() > 1 {
        Some(tokens[1].to_string())
    } else if !first_line.is_empty() {
        Some(first_line.to_string())
    } else {
        None
    }
}

fn scan_children_for_identifier(node: Node, bytes: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(child.kind(), "identifier" | "type_identifier" | "simple_identifier") {
            return Some(ts::node_text(child, bytes).to_string());
        }
    }
    None
}
