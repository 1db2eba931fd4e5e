//! Record model (`spec.md` §3).
//!
//! These are plain value types produced by the parser and consumed by
//! `swiftgraph-storage`. None of them know how to persist themselves; the
//! repository owns that translation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A top-level Swift type declaration, or an extension target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Class,
    Struct,
    Enum,
    Protocol,
    Extension,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Struct => "struct",
            EntityKind::Enum => "enum",
            EntityKind::Protocol => "protocol",
            EntityKind::Extension => "extension",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "class" => Some(EntityKind::Class),
            "struct" => Some(EntityKind::Struct),
            "enum" => Some(EntityKind::Enum),
            "protocol" => Some(EntityKind::Protocol),
            "extension" => Some(EntityKind::Extension),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A member belonging to exactly one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    Function,
    Initializer,
    Deinitializer,
    Subscript,
    Variable,
    Property,
    Constant,
    Typealias,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Function => "function",
            MemberKind::Initializer => "initializer",
            MemberKind::Deinitializer => "deinitializer",
            MemberKind::Subscript => "subscript",
            MemberKind::Variable => "variable",
            MemberKind::Property => "property",
            MemberKind::Constant => "constant",
            MemberKind::Typealias => "typealias",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "function" => Some(MemberKind::Function),
            "initializer" => Some(MemberKind::Initializer),
            "deinitializer" => Some(MemberKind::Deinitializer),
            "subscript" => Some(MemberKind::Subscript),
            "variable" => Some(MemberKind::Variable),
            "property" => Some(MemberKind::Property),
            "constant" => Some(MemberKind::Constant),
            "typealias" => Some(MemberKind::Typealias),
            _ => None,
        }
    }

    /// `true` for the member kinds the property-reference pass considers.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            MemberKind::Variable | MemberKind::Property | MemberKind::Constant
        )
    }

    /// `true` for the member kinds the creation-edge pass re-walks.
    pub fn is_callable(&self) -> bool {
        matches!(self, MemberKind::Function | MemberKind::Initializer)
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Edge types a relationship can carry (`spec.md` §3 Relationships).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    Superclass,
    Conforms,
    StrongReference,
    WeakReference,
    Creates,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Superclass => "superclass",
            EdgeType::Conforms => "conforms",
            EdgeType::StrongReference => "strongReference",
            EdgeType::WeakReference => "weakReference",
            EdgeType::Creates => "creates",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "superclass" => Some(EdgeType::Superclass),
            "conforms" => Some(EdgeType::Conforms),
            "strongReference" => Some(EdgeType::StrongReference),
            "weakReference" => Some(EdgeType::WeakReference),
            "creates" => Some(EdgeType::Creates),
            _ => None,
        }
    }

    /// Structural edges always appear once their owner appears, beyond the hop budget.
    pub fn is_structural(&self) -> bool {
        matches!(self, EdgeType::Superclass | EdgeType::Conforms)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of an entity's owning build target (`spec.md` GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    App,
    Test,
    Interface,
    Mock,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::App => "app",
            TargetType::Test => "test",
            TargetType::Interface => "interface",
            TargetType::Mock => "mock",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "app" => Some(TargetType::App),
            "test" => Some(TargetType::Test),
            "interface" => Some(TargetType::Interface),
            "mock" => Some(TargetType::Mock),
            _ => None,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A function, property, initializer, etc. belonging to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub name: String,
    pub kind: MemberKind,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: String,
    pub code: String,
}

impl MemberRecord {
    /// `<entity_id>:<kind>:<name>` — computed once the owning entity_id is known,
    /// so this lives on the repository side (`spec.md` §3 Members). Here we only
    /// expose the inputs the repository needs.
    pub fn dedup_key(&self) -> (&str, MemberKind) {
        (&self.name, self.kind)
    }
}

/// A top-level Swift type declaration (class/struct/enum/protocol) or an
/// extension target, pre-stable-id. Exactly one file is primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub stable_id: String,
    pub name: String,
    pub kind: EntityKind,
    pub module: String,
    pub language: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: String,
    pub docstring: Option<String>,
    pub code: String,
    pub members: Vec<MemberRecord>,
    /// Denormalized per-version property bag (`extended_type`, `visibility`,
    /// `target_type`, `member_count`).
    pub properties: HashMap<String, serde_json::Value>,
}

/// A Swift declaration that adds members or conformances to an existing type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub stable_id: String,
    pub extended_type: String,
    pub module: String,
    pub language: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: String,
    pub code: String,
    pub visibility: Option<String>,
    pub constraints: Option<String>,
    pub conformances: Vec<String>,
    pub members: Vec<MemberRecord>,
    pub properties: HashMap<String, serde_json::Value>,
}

/// An edge from a source entity to a named (possibly unresolved) target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub source_stable_id: String,
    pub target_name: String,
    pub target_module: Option<String>,
    pub edge_type: EdgeType,
    pub metadata: HashMap<String, String>,
}

impl RelationshipRecord {
    /// The dedup key from `spec.md` §3 invariant 4, minus the (as-yet
    /// unresolved) target stable id — resolution happens in the repository.
    pub fn dedup_key(&self) -> (&str, &str, Option<&str>, EdgeType) {
        (
            &self.source_stable_id,
            &self.target_name,
            self.target_module.as_deref(),
            self.edge_type,
        )
    }
}

/// Output of parsing one Swift source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSource {
    pub entities: Vec<EntityRecord>,
    pub extensions: Vec<ExtensionRecord>,
    pub relationships: Vec<RelationshipRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips() {
        for kind in [
            EntityKind::Class,
            EntityKind::Struct,
            EntityKind::Enum,
            EntityKind::Protocol,
            EntityKind::Extension,
        ] {
            assert_eq!(EntityKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn edge_type_structural_classification() {
        assert!(EdgeType::Superclass.is_structural());
        assert!(EdgeType::Conforms.is_structural());
        assert!(!EdgeType::StrongReference.is_structural());
        assert!(!EdgeType::Creates.is_structural());
    }

    #[test]
    fn member_kind_storage_and_callable() {
        assert!(MemberKind::Property.is_storage());
        assert!(!MemberKind::Function.is_storage());
        assert!(MemberKind::Initializer.is_callable());
        assert!(!MemberKind::Variable.is_callable());
    }
}
