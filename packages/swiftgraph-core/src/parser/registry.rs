//! In-process `TypeRegistry` (`spec.md` §4.4).
//!
//! Accumulates each encountered type's simple name → kind mapping within one
//! parse session, so later files in the same session can classify an
//! inherited name as a known class (the superclass heuristic) and so
//! extensions can resolve their declaring entity's stable id. Advisory only;
//! never persisted.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownKind {
    Class,
    Struct,
    Enum,
    Protocol,
}

#[derive(Debug, Clone)]
struct TypeInfo {
    kind: KnownKind,
    stable_id: String,
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: HashMap<String, TypeInfo>,
}

impl TypeRegistry {
    /// `AnyObject`/`Sendable` are pre-classified as protocols (`spec.md` §4.4)
    /// so they never win the superclass tie-break.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
        };
        registry.seed_protocol("AnyObject");
        registry.seed_protocol("Sendable");
        registry
    }

    fn seed_protocol(&mut self, name: &str) {
        self.entries.insert(
            name.to_string(),
            TypeInfo {
                kind: KnownKind::Protocol,
                stable_id: String::new(),
            },
        );
    }

    pub fn register(&mut self, name: &str, kind: KnownKind, stable_id: &str) {
        self.entries.insert(
            name.to_string(),
            TypeInfo {
                kind,
                stable_id: stable_id.to_string(),
            },
        );
    }

    pub fn is_known_class(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(info) if info.kind == KnownKind::Class)
    }

    /// Stable id of the primary entity for `name`, if one was registered
    /// this session (used by extensions to route their source id).
    pub fn stable_id_for(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .filter(|info| !info.stable_id.is_empty())
            .map(|info| info.stable_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_protocols_are_not_classes() {
        let registry = TypeRegistry::new();
        assert!(!registry.is_known_class("AnyObject"));
        assert!(!registry.is_known_class("Sendable"));
    }

    #[test]
    fn registered_class_is_known() {
        let mut registry = TypeRegistry::new();
        registry.register("Base", KnownKind::Class, "abc123");
        assert!(registry.is_known_class("Base"));
        assert_eq!(registry.stable_id_for("Base"), Some("abc123"));
    }

    #[test]
    fn unregistered_name_has_no_stable_id() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.stable_id_for("Unknown"), None);
    }
}
