//! `Project.swift` manifest parsing (`spec.md` §4.2).
//!
//! Walks the tree-sitter tree for calls whose name suffix is `.Module`, then
//! `.Target`, then `.Tests`, reading labeled arguments the way
//! `original_source/indexer/project_parsers/swift_geko.py` does.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::error::{CoreError, Result};
use crate::ts;

use super::target::{classify_target, ProjectMetadata, TargetMetadata, TestTargetMetadata};

pub struct ProjectManifestParser {
    parser: Parser,
}

impl ProjectManifestParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: ts::new_parser()?,
        })
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<ProjectMetadata> {
        let source = std::fs::read_to_string(path)
            .map_err(|err| CoreError::manifest(format!("unable to read {}", path.display())).with_source(err))?;
        let fallback_name = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.parse_source(&source, &fallback_name)
    }

    pub fn parse_source(&mut self, source: &str, fallback_name: &str) -> Result<ProjectMetadata> {
        let tree = ts::parse_source(&mut self.parser, source)?;
        let bytes = source.as_bytes();
        let root = tree.root_node();

        let module_call = find_first_call(root, bytes, ".Module")
            .ok_or_else(|| CoreError::manifest("unable to locate module declaration"))?;
        let args = collect_arguments(module_call, bytes);
        let name = args
            .get("name")
            .and_then(|node| parse_string(*node, bytes))
            .unwrap_or_else(|| fallback_name.to_string());
        let targets = args
            .get("targets")
            .map(|node| parse_targets_array(*node, bytes))
            .unwrap_or_default();
        Ok(ProjectMetadata { name, targets })
    }
}

fn parse_targets_array<'a>(node: Node<'a>, bytes: &[u8]) -> Vec<TargetMetadata> {
    if node.kind() != "array_literal" {
        return Vec::new();
    }
    let mut targets = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "call_expression" || !call_name_endswith(child, bytes, ".Target") {
            continue;
        }
        if let Some(target) = parse_target_call(child, bytes) {
            targets.push(target);
        }
    }
    targets
}

fn parse_target_call(node: Node, bytes: &[u8]) -> Option<TargetMetadata> {
    let args = collect_arguments(node, bytes);
    let name = args.get("name").and_then(|n| parse_string(*n, bytes))?;
    let sources = args
        .get("sources")
        .map(|n| parse_string_list(*n, bytes))
        .unwrap_or_default();
    let tests = args
        .get("tests")
        .map(|n| parse_tests_array(*n, bytes))
        .unwrap_or_default();
    let product = args.get("product").and_then(|n| parse_enum_value(*n, bytes));
    let target_type = classify_target(&name, product.as_deref()).to_string();
    Some(TargetMetadata {
        name,
        target_type,
        sources: normalize_sources(sources),
        tests,
        product,
    })
}

fn parse_tests_array(node: Node, bytes: &[u8]) -> Vec<TestTargetMetadata> {
    if node.kind() != "array_literal" {
        return Vec::new();
    }
    let mut tests = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "call_expression" || !call_name_endswith(child, bytes, ".Tests") {
            continue;
        }
        let args = collect_arguments(child, bytes);
        let tests_type = args
            .get("testsType")
            .and_then(|n| parse_enum_value(*n, bytes))
            .unwrap_or_else(|| "unknown".to_string());
        let sources = args
            .get("sources")
            .map(|n| parse_string_list(*n, bytes))
            .unwrap_or_default();
        let dependencies = args
            .get("dependencies")
            .map(|n| parse_dependency_names(*n, bytes))
            .unwrap_or_default();
        tests.push(TestTargetMetadata {
            tests_type,
            sources,
            dependencies,
        });
    }
    tests
}

fn parse_dependency_names(node: Node, bytes: &[u8]) -> Vec<String> {
    if node.kind() != "array_literal" {
        return Vec::new();
    }
    let mut deps = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "call_expression" {
            continue;
        }
        let call_name = call_name(child, bytes);
        let qualifier = call_name.rsplit('.').next().unwrap_or("").trim_start_matches('.');
        let args = collect_arguments(child, bytes);
        if let Some(dep_name) = args.get("name").and_then(|n| parse_string(*n, bytes)) {
            deps.push(format!("{qualifier}:{dep_name}"));
        }
    }
    deps
}

/// Collect `label: value` pairs from a call's `value_arguments`, mirroring
/// `_collect_arguments` in `original_source/indexer/project_parsers/swift_geko.py`.
fn collect_arguments<'a>(node: Node<'a>, bytes: &[u8]) -> std::collections::HashMap<String, Node<'a>> {
    let mut args = std::collections::HashMap::new();
    let mut cursor = node.walk();
    let Some(suffix) = node.children(&mut cursor).find(|c| c.kind() == "call_suffix") else {
        return args;
    };
    let mut suffix_cursor = suffix.walk();
    let Some(value_args) = suffix.children(&mut suffix_cursor).find(|c| c.kind() == "value_arguments") else {
        return args;
    };
    let mut value_cursor = value_args.walk();
    for child in value_args.children(&mut value_cursor) {
        if child.kind() != "value_argument" {
            continue;
        }
        let mut child_cursor = child.walk();
        let children: Vec<Node> = child.children(&mut child_cursor).collect();
        let label_node = children.iter().find(|c| c.kind() == "value_argument_label");
        let value_node = children
            .iter()
            .find(|c| c.is_named() && c.kind() != "value_argument_label");
        if let (Some(label_node), Some(value_node)) = (label_node, value_node) {
            let label = ts::node_text(*label_node, bytes).trim().trim_end_matches(':').to_string();
            args.insert(label, *value_node);
        }
    }
    args
}

fn parse_string_list(node: Node, bytes: &[u8]) -> Vec<String> {
    if node.kind() != "array_literal" {
        return Vec::new();
    }
    let mut values = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if let Some(value) = parse_string(child, bytes) {
            values.push(value);
        }
    }
    values
}

fn parse_string(node: Node, bytes: &[u8]) -> Option<String> {
    let text = ts::node_text(node, bytes).trim().to_string();
    if text.is_empty() {
        return None;
    }
    if node.kind() == "line_string_literal" && text.len() >= 2 {
        return Some(text[1..text.len() - 1].to_string());
    }
    if matches!(node.kind(), "simple_identifier" | "identifier" | "type_identifier") {
        return Some(text);
    }
    let trimmed = text.trim_matches('"');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_enum_value(node: Node, bytes: &[u8]) -> Option<String> {
    let text = ts::node_text(node, bytes).trim().trim_start_matches('.').to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn call_name(node: Node, bytes: &[u8]) -> String {
    for child in node.children(&mut node.walk()) {
        if child.kind() == "call_suffix" {
            break;
        }
        if child.is_named() {
            return ts::node_text(child, bytes).to_string();
        }
    }
    String::new()
}

fn call_name_endswith(node: Node, bytes: &[u8], suffix: &str) -> bool {
    call_name(node, bytes).ends_with(suffix)
}

fn find_first_call<'a>(root: Node<'a>, bytes: &[u8], suffix: &str) -> Option<Node<'a>> {
    ts::walk_preorder(root)
        .into_iter()
        .find(|node| node.kind() == "call_expression" && call_name_endswith(*node, bytes, suffix))
}

fn normalize_sources(sources: Vec<String>) -> Vec<String> {
    sources
        .into_iter()
        .map(|s| s.trim().replace('\\', "/"))
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
    let project = Project.Module(
        name: "MyFeature",
        targets: [
            .Target(
                name: "MyFeature",
                product: .framework,
                sources: ["Sources/**"],
                tests: [
                    .Tests(
                        testsType: .unit,
                        sources: ["Tests/**"],
                        dependencies: [.target(name: "MyFeature")]
                    )
                ]
            ),
            .Target(
                name: "MyFeatureIO",
                product: .framework,
                sources: ["Interface/**"]
            ),
        ]
    )
    "#;

    #[test]
    fn parses_module_name_and_targets() {
        let mut parser = ProjectManifestParser::new().expect("grammar loads");
        let metadata = parser.parse_source(MANIFEST, "MyFeature").expect("parses");
        assert_eq!(metadata.name, "MyFeature");
        assert_eq!(metadata.targets.len(), 2);
        let main = &metadata.targets[0];
        assert_eq!(main.name, "MyFeature");
        assert_eq!(main.target_type, "app");
        assert_eq!(main.sources, vec!["Sources/**".to_string()]);
        assert_eq!(main.tests.len(), 1);
        assert_eq!(main.tests[0].tests_type, "unit");
    }

    #[test]
    fn classifies_interface_suffix_target() {
        let mut parser = ProjectManifestParser::new().expect("grammar loads");
        let metadata = parser.parse_source(MANIFEST, "MyFeature").expect("parses");
        let io = &metadata.targets[1];
        assert_eq!(io.name, "MyFeatureIO");
        assert_eq!(io.target_type, "interface");
    }

    #[test]
    fn missing_module_call_is_an_error() {
        let mut parser = ProjectManifestParser::new().expect("grammar loads");
        let err = parser.parse_source("let x = 1", "Fallback").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Manifest);
    }
}
