//! Shared tree-sitter plumbing: grammar loading and byte-range text helpers.
//! Used by both the manifest parser and the Swift source parser, since a
//! `Project.swift` manifest is itself Swift (`spec.md` Design Notes §9).

use crate::error::{CoreError, Result};
use tree_sitter::{Node, Parser};

pub fn swift_language() -> tree_sitter::Language {
    tree_sitter_swift::LANGUAGE.into()
}

pub fn new_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser.set_language(&swift_language())?;
    Ok(parser)
}

pub fn node_text<'a>(node: Node<'_>, source: &'a [u8]) -> std::borrow::Cow<'a, str> {
    String::from_utf8_lossy(&source[node.start_byte()..node.end_byte()])
}

pub fn parse_source(parser: &mut Parser, source: &str) -> Result<tree_sitter::Tree> {
    parser
        .parse(source, None)
        .ok_or_else(|| CoreError::parse("tree-sitter returned no parse tree"))
}

/// Depth-first pre-order walk over every node in the tree, stack-based to
/// avoid recursion depth limits on deeply nested expressions.
pub fn walk_preorder(root: Node<'_>) -> Vec<Node<'_>> {
    let mut stack = vec![root];
    let mut out = Vec::new();
    while let Some(node) = stack.pop() {
        out.push(node);
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }
    out
}
