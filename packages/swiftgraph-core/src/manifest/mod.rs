//! Project-manifest parsing (`spec.md` §4.2).
//!
//! A Swift project manifest (`Project.swift`, Tuist/Geko style) declares a
//! module with targets, each with source globs and nested test targets. The
//! manifest is itself Swift, so it is parsed with the same tree-sitter
//! grammar as ordinary source (`spec.md` Design Notes §9).

mod parser;
mod target;

pub use parser::ProjectManifestParser;
pub use target::{classify_target, test_target_name, ProjectMetadata, TargetMetadata, TestTargetMetadata};
