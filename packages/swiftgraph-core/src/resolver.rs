//! Module resolver (`spec.md` §4.3).
//!
//! Maps a relative file path to `(module, target_type)`. Grounded on
//! `original_source/indexer/dependencies.py::TuistDependenciesWorker`:
//! registers one `TargetInfo` per declared target (plus a higher-priority
//! entry per nested test target), then resolves a path by longest-prefix
//! match against all registered source roots.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::manifest::{test_target_name, ProjectManifestParser, TargetMetadata};

/// One registered target's source roots, used for longest-prefix matching.
#[derive(Debug, Clone)]
struct TargetInfo {
    name: String,
    target_type: String,
    source_roots: Vec<PathBuf>,
}

/// Resolves `(module, target_type)` for a file path given the targets
/// declared across every `Project.swift` found under the project root.
pub struct ModuleResolver {
    project_root: Option<PathBuf>,
    targets: Vec<TargetInfo>,
    cache: DashMap<PathBuf, (String, String)>,
}

impl ModuleResolver {
    /// Build a resolver with no manifests: every path falls back to its
    /// parent directory name (`spec.md` §4.3 final fallback).
    pub fn empty() -> Self {
        Self {
            project_root: None,
            targets: Vec::new(),
            cache: DashMap::new(),
        }
    }

    /// Walk `project_root` for `Project.swift` manifests and register their
    /// targets (test sources first, for priority on ties).
    pub fn from_project_root(project_root: &Path) -> crate::error::Result<Self> {
        let mut targets = Vec::new();
        let mut parser = ProjectManifestParser::new()?;
        for manifest_path in find_project_manifests(project_root) {
            let metadata = match parser.parse_file(&manifest_path) {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            let manifest_dir = manifest_path.parent().unwrap_or(project_root);
            register_targets(&mut targets, project_root, manifest_dir, &metadata.targets);
        }
        Ok(Self {
            project_root: Some(project_root.to_path_buf()),
            targets,
            cache: DashMap::new(),
        })
    }

    /// Resolve `(module, target_type)` for a path relative to the project root.
    pub fn resolve(&self, relative_path: &Path) -> (String, String) {
        if let Some(hit) = self.cache.get(relative_path) {
            return hit.clone();
        }
        let resolved = self.resolve_uncached(relative_path);
        self.cache.insert(relative_path.to_path_buf(), resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, relative_path: &Path) -> (String, String) {
        let mut best: Option<&TargetInfo> = None;
        let mut best_depth: i64 = -1;
        for target in &self.targets {
            for root in &target.source_roots {
                if !path_is_within(relative_path, root) {
                    continue;
                }
                let depth = root.components().count() as i64;
                if depth > best_depth {
                    best = Some(target);
                    best_depth = depth;
                }
            }
        }
        if let Some(target) = best {
            return (target.name.clone(), target.target_type.clone());
        }
        (fallback_module(relative_path, self.project_root.as_deref()), "app".to_string())
    }
}

fn path_is_within(candidate: &Path, root: &Path) -> bool {
    let root_components: Vec<_> = root.components().collect();
    if root_components.is_empty() {
        return true;
    }
    let candidate_components: Vec<_> = candidate.components().collect();
    if candidate_components.len() < root_components.len() {
        return false;
    }
    candidate_components[..root_components.len()] == root_components[..]
}

/// Parent-directory-name fallback, or `"root"` (`spec.md` §4.3).
fn fallback_module(relative_path: &Path, _project_root: Option<&Path>) -> String {
    relative_path
        .parent()
        .and_then(|p| p.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string())
}

fn register_targets(
    out: &mut Vec<TargetInfo>,
    project_root: &Path,
    manifest_dir: &Path,
    targets: &[TargetMetadata],
) {
    for target in targets {
        for test in &target.tests {
            if test.sources.is_empty() {
                continue;
            }
            let test_source_roots: Vec<PathBuf> = test
                .sources
                .iter()
                .map(|src| normalize_source(project_root, manifest_dir, src))
                .collect();
            let test_name = test_target_name(&target.name, &test.tests_type);
            out.push(TargetInfo {
                name: test_name,
                target_type: "test".to_string(),
                source_roots: test_source_roots,
            });
        }
        let sources = if target.sources.is_empty() {
            vec![default_sources(project_root, manifest_dir, &target.name)]
        } else {
            target.sources.clone()
        };
        let source_roots = sources
            .iter()
            .map(|src| normalize_source(project_root, manifest_dir, src))
            .collect();
        out.push(TargetInfo {
            name: target.name.clone(),
            target_type: target.target_type.clone(),
            source_roots,
        });
    }
}

fn default_sources(project_root: &Path, manifest_dir: &Path, target_name: &str) -> String {
    let default = manifest_dir.join("Targets").join(target_name).join("Sources");
    default
        .strip_prefix(project_root)
        .unwrap_or(&default)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Trim a source glob at the first `{` or `*` wildcard (`spec.md` §4.3).
fn normalize_source(project_root: &Path, manifest_dir: &Path, source: &str) -> PathBuf {
    let cleaned = source.trim().replace('\\', "/");
    if cleaned.is_empty() {
        return manifest_dir.to_path_buf();
    }
    let cut = ["{", "*"]
        .iter()
        .filter_map(|token| cleaned.find(token))
        .min()
        .unwrap_or(cleaned.len());
    let cleaned = cleaned[..cut].trim_end_matches('/');
    if cleaned.is_empty() {
        return manifest_dir.to_path_buf();
    }
    let absolute = manifest_dir.join(cleaned);
    absolute
        .strip_prefix(project_root)
        .map(Path::to_path_buf)
        .unwrap_or(absolute)
}

fn find_project_manifests(project_root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk_for_manifests(project_root, &mut out);
    out
}

fn walk_for_manifests(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_for_manifests(&path, out);
        } else if path.file_name().and_then(|n| n.to_str()) == Some("Project.swift") {
            out.push(path);
        }
    }
}
