//! Dependency graph over the in-scope Python files.
//!
//! # Architecture
//!
//! ```text
//! source text ──extract_imports──> ImportSet ──resolve──> DependencyGraph
//!                                                             │
//!                                                             ▼
//!                                              schedule_batches ──> Vec<Batch>
//! ```
//!
//! Tokens are resolved by base filename (`token` → `token.py`); anything
//! that does not name an in-scope file (stdlib, third-party) is dropped.

pub mod imports;
pub mod scheduler;
pub mod signatures;

pub use imports::{extract_imports, ExtractionStrategy, ImportSet};
pub use scheduler::{schedule_batches, Batch};
pub use signatures::{extract_signatures, PARSE_ERROR_SUMMARY};

use crate::error::SwarmError;
use crate::sandbox::Sandbox;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One in-scope source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUnit {
    /// Absolute path inside the sandbox.
    pub path: PathBuf,
    /// Text content at graph build time.
    pub content: String,
    /// Raw module tokens referenced by the file.
    pub tokens: BTreeSet<String>,
    /// Tokens that map to other in-scope files.
    pub resolved: BTreeSet<PathBuf>,
    /// Whether the lexical fallback produced `tokens`.
    pub parse_fallback: bool,
}

impl FileUnit {
    /// Base filename used as the signature-context key.
    #[must_use]
    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }
}

/// Base filename of a path, lossily converted.
#[must_use]
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Map base filename to full path. On collisions the lexicographically last
/// path wins, so the lookup is stable across runs.
#[must_use]
pub fn basename_lookup<'a, I>(paths: I) -> BTreeMap<String, PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut sorted: Vec<&PathBuf> = paths.into_iter().collect();
    sorted.sort();
    sorted
        .into_iter()
        .map(|p| (file_name(p), p.clone()))
        .collect()
}

/// Resolve a module token to an in-scope path.
#[must_use]
pub fn resolve_token<'a>(token: &str, lookup: &'a BTreeMap<String, PathBuf>) -> Option<&'a PathBuf> {
    lookup.get(&format!("{}.py", token))
}

/// Resolved import edges between in-scope files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl DependencyGraph {
    /// Build from a raw `file -> tokens` map.
    #[must_use]
    pub fn from_tokens(raw: &BTreeMap<PathBuf, BTreeSet<String>>) -> Self {
        let lookup = basename_lookup(raw.keys());
        let edges = raw
            .iter()
            .map(|(file, tokens)| {
                let deps = tokens
                    .iter()
                    .filter_map(|t| resolve_token(t, &lookup).cloned())
                    .collect();
                (file.clone(), deps)
            })
            .collect();
        Self { edges }
    }

    /// Build from already-loaded file units.
    #[must_use]
    pub fn from_units(units: &[FileUnit]) -> Self {
        let edges = units
            .iter()
            .map(|u| (u.path.clone(), u.resolved.clone()))
            .collect();
        Self { edges }
    }

    /// In-scope dependencies of `file` (empty when unknown).
    pub fn dependencies(&self, file: &Path) -> impl Iterator<Item = &PathBuf> {
        self.edges.get(file).into_iter().flatten()
    }

    /// All files, sorted.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.edges.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Read every file through the sandbox, extract its imports and resolve
/// them against the set.
///
/// Unreadable files and paths outside the sandbox are skipped with a
/// warning; they cannot be refined.
#[must_use]
pub fn load_units(sandbox: &Sandbox, paths: &[PathBuf]) -> Vec<FileUnit> {
    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        match sandbox.read_file(path) {
            Ok(content) => loaded.push((path.clone(), content)),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    let lookup = basename_lookup(loaded.iter().map(|(p, _)| p));

    loaded
        .into_iter()
        .map(|(path, content)| {
            let imports = extract_imports(&content);
            if imports.is_fallback() {
                let failure = SwarmError::ParseFailure {
                    file: path.clone(),
                    message: "syntax error, using lexical import extraction".to_string(),
                };
                warn!("{}", failure);
            }
            let resolved: BTreeSet<PathBuf> = imports
                .modules
                .iter()
                .filter_map(|t| resolve_token(t, &lookup).cloned())
                .collect();
            debug!(
                "{}: {} import(s), {} in scope",
                path.display(),
                imports.modules.len(),
                resolved.len()
            );
            FileUnit {
                path,
                content,
                parse_fallback: imports.is_fallback(),
                tokens: imports.modules,
                resolved,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn raw(entries: &[(&str, &[&str])]) -> BTreeMap<PathBuf, BTreeSet<String>> {
        entries
            .iter()
            .map(|(f, deps)| {
                (
                    PathBuf::from(f),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_unresolved_tokens_are_dropped() {
        let graph = DependencyGraph::from_tokens(&raw(&[
            ("/sb/a.py", &["os", "b", "numpy"]),
            ("/sb/b.py", &[]),
        ]));
        let deps: Vec<_> = graph.dependencies(Path::new("/sb/a.py")).collect();
        assert_eq!(deps, vec![&PathBuf::from("/sb/b.py")]);
    }

    #[test]
    fn test_resolution_across_directories() {
        let graph = DependencyGraph::from_tokens(&raw(&[
            ("/sb/app/main.py", &["helpers"]),
            ("/sb/lib/helpers.py", &[]),
        ]));
        let deps: Vec<_> = graph.dependencies(Path::new("/sb/app/main.py")).collect();
        assert_eq!(deps, vec![&PathBuf::from("/sb/lib/helpers.py")]);
    }

    #[test]
    fn test_basename_collision_is_deterministic() {
        let a = PathBuf::from("/sb/x/util.py");
        let b = PathBuf::from("/sb/y/util.py");
        let forward = basename_lookup([&a, &b]);
        let backward = basename_lookup([&b, &a]);
        assert_eq!(forward, backward);
        assert_eq!(forward.get("util.py"), Some(&b));
    }

    #[test]
    fn test_load_units_reads_and_resolves() {
        let temp = TempDir::new().unwrap();
        let sandbox = Sandbox::open(temp.path()).unwrap();
        let order = sandbox.root().join("order.py");
        let product = sandbox.root().join("product.py");
        std::fs::write(&order, "from product import Product\nimport os\n").unwrap();
        std::fs::write(&product, "class Product:\n    pass\n").unwrap();

        let units = load_units(&sandbox, &[order.clone(), product.clone()]);
        assert_eq!(units.len(), 2);

        let order_unit = units.iter().find(|u| u.path == order).unwrap();
        assert!(order_unit.tokens.contains("os"));
        assert_eq!(order_unit.resolved, BTreeSet::from([product.clone()]));
        assert!(!order_unit.parse_fallback);
        assert_eq!(order_unit.file_name(), "order.py");
    }

    #[test]
    fn test_load_units_skips_missing_files() {
        let temp = TempDir::new().unwrap();
        let sandbox = Sandbox::open(temp.path()).unwrap();
        let units = load_units(&sandbox, &[sandbox.root().join("ghost.py")]);
        assert!(units.is_empty());
    }

    #[test]
    fn test_load_units_skips_files_outside_sandbox() {
        let temp = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let sandbox = Sandbox::open(temp.path()).unwrap();
        let inside = sandbox.root().join("app.py");
        let outside = elsewhere.path().join("secret.py");
        std::fs::write(&inside, "import secret\n").unwrap();
        std::fs::write(&outside, "TOKEN = 'x'\n").unwrap();

        let units = load_units(&sandbox, &[inside.clone(), outside]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].path, inside);
        assert!(units[0].resolved.is_empty());
    }

    #[test]
    fn test_load_units_marks_parse_fallback() {
        let temp = TempDir::new().unwrap();
        let sandbox = Sandbox::open(temp.path()).unwrap();
        let broken = sandbox.root().join("broken.py");
        let helper = sandbox.root().join("helper.py");
        std::fs::write(&broken, "import helper\ndef oops(:\n").unwrap();
        std::fs::write(&helper, "X = 1\n").unwrap();

        let units = load_units(&sandbox, &[broken.clone(), helper.clone()]);
        let unit = units.iter().find(|u| u.path == broken).unwrap();
        assert!(unit.parse_fallback);
        assert_eq!(unit.resolved, BTreeSet::from([helper]));
    }
}
