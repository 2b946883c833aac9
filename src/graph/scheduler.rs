//! Dependency-ordered batch scheduling.
//!
//! Files are released one at a time in path order once none of their
//! in-scope dependencies remain unscheduled. When nothing is ready the
//! remaining set contains a cycle; the closure reachable from the smallest
//! remaining file is released as a single batch.
//!
//! Exactly one ready file is released per step.
//!
//! # Example
//!
//! ```
//! use refactor_swarm::graph::{schedule_batches, DependencyGraph};
//! use std::collections::{BTreeMap, BTreeSet};
//! use std::path::PathBuf;
//!
//! let mut raw = BTreeMap::new();
//! raw.insert(PathBuf::from("a.py"), BTreeSet::from(["b".to_string()]));
//! raw.insert(PathBuf::from("b.py"), BTreeSet::new());
//!
//! let batches = schedule_batches(&DependencyGraph::from_tokens(&raw));
//! assert_eq!(batches.len(), 2);
//! assert_eq!(batches[0].files(), &[PathBuf::from("b.py")]);
//! ```

use super::DependencyGraph;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// A set of files refined together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Files in path order.
    files: Vec<PathBuf>,
}

impl Batch {
    /// Batch holding a single file.
    #[must_use]
    pub fn single(file: PathBuf) -> Self {
        Self { files: vec![file] }
    }

    /// Batch holding a cycle group.
    #[must_use]
    pub fn group(files: BTreeSet<PathBuf>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// True for batches of two or more mutually dependent files.
    #[must_use]
    pub fn is_cycle_group(&self) -> bool {
        self.files.len() > 1
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f == path)
    }

    /// Display label relative to `root`, e.g. `inventory.py | order.py`.
    #[must_use]
    pub fn label(&self, root: &Path) -> String {
        self.files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap_or(f).display().to_string())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .files
            .iter()
            .map(|p| super::file_name(p))
            .collect();
        write!(f, "{}", names.join(" | "))
    }
}

/// Order every file of `graph` into batches.
///
/// Each file appears in exactly one batch. For acyclic graphs every
/// dependency lands in a strictly earlier batch. The result depends only on
/// the graph contents.
#[must_use]
pub fn schedule_batches(graph: &DependencyGraph) -> Vec<Batch> {
    let mut remaining: BTreeSet<PathBuf> = graph.files().cloned().collect();
    let mut batches = Vec::new();

    while let Some(start) = remaining.first().cloned() {
        // BTreeSet iteration is path-ordered, so the first ready file is the tie-break winner.
        let ready = remaining
            .iter()
            .find(|f| !has_pending_dependency(graph, f, &remaining))
            .cloned();

        match ready {
            Some(file) => {
                remaining.remove(&file);
                batches.push(Batch::single(file));
            }
            None => {
                let group = reachable_closure(graph, &start, &remaining);
                for file in &group {
                    remaining.remove(file);
                }
                batches.push(Batch::group(group));
            }
        }
    }

    batches
}

fn has_pending_dependency(graph: &DependencyGraph, file: &Path, remaining: &BTreeSet<PathBuf>) -> bool {
    graph
        .dependencies(file)
        .any(|dep| dep.as_path() != file && remaining.contains(dep))
}

/// Files reachable from `start` through edges that stay inside `remaining`.
fn reachable_closure(
    graph: &DependencyGraph,
    start: &Path,
    remaining: &BTreeSet<PathBuf>,
) -> BTreeSet<PathBuf> {
    let mut closure = BTreeSet::new();
    let mut stack = vec![start.to_path_buf()];

    while let Some(current) = stack.pop() {
        if !closure.insert(current.clone()) {
            continue;
        }
        for dep in graph.dependencies(&current) {
            if remaining.contains(dep) && !closure.contains(dep) {
                stack.push(dep.clone());
            }
        }
    }

    closure
}
