//! Project-wide signature context.
//!
//! Holds a public-symbol outline for every in-scope file, keyed by base
//! filename. The store is append/overwrite only and carries a version that
//! increases with every merge, so a phase can tell whether the snapshot it
//! was handed is still current.
//!
//! Only the iteration controller merges signatures; phases receive
//! read-only [`ContextSnapshot`]s.

use crate::graph::{extract_signatures, FileUnit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Versioned filename → signature store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureContext {
    version: u64,
    signatures: BTreeMap<String, String>,
}

impl SignatureContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the initial context from loaded file units.
    #[must_use]
    pub fn from_units(units: &[FileUnit]) -> Self {
        let signatures = units
            .iter()
            .map(|u| (u.file_name(), extract_signatures(&u.content)))
            .collect();
        Self {
            version: 0,
            signatures,
        }
    }

    /// Current version; bumped by every merge.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn get(&self, filename: &str) -> Option<&str> {
        self.signatures.get(filename).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Insert or replace one file's signature.
    ///
    /// Crate-private: callers go through the iteration controller.
    pub(crate) fn merge(&mut self, filename: impl Into<String>, signature: impl Into<String>) -> u64 {
        self.signatures.insert(filename.into(), signature.into());
        self.version += 1;
        self.version
    }

    /// Immutable copy handed to a phase.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            version: self.version,
            signatures: self.signatures.clone(),
        }
    }
}

/// Read-only view of the context at a given version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub version: u64,
    pub signatures: BTreeMap<String, String>,
}

impl ContextSnapshot {
    /// Render for a prompt, one block per file.
    ///
    /// ```text
    /// File: inventory.py
    /// def check_stock(item: str) -> int
    /// ------------------------------
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        self.render_excluding(&[])
    }

    /// Render every file except the given base names.
    #[must_use]
    pub fn render_excluding(&self, skip: &[String]) -> String {
        self.signatures
            .iter()
            .filter(|(name, _)| !skip.contains(name))
            .map(|(name, sig)| format!("File: {}\n{}\n{}", name, sig, "-".repeat(30)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn unit(path: &str, content: &str) -> FileUnit {
        FileUnit {
            path: PathBuf::from(path),
            content: content.to_string(),
            tokens: BTreeSet::new(),
            resolved: BTreeSet::new(),
            parse_fallback: false,
        }
    }

    #[test]
    fn test_from_units() {
        let ctx = SignatureContext::from_units(&[
            unit("/sb/a.py", "def f(x):\n    return x\n"),
            unit("/sb/b.py", "class B:\n    pass\n"),
        ]);
        assert_eq!(ctx.version(), 0);
        assert_eq!(ctx.get("a.py"), Some("def f(x)"));
        assert_eq!(ctx.get("b.py"), Some("class B:"));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_merge_bumps_version_and_overwrites() {
        let mut ctx = SignatureContext::new();
        assert_eq!(ctx.merge("a.py", "def f()"), 1);
        assert_eq!(ctx.merge("a.py", "def g()"), 2);
        assert_eq!(ctx.get("a.py"), Some("def g()"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let mut ctx = SignatureContext::new();
        ctx.merge("a.py", "def f()");
        let snap = ctx.snapshot();
        ctx.merge("a.py", "def h(y)");
        assert_eq!(snap.signatures["a.py"], "def f()");
        assert_eq!(snap.version, 1);
        assert_eq!(ctx.get("a.py"), Some("def h(y)"));
    }

    #[test]
    fn test_render() {
        let mut ctx = SignatureContext::new();
        ctx.merge("a.py", "def f()");
        ctx.merge("b.py", "def g()");
        let snap = ctx.snapshot();
        let rendered = snap.render();
        assert!(rendered.starts_with("File: a.py\ndef f()\n------"));
        assert!(rendered.contains("File: b.py"));

        let partial = snap.render_excluding(&["a.py".to_string()]);
        assert!(!partial.contains("a.py"));
        assert!(partial.contains("b.py"));
    }
}
