//! Iteration and signature-context bookkeeping across batches.

use super::state::BatchSession;
use crate::context::{ContextSnapshot, SignatureContext};
use crate::graph::{extract_signatures, FileUnit};
use std::path::Path;
use tracing::debug;

/// Owns the project-wide [`SignatureContext`] for one run and is the only
/// place that advances a session's iteration counter.
#[derive(Debug, Clone, Default)]
pub struct IterationController {
    context: SignatureContext,
}

impl IterationController {
    #[must_use]
    pub fn new(context: SignatureContext) -> Self {
        Self { context }
    }

    /// Seed the context with every in-scope file.
    #[must_use]
    pub fn from_units(units: &[FileUnit]) -> Self {
        Self::new(SignatureContext::from_units(units))
    }

    /// Count one more failed verification.
    #[must_use]
    pub fn advance(&self, mut session: BatchSession) -> BatchSession {
        session.bump_iteration();
        debug!("Iteration advanced to {}", session.iteration());
        session
    }

    /// Record a file's new signature. Returns the new context version.
    pub fn merge_signatures(&mut self, filename: &str, signature: &str) -> u64 {
        self.context.merge(filename, signature)
    }

    /// Extract and merge the signature of freshly written content.
    pub fn merge_file(&mut self, path: &Path, content: &str) -> u64 {
        self.merge_signatures(&crate::graph::file_name(path), &extract_signatures(content))
    }

    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        self.context.snapshot()
    }

    #[must_use]
    pub fn context(&self) -> &SignatureContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn test_advance_is_monotonic() {
        let controller = IterationController::default();
        let mut session = BatchSession::new(BTreeMap::new());
        for expected in 1..=3 {
            session = controller.advance(session);
            assert_eq!(session.iteration(), expected);
        }
    }

    #[test]
    fn test_merge_file_updates_context() {
        let mut controller = IterationController::default();
        let v1 = controller.merge_file(Path::new("/sb/pkg/order.py"), "def total(items: list) -> int:\n    return 0\n");
        let v2 = controller.merge_signatures("product.py", "class Product:");
        assert_eq!((v1, v2), (1, 2));
        assert_eq!(
            controller.context().get("order.py"),
            Some("def total(items: list) -> int")
        );
    }

    #[test]
    fn test_snapshot_does_not_follow_later_merges() {
        let mut controller = IterationController::default();
        controller.merge_signatures("a.py", "def f()");
        let snapshot = controller.snapshot();
        controller.merge_signatures("a.py", "def g()");
        assert_eq!(snapshot.signatures["a.py"], "def f()");
        assert_eq!(controller.snapshot().version, 2);
    }

    #[test]
    fn test_from_units() {
        let unit = FileUnit {
            path: PathBuf::from("/sb/a.py"),
            content: "class A:\n    pass\n".into(),
            tokens: Default::default(),
            resolved: Default::default(),
            parse_fallback: false,
        };
        let controller = IterationController::from_units(&[unit]);
        assert_eq!(controller.context().get("a.py"), Some("class A:"));
        assert_eq!(controller.context().version(), 0);
    }
}
