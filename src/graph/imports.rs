//! Import extraction for Python sources.
//!
//! A structural pass walks the tree-sitter syntax tree and collects the root
//! module of every `import` / `from ... import` statement. When the tree
//! contains error nodes the source is treated as unparsable and a line-based
//! regex pass is used instead, so broken files still contribute edges.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tree_sitter::{Node, Parser, Tree};

/// How a dependency set was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Syntax tree walk; ignores comments and strings.
    Structural,
    /// Line regex fallback; may pick up references in comments or strings.
    Lexical,
}

/// Root-level module tokens referenced by one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSet {
    pub modules: BTreeSet<String>,
    pub strategy: ExtractionStrategy,
}

impl ImportSet {
    /// True when the regex fallback produced this set.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.strategy == ExtractionStrategy::Lexical
    }
}

/// Parse Python source with tree-sitter.
///
/// Returns `None` when the grammar cannot be loaded or the parser gives up.
pub fn parse_python(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    parser.parse(source, None)
}

/// Extract the imported root modules of a Python file.
///
/// Never fails: malformed input falls back to [`extract_imports_lexical`].
///
/// # Example
///
/// ```
/// use refactor_swarm::graph::imports::{extract_imports, ExtractionStrategy};
///
/// let set = extract_imports("import os.path\nfrom pkg.sub import thing\n");
/// assert_eq!(set.strategy, ExtractionStrategy::Structural);
/// assert!(set.modules.contains("os"));
/// assert!(set.modules.contains("pkg"));
/// ```
#[must_use]
pub fn extract_imports(source: &str) -> ImportSet {
    match parse_python(source) {
        Some(tree) if !tree.root_node().has_error() => ImportSet {
            modules: collect_structural(tree.root_node(), source.as_bytes()),
            strategy: ExtractionStrategy::Structural,
        },
        _ => ImportSet {
            modules: extract_imports_lexical(source),
            strategy: ExtractionStrategy::Lexical,
        },
    }
}

/// Regex fallback over `import X` and `from X import ...` lines.
#[must_use]
pub fn extract_imports_lexical(source: &str) -> BTreeSet<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [r"(?m)^\s*from\s+(\w+)", r"(?m)^\s*import\s+(\w+)"]
            .into_iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    });

    patterns
        .iter()
        .flat_map(|re| re.captures_iter(source))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

fn collect_structural(root: Node<'_>, source: &[u8]) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    if let Some(root) = root_module(name, source) {
                        modules.insert(root);
                    }
                }
            }
            "import_from_statement" => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    if let Some(root) = root_module(module, source) {
                        modules.insert(root);
                    }
                }
            }
            _ => {
                let mut cursor = node.walk();
                stack.extend(node.named_children(&mut cursor));
            }
        }
    }

    modules
}

/// First identifier of a `dotted_name`, `aliased_import` or `relative_import`.
fn root_module(node: Node<'_>, source: &[u8]) -> Option<String> {
    let dotted = match node.kind() {
        "dotted_name" => node,
        "aliased_import" => node.child_by_field_name("name")?,
        "relative_import" => {
            let mut cursor = node.walk();
            let found = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "dotted_name");
            found?
        }
        _ => return None,
    };

    let mut cursor = dotted.walk();
    let first = dotted
        .named_children(&mut cursor)
        .find(|c| c.kind() == "identifier");
    first
        .and_then(|ident| ident.utf8_text(source).ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modules(set: &ImportSet) -> Vec<&str> {
        set.modules.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_plain_and_dotted_imports() {
        let set = extract_imports("import os, sys\nimport pkg.sub.leaf\n");
        assert_eq!(set.strategy, ExtractionStrategy::Structural);
        assert_eq!(modules(&set), vec!["os", "pkg", "sys"]);
    }

    #[test]
    fn test_from_imports_and_aliases() {
        let source = "from inventory import check_stock\nimport numpy as np\nfrom a.b import c as d\n";
        let set = extract_imports(source);
        assert_eq!(modules(&set), vec!["a", "inventory", "numpy"]);
    }

    #[test]
    fn test_relative_imports() {
        let set = extract_imports("from .helpers import tidy\nfrom . import sibling\n");
        assert_eq!(modules(&set), vec!["helpers"]);
    }

    #[test]
    fn test_nested_imports_are_found() {
        let source = "def load():\n    import json\n    return json\n";
        let set = extract_imports(source);
        assert_eq!(modules(&set), vec!["json"]);
    }

    #[test]
    fn test_comments_and_strings_ignored_when_parsable() {
        let source = "# import fake\nx = \"import other\"\nimport real\n";
        let set = extract_imports(source);
        assert_eq!(modules(&set), vec!["real"]);
    }

    #[test]
    fn test_broken_source_falls_back_to_regex() {
        let source = "import order\nfrom product import Product\n\ndef broken(:\n    return\n";
        let set = extract_imports(source);
        assert!(set.is_fallback());
        assert_eq!(modules(&set), vec!["order", "product"]);
    }

    #[test]
    fn test_lexical_picks_up_indented_lines() {
        let found = extract_imports_lexical("    import os\n  from collections import deque\n");
        assert!(found.contains("os"));
        assert!(found.contains("collections"));
    }

    #[test]
    fn test_empty_source() {
        let set = extract_imports("");
        assert_eq!(set.strategy, ExtractionStrategy::Structural);
        assert!(set.modules.is_empty());
    }
}
