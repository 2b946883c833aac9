//! Public-symbol summaries of Python files.
//!
//! Produces a compact, indentation-structured outline of a module's top-level
//! functions and classes: parameters with annotations, return annotations,
//! class attributes, methods, and `self.<attr>` assignments made directly in
//! `__init__`. The outline is what later remediation steps see of files
//! outside their batch.

use super::imports::parse_python;
use tree_sitter::Node;

/// Summary emitted for sources that do not parse.
pub const PARSE_ERROR_SUMMARY: &str = "Error parsing.";

/// Summarize the public shape of a Python module.
///
/// # Example
///
/// ```
/// use refactor_swarm::graph::extract_signatures;
///
/// let summary = extract_signatures("def total(items: list) -> int:\n    return len(items)\n");
/// assert_eq!(summary, "def total(items: list) -> int");
/// ```
#[must_use]
pub fn extract_signatures(source: &str) -> String {
    let tree = match parse_python(source) {
        Some(tree) if !tree.root_node().has_error() => tree,
        _ => return PARSE_ERROR_SUMMARY.to_string(),
    };

    let bytes = source.as_bytes();
    let mut lines = Vec::new();
    let root = tree.root_node();
    let mut cursor = root.walk();

    for node in root.named_children(&mut cursor) {
        match unwrap_decorated(node) {
            Some(def) if def.kind() == "class_definition" => summarize_class(def, bytes, &mut lines),
            Some(def) if def.kind() == "function_definition" => {
                lines.push(function_signature(def, bytes));
            }
            _ => {}
        }
    }

    lines.join("\n")
}

fn unwrap_decorated(node: Node<'_>) -> Option<Node<'_>> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition")
    } else {
        Some(node)
    }
}

fn text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("?")
}

fn summarize_class(class: Node<'_>, source: &[u8], lines: &mut Vec<String>) {
    let name = class
        .child_by_field_name("name")
        .map_or("?", |n| text(n, source));
    lines.push(format!("class {}:", name));

    let Some(body) = class.child_by_field_name("body") else {
        return;
    };

    let mut cursor = body.walk();
    let members: Vec<Node<'_>> = body.named_children(&mut cursor).collect();

    for member in &members {
        for assignment in statement_assignments(*member) {
            let Some(left) = assignment.child_by_field_name("left") else {
                continue;
            };
            if left.kind() != "identifier" {
                continue;
            }
            match assignment.child_by_field_name("type") {
                Some(ty) => lines.push(format!("    {}: {}", text(left, source), text(ty, source))),
                None => lines.push(format!("    {}", text(left, source))),
            }
        }
    }

    for member in &members {
        let Some(def) = unwrap_decorated(*member) else {
            continue;
        };
        if def.kind() != "function_definition" {
            continue;
        }
        lines.push(format!("    {}", function_signature(def, source)));

        let is_init = def
            .child_by_field_name("name")
            .is_some_and(|n| text(n, source) == "__init__");
        if is_init {
            lines.extend(
                init_attributes(def, source)
                    .into_iter()
                    .map(|attr| format!("        self.{}", attr)),
            );
        }
    }
}

/// Assignments carried by an `expression_statement`.
fn statement_assignments(statement: Node<'_>) -> Vec<Node<'_>> {
    if statement.kind() != "expression_statement" {
        return Vec::new();
    }
    let mut cursor = statement.walk();
    let assignments = statement
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "assignment")
        .collect();
    assignments
}

fn init_attributes(init: Node<'_>, source: &[u8]) -> Vec<String> {
    let Some(body) = init.child_by_field_name("body") else {
        return Vec::new();
    };
    let mut cursor = body.walk();
    let statements: Vec<Node<'_>> = body.named_children(&mut cursor).collect();

    let mut attrs = Vec::new();
    for statement in statements {
        for assignment in statement_assignments(statement) {
            let Some(left) = assignment.child_by_field_name("left") else {
                continue;
            };
            if left.kind() != "attribute" {
                continue;
            }
            let is_self = left
                .child_by_field_name("object")
                .is_some_and(|o| o.kind() == "identifier" && text(o, source) == "self");
            if let (true, Some(attr)) = (is_self, left.child_by_field_name("attribute")) {
                attrs.push(text(attr, source).to_string());
            }
        }
    }
    attrs
}

fn function_signature(def: Node<'_>, source: &[u8]) -> String {
    let name = def
        .child_by_field_name("name")
        .map_or("?", |n| text(n, source));
    let is_async = {
        let mut cursor = def.walk();
        let found = def.children(&mut cursor).any(|c| c.kind() == "async");
        found
    };
    let params = def
        .child_by_field_name("parameters")
        .map(|p| parameter_list(p, source))
        .unwrap_or_default();
    let returns = def
        .child_by_field_name("return_type")
        .map(|r| format!(" -> {}", text(r, source)))
        .unwrap_or_default();

    format!(
        "{}def {}({}){}",
        if is_async { "async " } else { "" },
        name,
        params.join(", "),
        returns
    )
}

/// Named positional parameters with their annotations; splats are omitted.
fn parameter_list(params: Node<'_>, source: &[u8]) -> Vec<String> {
    let mut cursor = params.walk();
    let rendered = params
        .named_children(&mut cursor)
        .filter_map(|param| match param.kind() {
            "identifier" => Some(text(param, source).to_string()),
            "default_parameter" => param
                .child_by_field_name("name")
                .map(|n| text(n, source).to_string()),
            "typed_parameter" => {
                let mut inner = param.walk();
                let ident = param
                    .named_children(&mut inner)
                    .find(|c| c.kind() == "identifier");
                let ty = param.child_by_field_name("type");
                match (ident, ty) {
                    (Some(i), Some(t)) => Some(format!("{}: {}", text(i, source), text(t, source))),
                    (Some(i), None) => Some(text(i, source).to_string()),
                    _ => None,
                }
            }
            "typed_default_parameter" => {
                let name = param.child_by_field_name("name")?;
                Some(match param.child_by_field_name("type") {
                    Some(t) => format!("{}: {}", text(name, source), text(t, source)),
                    None => text(name, source).to_string(),
                })
            }
            _ => None,
        })
        .collect();
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_functions() {
        let source = "def plain(a, b):\n    pass\n\ndef typed(x: int, y: str = 'q') -> bool:\n    return True\n";
        assert_eq!(
            extract_signatures(source),
            "def plain(a, b)\ndef typed(x: int, y: str) -> bool"
        );
    }

    #[test]
    fn test_class_with_attributes_methods_and_init_fields() {
        let source = r#"
class Inventory:
    currency: str = "EUR"
    count = 0

    def __init__(self, items: dict):
        self.items = items
        self.total = 0
        local = 1

    def add(self, name: str, qty: int = 1) -> None:
        self.items[name] = qty
"#;
        let expected = "class Inventory:\n    currency: str\n    count\n    def __init__(self, items: dict)\n        self.items\n        self.total\n    def add(self, name: str, qty: int) -> None";
        assert_eq!(extract_signatures(source), expected);
    }

    #[test]
    fn test_decorated_and_async_definitions() {
        let source = "@cache\ndef memo(n):\n    return n\n\nasync def fetch(url: str):\n    pass\n";
        assert_eq!(
            extract_signatures(source),
            "def memo(n)\nasync def fetch(url: str)"
        );
    }

    #[test]
    fn test_splats_are_omitted() {
        let source = "def f(a, *args, key=None, **kwargs):\n    pass\n";
        assert_eq!(extract_signatures(source), "def f(a, key)");
    }

    #[test]
    fn test_unparsable_source() {
        assert_eq!(extract_signatures("def broken(:\n"), PARSE_ERROR_SUMMARY);
    }

    #[test]
    fn test_module_without_definitions() {
        assert_eq!(extract_signatures("X = 1\nprint(X)\n"), "");
    }
}
