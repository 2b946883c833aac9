//! Parsing model replies into per-file contents.
//!
//! Replies are expected to name each file on a `FILE: <name>` line followed
//! by a fenced code block:
//!
//! ````text
//! FILE: order.py
//! ```python
//! def total(items): ...
//! ```
//! ````
//!
//! Fences that are not preceded by a header are kept separately so a caller
//! expecting exactly one file can still use them.

use std::collections::BTreeMap;

/// Code blocks found in a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Blocks introduced by a `FILE:` header, keyed by the given name.
    pub named: BTreeMap<String, String>,
    /// Blocks without a header, in order.
    pub unnamed: Vec<String>,
}

impl ParsedResponse {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.unnamed.is_empty()
    }

    /// Resolve against the names the caller asked for.
    ///
    /// Named blocks are returned as-is. When there are none, a single
    /// unnamed block is attributed to a single expected name.
    #[must_use]
    pub fn into_files(self, expected: &[String]) -> BTreeMap<String, String> {
        if !self.named.is_empty() {
            return self.named;
        }
        match (self.unnamed.as_slice(), expected) {
            ([only], [name]) => BTreeMap::from([(name.clone(), only.clone())]),
            _ => BTreeMap::new(),
        }
    }
}

/// Header name from a `FILE:` line, tolerating markdown decoration.
fn header_name(line: &str) -> Option<String> {
    let trimmed = line.trim().trim_matches(|c| c == '*' || c == '#').trim();
    let rest = trimmed.strip_prefix("FILE:")?;
    let name = rest
        .trim()
        .trim_matches(|c: char| c == '`' || c == '*' || c == '"' || c == '\'')
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Split a reply into code blocks.
///
/// # Example
///
/// ```
/// use refactor_swarm::llm::parse_file_blocks;
///
/// let reply = "FILE: a.py\n```python\nx = 1\n```\n";
/// let parsed = parse_file_blocks(reply);
/// assert_eq!(parsed.named["a.py"], "x = 1\n");
/// ```
#[must_use]
pub fn parse_file_blocks(reply: &str) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();
    let mut pending: Option<String> = None;
    let mut block: Option<String> = None;

    for line in reply.lines() {
        if let Some(body) = block.as_mut() {
            if line.trim() == "```" {
                let content = block.take().unwrap_or_default();
                match pending.take() {
                    Some(name) => {
                        parsed.named.insert(name, content);
                    }
                    None => parsed.unnamed.push(content),
                }
            } else {
                body.push_str(line);
                body.push('\n');
            }
            continue;
        }

        if is_fence(line) {
            block = Some(String::new());
        } else if let Some(name) = header_name(line) {
            pending = Some(name);
        }
    }

    // Unterminated final fence: keep what was written.
    if let Some(content) = block {
        match pending {
            Some(name) => {
                parsed.named.insert(name, content);
            }
            None => parsed.unnamed.push(content),
        }
    }

    parsed
}
