//! Extraction of the document type declaration from raw document text.
//!
//! roxmltree accepts a DOCTYPE but does not expose it, so the declaration
//! is read from the text before the root element.

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static DOCTYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!DOCTYPE\s+([^\s\[>]+)(?:\s+(?:PUBLIC\s+(?:"([^"]*)"|'([^']*)')\s+(?:"([^"]*)"|'([^']*)')|SYSTEM\s+(?:"([^"]*)"|'([^']*)')))?\s*(?:\[(.*?)\]\s*)?>"#,
    )
    .expect("valid regex")
});

#[allow(clippy::expect_used)]
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

/// A document type declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctype {
    /// Name the root element must have.
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Declarations between `[` and `]`.
    pub internal_subset: Option<String>,
}

impl Doctype {
    /// Whether the declaration references an external subset.
    #[must_use]
    pub fn has_external_subset(&self) -> bool {
        self.system_id.is_some()
    }
}

/// Find the DOCTYPE of a document, if it has one.
#[must_use]
pub fn find_doctype(text: &str) -> Option<Doctype> {
    // Only the prolog can hold a DOCTYPE
    let prolog_end = first_element_start(text);
    let prolog = COMMENT_RE.replace_all(&text[..prolog_end], "");
    let caps = DOCTYPE_RE.captures(&prolog)?;

    let group = |indexes: &[usize]| {
        indexes
            .iter()
            .find_map(|&i| caps.get(i))
            .map(|m| m.as_str().to_string())
    };

    Some(Doctype {
        name: caps.get(1)?.as_str().to_string(),
        public_id: group(&[2, 3]),
        system_id: group(&[4, 5, 6, 7]),
        internal_subset: group(&[8]),
    })
}

/// Byte offset of the root element's start tag, or the text length.
fn first_element_start(text: &str) -> usize {
    let mut offset = 0;
    let mut in_subset = false;
    let bytes = text.as_bytes();
    while offset < bytes.len() {
        match bytes[offset] {
            b'[' => in_subset = true,
            b']' => in_subset = false,
            b'<' if !in_subset => {
                let next = bytes.get(offset + 1).copied();
                if next.is_some_and(|c| c != b'!' && c != b'?') {
                    return offset;
                }
            }
            _ => {}
        }
        offset += 1;
    }
    text.len()
}
