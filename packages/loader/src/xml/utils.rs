//! XML utility functions for navigating parsed documents.

use roxmltree::{Document, Node, ParsingOptions};

/// Parsing options shared by every document the loader reads.
///
/// DOCTYPE declarations are allowed so that documents can reference their
/// grammar. Entity expansion is bounded by roxmltree itself.
#[must_use]
pub fn parsing_options<'input>() -> ParsingOptions<'input> {
    ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    }
}

/// Parse document text with [`parsing_options`].
pub fn parse_document(text: &str) -> Result<Document<'_>, roxmltree::Error> {
    Document::parse_with_options(text, parsing_options())
}

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use jobsched_loader::xml::get_tag_name;
///
/// let xml = r#"<jsd:job xmlns:jsd="http://jobsched.dev/ns/job-scheduling-data"/>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(get_tag_name(doc.root_element()), "job");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Get all element children of a node.
///
/// Excludes text nodes, comments and processing instructions.
pub fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

/// Concatenated direct text of an element, trimmed.
///
/// Text inside child elements is not included.
pub fn direct_text(node: Node<'_, '_>) -> String {
    let text: String = node
        .children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect();
    text.trim().to_string()
}

/// Whether an element has any non-whitespace direct text.
pub fn has_character_data(node: Node<'_, '_>) -> bool {
    node.children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .any(|text| !text.trim().is_empty())
}

/// Line and column (both 1-based) where a node starts.
pub fn text_position(node: Node<'_, '_>) -> (u32, u32) {
    let pos = node.document().text_pos_at(node.range().start);
    (pos.row, pos.col)
}
