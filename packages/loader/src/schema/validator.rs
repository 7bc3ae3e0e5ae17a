//! Validation of a parsed document against a [`Grammar`].

use roxmltree::{Document, Node};

use super::grammar::{AttributeDefault, ContentModel, Grammar, GrammarKind};
use crate::validation::ValidationProblems;
use crate::xml::{direct_text, element_children, get_tag_name, has_character_data, text_position};

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Checks a document tree against a grammar, recording every problem.
pub struct Validator<'g> {
    grammar: &'g Grammar,
}

impl<'g> Validator<'g> {
    #[must_use]
    pub fn new(grammar: &'g Grammar) -> Self {
        Self { grammar }
    }

    /// Validate the whole document. Problems are appended to `problems`.
    pub fn validate(&self, doc: &Document<'_>, problems: &mut ValidationProblems) {
        let root = doc.root_element();
        let before = problems.len();

        self.check_root(root, problems);
        for element in root.descendants().filter(Node::is_element) {
            self.check_element(element, problems);
        }

        tracing::debug!(
            kind = ?self.grammar.kind,
            problems = problems.len() - before,
            "Validated document"
        );
    }

    fn check_root(&self, root: Node<'_, '_>, problems: &mut ValidationProblems) {
        let name = get_tag_name(root);
        match self.grammar.kind {
            GrammarKind::Dtd => {
                if let Some(expected) = &self.grammar.root {
                    let expected_local = expected.rsplit_once(':').map_or(expected.as_str(), |(_, l)| l);
                    if expected_local != name {
                        problems.error(
                            format!(
                                "Document root element '{name}' must match DOCTYPE root '{expected}'"
                            ),
                            Some(text_position(root)),
                        );
                    }
                }
            }
            GrammarKind::Schema => {
                if !self.grammar.is_global(name) {
                    problems.error(
                        format!("Cannot find the declaration of element '{name}'"),
                        Some(text_position(root)),
                    );
                }
            }
        }
    }

    fn check_element(&self, node: Node<'_, '_>, problems: &mut ValidationProblems) {
        let name = get_tag_name(node);
        let position = Some(text_position(node));

        if let Some(namespace) = &self.grammar.namespace {
            if node.tag_name().namespace() != Some(namespace.as_str()) {
                problems.error(
                    format!("Element '{name}' is not in namespace '{namespace}'"),
                    position,
                );
            }
        }

        let Some(content) = self.grammar.element(name) else {
            problems.error(format!("Element type '{name}' must be declared"), position);
            return;
        };

        self.check_attributes(node, name, problems);

        match content {
            ContentModel::Any => {}
            ContentModel::Empty => {
                if element_children(node).next().is_some() || has_character_data(node) {
                    problems.error(format!("Element '{name}' must have no content"), position);
                }
            }
            ContentModel::Mixed(allowed) => {
                for child in element_children(node) {
                    let child_name = get_tag_name(child);
                    if !allowed.iter().any(|a| a == child_name) {
                        problems.error(
                            format!("Element '{child_name}' is not allowed in '{name}'"),
                            Some(text_position(child)),
                        );
                    }
                }
            }
            ContentModel::Text(datatype) => {
                if element_children(node).next().is_some() {
                    problems.error(
                        format!("Element '{name}' must not contain elements"),
                        position,
                    );
                } else if let Err(reason) = datatype.check(&direct_text(node)) {
                    problems.error(
                        format!("Invalid content of element '{name}': {reason}"),
                        position,
                    );
                }
            }
            ContentModel::Elements(particle) => {
                if has_character_data(node) {
                    problems.error(
                        format!("Element '{name}' must not contain character data"),
                        position,
                    );
                }

                let children: Vec<Node<'_, '_>> = element_children(node).collect();
                let names: Vec<&str> = children.iter().map(|child| get_tag_name(*child)).collect();
                if particle.matches(&names) {
                    return;
                }

                match children
                    .iter()
                    .find(|child| !particle.mentions(get_tag_name(**child)))
                {
                    Some(stray) => problems.error(
                        format!(
                            "Element '{}' is not allowed in '{name}'",
                            get_tag_name(*stray)
                        ),
                        Some(text_position(*stray)),
                    ),
                    None => problems.error(
                        format!(
                            "The content of element '{name}' is incomplete or out of order: \
                             expected {particle}, found ({})",
                            names.join(", ")
                        ),
                        position,
                    ),
                }
            }
        }
    }

    fn check_attributes(&self, node: Node<'_, '_>, name: &str, problems: &mut ValidationProblems) {
        let declared = self.grammar.attributes(name);
        let position = Some(text_position(node));

        for attribute in node.attributes() {
            if matches!(attribute.namespace(), Some(XSI_NAMESPACE | XML_NAMESPACE)) {
                continue;
            }
            let attribute_name = attribute.name();
            let decl = declared
                .iter()
                .find(|decl| decl.name == attribute_name && attribute.namespace().is_none());

            let Some(decl) = decl else {
                problems.error(
                    format!("Attribute '{attribute_name}' is not allowed to appear in element '{name}'"),
                    position,
                );
                continue;
            };

            if let Err(reason) = decl.datatype.check(attribute.value()) {
                problems.error(
                    format!("Invalid value for attribute '{attribute_name}' of element '{name}': {reason}"),
                    position,
                );
            }
            if let AttributeDefault::Fixed(fixed) = &decl.default {
                if attribute.value() != fixed {
                    problems.error(
                        format!(
                            "Attribute '{attribute_name}' of element '{name}' must have the fixed value '{fixed}'"
                        ),
                        position,
                    );
                }
            }
        }

        for decl in declared {
            if decl.default == AttributeDefault::Required && node.attribute(decl.name.as_str()).is_none() {
                problems.error(
                    format!("Attribute '{}' must appear on element '{name}'", decl.name),
                    position,
                );
            }
        }
    }
}
