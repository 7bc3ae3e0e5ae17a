//! Reader for the subset of XML Schema used by job scheduling documents.
//!
//! Supported: global and local element declarations (`name`, `type`, `ref`,
//! occurrence bounds), named and anonymous complex types built from
//! `sequence` and `choice`, attributes, simple content extensions and
//! simple types restricting a built-in type by enumeration. Local element
//! declarations are flattened by name, so one name must have one type.

use std::collections::HashMap;

use roxmltree::{Document, Node, ParsingOptions};

use super::grammar::{
    AttributeDecl, AttributeDefault, ContentModel, Datatype, Grammar, GrammarKind, Particle,
};
use super::GrammarError;
use crate::xml::{element_children, get_tag_name};

const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Read an XML Schema document into a grammar.
pub fn parse_xsd(text: &str) -> Result<Grammar, GrammarError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options)?;
    let schema = doc.root_element();
    if !is_xs(schema, "schema") {
        return Err(GrammarError::Unsupported(format!(
            "root element <{}> is not an XML Schema",
            get_tag_name(schema)
        )));
    }

    let namespace = schema.attribute("targetNamespace").map(str::to_string);
    if namespace.is_some() && schema.attribute("elementFormDefault") != Some("qualified") {
        return Err(GrammarError::Unsupported(
            "unqualified local elements".to_string(),
        ));
    }

    let mut reader = SchemaReader::new(schema);
    reader.grammar.namespace = namespace;

    for child in element_children(schema) {
        if is_xs(child, "element") {
            let name = required_attribute(child, "name")?;
            reader.grammar.declare_global(name);
            reader.element(child)?;
        }
    }

    tracing::debug!(
        elements = reader.grammar.element_count(),
        namespace = ?reader.grammar.namespace,
        "Read XML Schema"
    );
    Ok(reader.grammar)
}

struct SchemaReader<'a, 'input> {
    grammar: Grammar,
    complex_types: HashMap<&'a str, Node<'a, 'input>>,
    simple_types: HashMap<&'a str, Node<'a, 'input>>,
    /// Type identity each element name was first declared with.
    declared: HashMap<String, String>,
}

impl<'a, 'input> SchemaReader<'a, 'input> {
    fn new(schema: Node<'a, 'input>) -> Self {
        let mut complex_types = HashMap::new();
        let mut simple_types = HashMap::new();
        for child in element_children(schema) {
            if let Some(name) = child.attribute("name") {
                if is_xs(child, "complexType") {
                    complex_types.insert(name, child);
                } else if is_xs(child, "simpleType") {
                    simple_types.insert(name, child);
                }
            }
        }

        Self {
            grammar: Grammar::new(GrammarKind::Schema),
            complex_types,
            simple_types,
            declared: HashMap::new(),
        }
    }

    /// Declare an element and return the particle referring to it.
    fn element(&mut self, node: Node<'a, 'input>) -> Result<Particle, GrammarError> {
        let (min, max) = occurs(node)?;

        if let Some(reference) = node.attribute("ref") {
            return Ok(Particle::Element(local_part(reference).to_string()).occurs(min, max));
        }

        let name = required_attribute(node, "name")?;
        let identity = match node.attribute("type") {
            Some(type_name) => type_name.to_string(),
            None => format!("#anonymous@{}", node.range().start),
        };

        match self.declared.get(name) {
            Some(existing) if *existing == identity => {
                return Ok(Particle::Element(name.to_string()).occurs(min, max));
            }
            Some(_) => {
                return Err(GrammarError::Unsupported(format!(
                    "element '{name}' is declared with more than one type"
                )));
            }
            None => {
                self.declared.insert(name.to_string(), identity);
            }
        }

        let (content, attributes) = if let Some(type_name) = node.attribute("type") {
            self.named_type(node, type_name)?
        } else if let Some(complex) = xs_child(node, "complexType") {
            self.complex_type(complex)?
        } else if let Some(simple) = xs_child(node, "simpleType") {
            (ContentModel::Text(self.simple_type(simple)?), Vec::new())
        } else {
            (ContentModel::Any, Vec::new())
        };

        self.grammar.declare_element(name, content);
        for decl in attributes {
            self.grammar.declare_attribute(name, decl);
        }
        Ok(Particle::Element(name.to_string()).occurs(min, max))
    }

    fn named_type(
        &mut self,
        context: Node<'a, 'input>,
        type_name: &'a str,
    ) -> Result<(ContentModel, Vec<AttributeDecl>), GrammarError> {
        if let Some(builtin) = builtin(context, type_name) {
            return Ok((ContentModel::Text(builtin), Vec::new()));
        }
        let local = local_part(type_name);
        if let Some(&complex) = self.complex_types.get(local) {
            return self.complex_type(complex);
        }
        if let Some(&simple) = self.simple_types.get(local) {
            return Ok((ContentModel::Text(self.simple_type(simple)?), Vec::new()));
        }
        Err(GrammarError::UnknownType(type_name.to_string()))
    }

    fn complex_type(
        &mut self,
        node: Node<'a, 'input>,
    ) -> Result<(ContentModel, Vec<AttributeDecl>), GrammarError> {
        if node.attribute("mixed") == Some("true") {
            return Err(GrammarError::Unsupported("mixed complex types".to_string()));
        }

        let mut particle = None;
        let mut text = None;
        let mut attributes = Vec::new();

        for child in element_children(node) {
            match xs_name(child) {
                Some("sequence" | "choice") => particle = Some(self.group(child)?),
                Some("attribute") => attributes.push(self.attribute(child)?),
                Some("simpleContent") => {
                    let extension = xs_child(child, "extension").ok_or_else(|| {
                        GrammarError::Unsupported("simple content restriction".to_string())
                    })?;
                    let base = required_attribute(extension, "base")?;
                    text = Some(self.simple_type_named(extension, base)?);
                    for attribute in element_children(extension) {
                        if is_xs(attribute, "attribute") {
                            attributes.push(self.attribute(attribute)?);
                        }
                    }
                }
                Some("annotation") => {}
                Some(other) => {
                    return Err(GrammarError::Unsupported(format!("xs:{other} in complex types")))
                }
                None => {}
            }
        }

        let content = match (particle, text) {
            (Some(particle), _) => ContentModel::Elements(particle),
            (None, Some(datatype)) => ContentModel::Text(datatype),
            (None, None) => ContentModel::Empty,
        };
        Ok((content, attributes))
    }

    fn group(&mut self, node: Node<'a, 'input>) -> Result<Particle, GrammarError> {
        let (min, max) = occurs(node)?;
        let mut items = Vec::new();
        for child in element_children(node) {
            match xs_name(child) {
                Some("element") => items.push(self.element(child)?),
                Some("sequence" | "choice") => items.push(self.group(child)?),
                Some("annotation") => {}
                Some(other) => {
                    return Err(GrammarError::Unsupported(format!("xs:{other} in model groups")))
                }
                None => {}
            }
        }

        let particle = if xs_name(node) == Some("choice") {
            Particle::Choice(items)
        } else {
            Particle::Sequence(items)
        };
        Ok(particle.occurs(min, max))
    }

    fn attribute(&mut self, node: Node<'a, 'input>) -> Result<AttributeDecl, GrammarError> {
        if node.attribute("ref").is_some() {
            return Err(GrammarError::Unsupported("attribute references".to_string()));
        }
        let name = required_attribute(node, "name")?.to_string();

        let datatype = if let Some(type_name) = node.attribute("type") {
            self.simple_type_named(node, type_name)?
        } else if let Some(simple) = xs_child(node, "simpleType") {
            self.simple_type(simple)?
        } else {
            Datatype::String
        };

        let default = match (node.attribute("use"), node.attribute("fixed"), node.attribute("default")) {
            (Some("required"), _, _) => AttributeDefault::Required,
            (Some("prohibited"), _, _) => {
                return Err(GrammarError::Unsupported("prohibited attributes".to_string()))
            }
            (_, Some(fixed), _) => AttributeDefault::Fixed(fixed.to_string()),
            (_, None, Some(default)) => AttributeDefault::Value(default.to_string()),
            _ => AttributeDefault::Implied,
        };

        Ok(AttributeDecl {
            name,
            datatype,
            default,
        })
    }

    fn simple_type_named(
        &mut self,
        context: Node<'a, 'input>,
        type_name: &'a str,
    ) -> Result<Datatype, GrammarError> {
        if let Some(builtin) = builtin(context, type_name) {
            return Ok(builtin);
        }
        match self.simple_types.get(local_part(type_name)) {
            Some(&simple) => self.simple_type(simple),
            None => Err(GrammarError::UnknownType(type_name.to_string())),
        }
    }

    fn simple_type(&mut self, node: Node<'a, 'input>) -> Result<Datatype, GrammarError> {
        let restriction = xs_child(node, "restriction").ok_or_else(|| {
            GrammarError::Unsupported("simple types other than restrictions".to_string())
        })?;
        let base = match restriction.attribute("base") {
            Some(base) => self.simple_type_named(restriction, base)?,
            None => Datatype::String,
        };

        let values: Vec<String> = element_children(restriction)
            .filter(|facet| is_xs(*facet, "enumeration"))
            .filter_map(|facet| facet.attribute("value"))
            .map(str::to_string)
            .collect();

        if values.is_empty() {
            Ok(base)
        } else {
            Ok(Datatype::Enumeration(values))
        }
    }
}

fn is_xs(node: Node<'_, '_>, name: &str) -> bool {
    xs_name(node) == Some(name)
}

fn xs_name<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    (node.is_element() && node.tag_name().namespace() == Some(XS_NAMESPACE))
        .then(|| get_tag_name(node))
}

fn xs_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    element_children(node).find(|child| is_xs(*child, name))
}

fn local_part(qname: &str) -> &str {
    qname.rsplit_once(':').map_or(qname, |(_, local)| local)
}

fn required_attribute<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, GrammarError> {
    node.attribute(name).ok_or_else(|| {
        GrammarError::Unsupported(format!(
            "xs:{} without a '{name}' attribute",
            get_tag_name(node)
        ))
    })
}

fn occurs(node: Node<'_, '_>) -> Result<(u32, Option<u32>), GrammarError> {
    let parse = |value: &str| {
        value
            .parse::<u32>()
            .map_err(|_| GrammarError::Unsupported(format!("occurrence bound '{value}'")))
    };
    let min = node.attribute("minOccurs").map(parse).transpose()?.unwrap_or(1);
    let max = match node.attribute("maxOccurs") {
        Some("unbounded") => None,
        Some(value) => Some(parse(value)?),
        None => Some(1),
    };
    Ok((min, max))
}

/// Map a QName in the XML Schema namespace to a built-in datatype.
fn builtin<'a>(context: Node<'a, '_>, type_name: &'a str) -> Option<Datatype> {
    let (prefix, local) = match type_name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, type_name),
    };
    if context.lookup_namespace_uri(prefix) != Some(XS_NAMESPACE) {
        return None;
    }

    let datatype = match local {
        "boolean" => Datatype::Boolean,
        "int" => Datatype::Int,
        "long" => Datatype::Long,
        "integer" => Datatype::Integer,
        "nonNegativeInteger" => Datatype::NonNegativeInteger,
        "dateTime" => Datatype::DateTime,
        "string" | "normalizedString" | "token" => Datatype::String,
        other => {
            tracing::debug!(datatype = other, "Checking unsupported built-in type as string");
            Datatype::String
        }
    };
    Some(datatype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BUNDLED: &str = include_str!("../../resources/job_scheduling_data_1_1.xsd");

    #[test]
    fn test_parse_bundled_schema() {
        let grammar = parse_xsd(BUNDLED).unwrap();

        assert_eq!(grammar.kind, GrammarKind::Schema);
        assert_eq!(
            grammar.namespace.as_deref(),
            Some("http://jobsched.dev/ns/job-scheduling-data")
        );
        assert!(grammar.is_global("job-scheduling-data"));
        assert!(!grammar.is_global("job"));

        assert_eq!(grammar.element("volatility"), Some(&ContentModel::Text(Datatype::Boolean)));
        assert_eq!(grammar.element("start-time"), Some(&ContentModel::Text(Datatype::DateTime)));
        assert!(matches!(
            grammar.element("misfire-instruction"),
            Some(ContentModel::Text(Datatype::Enumeration(values))) if values.len() == 8
        ));
    }

    #[test]
    fn test_recursive_calendar_type() {
        let grammar = parse_xsd(BUNDLED).unwrap();
        let Some(ContentModel::Elements(calendar)) = grammar.element("calendar") else {
            panic!("calendar should have element content");
        };
        assert_eq!(calendar.to_string(), "(name, description?, base-calendar?)");
        assert!(grammar.element("base-calendar").is_some());

        let attrs = grammar.attributes("base-calendar");
        assert_eq!(attrs[0].name, "class-name");
        assert_eq!(attrs[0].default, AttributeDefault::Required);
        assert_eq!(attrs[1].default, AttributeDefault::Value("false".to_string()));
    }

    #[test]
    fn test_nested_optional_sequence() {
        let grammar = parse_xsd(BUNDLED).unwrap();
        let Some(ContentModel::Elements(simple)) = grammar.element("simple") else {
            panic!("simple should have element content");
        };
        assert!(simple.matches(&["name", "job-name", "start-time"]));
        assert!(simple.matches(&["name", "job-name", "start-time", "repeat-count", "repeat-interval"]));
        assert!(!simple.matches(&["name", "job-name", "start-time", "repeat-interval"]));
    }

    #[test]
    fn test_conflicting_local_types_rejected() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="root">
                <xs:complexType>
                    <xs:sequence>
                        <xs:element name="value" type="xs:int"/>
                        <xs:element name="value" type="xs:string"/>
                    </xs:sequence>
                </xs:complexType>
            </xs:element>
        </xs:schema>"#;
        assert!(matches!(parse_xsd(xsd), Err(GrammarError::Unsupported(_))));
    }

    #[test]
    fn test_unknown_type() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="root" type="missingType"/>
        </xs:schema>"#;
        assert!(matches!(parse_xsd(xsd), Err(GrammarError::UnknownType(name)) if name == "missingType"));
    }

    #[test]
    fn test_not_a_schema() {
        assert!(matches!(parse_xsd("<root/>"), Err(GrammarError::Unsupported(_))));
        assert!(matches!(parse_xsd("<xs:schema"), Err(GrammarError::Xml(_))));
    }
}
