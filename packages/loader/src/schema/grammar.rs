//! Grammar model shared by the DTD and XML Schema readers.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

/// Lexical form of `xs:dateTime`.
#[allow(clippy::expect_used)]
static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^-?(\d{4,}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2})(\.\d+)?(Z|[+-]\d{2}:\d{2})?$",
    )
    .expect("valid regex")
});

/// Which kind of grammar a [`Grammar`] was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarKind {
    Dtd,
    Schema,
}

/// Simple datatypes for element text and attribute values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    String,
    Boolean,
    Int,
    Long,
    Integer,
    NonNegativeInteger,
    DateTime,
    Enumeration(Vec<String>),
}

impl Datatype {
    /// Check a value against this type.
    ///
    /// Non-string types ignore surrounding whitespace.
    pub fn check(&self, value: &str) -> Result<(), String> {
        let collapsed = value.trim();
        let valid = match self {
            Self::String => true,
            Self::Boolean => matches!(collapsed, "true" | "false" | "1" | "0"),
            Self::Int => collapsed.parse::<i32>().is_ok(),
            Self::Long => collapsed.parse::<i64>().is_ok(),
            Self::Integer => is_integer(collapsed),
            Self::NonNegativeInteger => {
                is_integer(collapsed)
                    && (!collapsed.starts_with('-') || collapsed[1..].chars().all(|c| c == '0'))
            }
            Self::DateTime => is_date_time(collapsed),
            Self::Enumeration(values) => values.iter().any(|v| v == collapsed),
        };

        if valid {
            Ok(())
        } else {
            Err(format!("'{collapsed}' is not a valid value for {self}"))
        }
    }
}

fn is_integer(value: &str) -> bool {
    let digits = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_date_time(value: &str) -> bool {
    DATE_TIME_RE
        .captures(value)
        .and_then(|caps| caps.get(1))
        .is_some_and(|main| NaiveDateTime::parse_from_str(main.as_str(), "%Y-%m-%dT%H:%M:%S").is_ok())
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Boolean => f.write_str("boolean"),
            Self::Int => f.write_str("int"),
            Self::Long => f.write_str("long"),
            Self::Integer => f.write_str("integer"),
            Self::NonNegativeInteger => f.write_str("nonNegativeInteger"),
            Self::DateTime => f.write_str("dateTime"),
            Self::Enumeration(values) => write!(f, "({})", values.join(" | ")),
        }
    }
}

/// How an attribute's presence and value are constrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeDefault {
    Required,
    Implied,
    Fixed(String),
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: String,
    pub datatype: Datatype,
    pub default: AttributeDefault,
}

/// A content model particle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Particle {
    Element(String),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    Repeat {
        particle: Box<Particle>,
        min: u32,
        max: Option<u32>,
    },
}

impl Particle {
    /// Wrap in an occurrence constraint, leaving `{1,1}` unwrapped.
    #[must_use]
    pub fn occurs(self, min: u32, max: Option<u32>) -> Self {
        if min == 1 && max == Some(1) {
            self
        } else {
            Self::Repeat {
                particle: Box::new(self),
                min,
                max,
            }
        }
    }

    /// Whether `names` is a complete match of this particle.
    #[must_use]
    pub fn matches(&self, names: &[&str]) -> bool {
        self.positions(names, 0).contains(&names.len())
    }

    /// Whether `name` can appear anywhere in this particle.
    #[must_use]
    pub fn mentions(&self, name: &str) -> bool {
        match self {
            Self::Element(candidate) => candidate == name,
            Self::Sequence(items) | Self::Choice(items) => items.iter().any(|p| p.mentions(name)),
            Self::Repeat { particle, .. } => particle.mentions(name),
        }
    }

    /// Every position in `names` where a match starting at `start` can end.
    fn positions(&self, names: &[&str], start: usize) -> BTreeSet<usize> {
        match self {
            Self::Element(name) => {
                let mut out = BTreeSet::new();
                if names.get(start).is_some_and(|candidate| candidate == name) {
                    out.insert(start + 1);
                }
                out
            }
            Self::Sequence(items) => {
                let mut current = BTreeSet::from([start]);
                for item in items {
                    current = current
                        .iter()
                        .flat_map(|&pos| item.positions(names, pos))
                        .collect();
                    if current.is_empty() {
                        break;
                    }
                }
                current
            }
            Self::Choice(items) => items
                .iter()
                .flat_map(|item| item.positions(names, start))
                .collect(),
            Self::Repeat { particle, min, max } => {
                let min = usize::try_from(*min).unwrap_or(usize::MAX);
                let max = max.map(|max| usize::try_from(max).unwrap_or(usize::MAX));
                let mut result = BTreeSet::new();
                if max.is_some_and(|max| max < min) {
                    return result;
                }
                if min == 0 {
                    result.insert(start);
                }
                // A nullable particle only grows the set until it is stable,
                // any other consumes a name per round
                let mut current = BTreeSet::from([start]);
                for round in 1..=names.len().saturating_add(1) {
                    if max.is_some_and(|max| round > max) {
                        break;
                    }
                    let next: BTreeSet<usize> = current
                        .iter()
                        .flat_map(|&pos| particle.positions(names, pos))
                        .collect();
                    if next.is_empty() {
                        break;
                    }
                    let stable = next == current;
                    if round >= min || stable {
                        result.extend(next.iter().copied());
                    }
                    if stable {
                        break;
                    }
                    current = next;
                }
                result
            }
        }
    }
}

impl fmt::Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(name) => f.write_str(name),
            Self::Sequence(items) => write_group(f, items, ", "),
            Self::Choice(items) => write_group(f, items, " | "),
            Self::Repeat { particle, min, max } => {
                write!(f, "{particle}")?;
                match (min, max) {
                    (0, Some(1)) => f.write_str("?"),
                    (0, None) => f.write_str("*"),
                    (1, None) => f.write_str("+"),
                    (min, Some(max)) => write!(f, "{{{min},{max}}}"),
                    (min, None) => write!(f, "{{{min},}}"),
                }
            }
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, items: &[Particle], separator: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

/// Allowed content of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentModel {
    Empty,
    Any,
    /// Character data mixed with the listed elements.
    Mixed(Vec<String>),
    /// Character data of a simple type, no child elements.
    Text(Datatype),
    /// Child elements only.
    Elements(Particle),
}

/// Element and attribute declarations of one document type.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub kind: GrammarKind,
    /// Name the document root must have, if the grammar fixes one.
    pub root: Option<String>,
    /// Namespace every element must be in, if the grammar has a target namespace.
    pub namespace: Option<String>,
    global_elements: BTreeSet<String>,
    elements: HashMap<String, ContentModel>,
    attributes: HashMap<String, Vec<AttributeDecl>>,
}

impl Grammar {
    #[must_use]
    pub fn new(kind: GrammarKind) -> Self {
        Self {
            kind,
            root: None,
            namespace: None,
            global_elements: BTreeSet::new(),
            elements: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    /// Declare an element. The first declaration of a name wins.
    pub fn declare_element(&mut self, name: impl Into<String>, content: ContentModel) -> bool {
        let name = name.into();
        if self.elements.contains_key(&name) {
            return false;
        }
        self.elements.insert(name, content);
        true
    }

    /// Declare an attribute. The first declaration of an attribute wins.
    pub fn declare_attribute(&mut self, element: impl Into<String>, decl: AttributeDecl) {
        let decls = self.attributes.entry(element.into()).or_default();
        if !decls.iter().any(|existing| existing.name == decl.name) {
            decls.push(decl);
        }
    }

    /// Mark an element as allowed at the document root.
    pub fn declare_global(&mut self, name: impl Into<String>) {
        self.global_elements.insert(name.into());
    }

    /// Fold in declarations from another grammar without overriding ours.
    pub fn merge(&mut self, other: Grammar) {
        for (name, content) in other.elements {
            self.declare_element(name, content);
        }
        for (element, decls) in other.attributes {
            for decl in decls {
                self.declare_attribute(element.clone(), decl);
            }
        }
        self.global_elements.extend(other.global_elements);
    }

    #[must_use]
    pub fn element(&self, name: &str) -> Option<&ContentModel> {
        self.elements.get(name)
    }

    #[must_use]
    pub fn attributes(&self, element: &str) -> &[AttributeDecl] {
        self.attributes.get(element).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_global(&self, name: &str) -> bool {
        self.global_elements.contains(name)
    }

    pub fn global_elements(&self) -> impl Iterator<Item = &str> {
        self.global_elements.iter().map(String::as_str)
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(name: &str) -> Particle {
        Particle::Element(name.to_string())
    }

    #[test]
    fn test_sequence_with_optional() {
        let model = Particle::Sequence(vec![el("name"), el("group").occurs(0, Some(1)), el("job-class")]);
        assert!(model.matches(&["name", "job-class"]));
        assert!(model.matches(&["name", "group", "job-class"]));
        assert!(!model.matches(&["group", "name", "job-class"]));
        assert!(!model.matches(&["name"]));
    }

    #[test]
    fn test_star_and_plus() {
        let model = Particle::Sequence(vec![el("calendar").occurs(0, None), el("job").occurs(1, None)]);
        assert!(model.matches(&["job"]));
        assert!(model.matches(&["calendar", "calendar", "job", "job"]));
        assert!(!model.matches(&["calendar"]));
        assert!(!model.matches(&["job", "calendar"]));
    }

    #[test]
    fn test_choice() {
        let model = Particle::Choice(vec![el("simple"), el("cron")]);
        assert!(model.matches(&["simple"]));
        assert!(model.matches(&["cron"]));
        assert!(!model.matches(&["simple", "cron"]));
        assert!(!model.matches(&[]));
    }

    #[test]
    fn test_optional_group() {
        let model = Particle::Sequence(vec![
            el("start-time"),
            Particle::Sequence(vec![el("repeat-count"), el("repeat-interval")]).occurs(0, Some(1)),
        ]);
        assert!(model.matches(&["start-time"]));
        assert!(model.matches(&["start-time", "repeat-count", "repeat-interval"]));
        assert!(!model.matches(&["start-time", "repeat-count"]));
    }

    #[test]
    fn test_repeat_of_nullable_particle_terminates() {
        let model = el("a").occurs(0, Some(1)).occurs(0, None);
        assert!(model.matches(&[]));
        assert!(model.matches(&["a", "a", "a"]));
    }

    #[test]
    fn test_bounded_repeat() {
        let model = el("a").occurs(2, Some(3));
        assert!(!model.matches(&["a"]));
        assert!(model.matches(&["a", "a"]));
        assert!(model.matches(&["a", "a", "a"]));
        assert!(!model.matches(&["a", "a", "a", "a"]));
    }

    #[test]
    fn test_huge_min_occurs() {
        assert!(!el("a").occurs(u32::MAX, None).matches(&["a", "a"]));

        let nullable = el("a").occurs(0, Some(1)).occurs(u32::MAX, None);
        assert!(nullable.matches(&["a"]));

        assert!(!el("a").occurs(3, Some(2)).matches(&["a", "a"]));
    }

    #[test]
    fn test_particle_display() {
        let model = Particle::Sequence(vec![
            el("name"),
            el("group").occurs(0, Some(1)),
            Particle::Choice(vec![el("simple"), el("cron")]).occurs(0, None),
        ]);
        assert_eq!(model.to_string(), "(name, group?, (simple | cron)*)");
    }

    #[test]
    fn test_datatype_checks() {
        assert!(Datatype::Boolean.check("true").is_ok());
        assert!(Datatype::Boolean.check(" 0 ").is_ok());
        assert!(Datatype::Boolean.check("yes").is_err());
        assert!(Datatype::Int.check("-5").is_ok());
        assert!(Datatype::Int.check("99999999999").is_err());
        assert!(Datatype::Long.check("99999999999").is_ok());
        assert!(Datatype::Integer.check("+12").is_ok());
        assert!(Datatype::Integer.check("1.5").is_err());
        assert!(Datatype::NonNegativeInteger.check("0").is_ok());
        assert!(Datatype::NonNegativeInteger.check("-1").is_err());
        assert!(Datatype::DateTime.check("2024-01-02T03:04:05").is_ok());
        assert!(Datatype::DateTime.check("2024-01-02T03:04:05.250+01:00").is_ok());
        assert!(Datatype::DateTime.check("2024-13-02T03:04:05").is_err());
        assert!(Datatype::DateTime.check("2024-01-02 03:04:05 AM").is_err());

        let misfire = Datatype::Enumeration(vec!["A".to_string(), "B".to_string()]);
        assert!(misfire.check("B").is_ok());
        assert_eq!(misfire.check("C").unwrap_err(), "'C' is not a valid value for (A | B)");
    }

    #[test]
    fn test_first_declaration_wins() {
        let mut grammar = Grammar::new(GrammarKind::Dtd);
        assert!(grammar.declare_element("a", ContentModel::Empty));
        assert!(!grammar.declare_element("a", ContentModel::Any));
        assert_eq!(grammar.element("a"), Some(&ContentModel::Empty));

        let mut other = Grammar::new(GrammarKind::Dtd);
        other.declare_element("a", ContentModel::Any);
        other.declare_element("b", ContentModel::Any);
        grammar.merge(other);
        assert_eq!(grammar.element("a"), Some(&ContentModel::Empty));
        assert_eq!(grammar.element_count(), 2);
    }
}
