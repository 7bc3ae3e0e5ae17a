//! Reader for DTD markup declarations.
//!
//! Handles element and attribute-list declarations. Entity and notation
//! declarations are skipped; parameter entity references and conditional
//! sections are reported as unsupported.

use super::grammar::{
    AttributeDecl, AttributeDefault, ContentModel, Datatype, Grammar, GrammarKind, Particle,
};
use super::GrammarError;

/// Read the declarations of a DTD (external subset or internal subset).
pub fn parse_dtd(text: &str) -> Result<Grammar, GrammarError> {
    let mut cursor = Cursor::new(text);
    let mut grammar = Grammar::new(GrammarKind::Dtd);

    loop {
        cursor.skip_ws();
        if cursor.at_end() {
            break;
        }

        if cursor.eat("<!--") {
            cursor.skip_past("-->")?;
        } else if cursor.eat("<?") {
            cursor.skip_past("?>")?;
        } else if cursor.eat("<!ELEMENT") {
            parse_element(&mut cursor, &mut grammar)?;
        } else if cursor.eat("<!ATTLIST") {
            parse_attlist(&mut cursor, &mut grammar)?;
        } else if cursor.eat("<!ENTITY") || cursor.eat("<!NOTATION") {
            cursor.skip_declaration()?;
        } else if cursor.peek() == Some('%') {
            return Err(GrammarError::Unsupported(
                "parameter entity references".to_string(),
            ));
        } else if cursor.eat("<![") {
            return Err(GrammarError::Unsupported("conditional sections".to_string()));
        } else {
            return Err(cursor.error("Expected a markup declaration"));
        }
    }

    Ok(grammar)
}

fn parse_element(cursor: &mut Cursor<'_>, grammar: &mut Grammar) -> Result<(), GrammarError> {
    cursor.require_ws()?;
    let name = cursor.name()?;
    cursor.require_ws()?;

    let content = if cursor.eat("EMPTY") {
        ContentModel::Empty
    } else if cursor.eat("ANY") {
        ContentModel::Any
    } else if cursor.peek() == Some('(') {
        let start = cursor.pos;
        cursor.bump();
        cursor.skip_ws();
        if cursor.eat("#PCDATA") {
            parse_mixed(cursor)?
        } else {
            cursor.pos = start;
            ContentModel::Elements(parse_content_particle(cursor)?)
        }
    } else {
        return Err(cursor.error("Expected EMPTY, ANY or a content model"));
    };

    cursor.skip_ws();
    cursor.expect(">")?;

    if !grammar.declare_element(name.clone(), content) {
        tracing::trace!(element = %name, "Ignoring duplicate element declaration");
    }
    Ok(())
}

/// `(#PCDATA | a | b)*` after the `#PCDATA` token.
fn parse_mixed(cursor: &mut Cursor<'_>) -> Result<ContentModel, GrammarError> {
    let mut names = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.eat(")") {
            break;
        }
        cursor.expect("|")?;
        cursor.skip_ws();
        names.push(cursor.name()?);
    }

    let starred = cursor.eat("*");
    if !names.is_empty() && !starred {
        return Err(cursor.error("Mixed content with element names must end in ')*'"));
    }
    Ok(ContentModel::Mixed(names))
}

fn parse_content_particle(cursor: &mut Cursor<'_>) -> Result<Particle, GrammarError> {
    let particle = if cursor.eat("(") {
        let mut items = Vec::new();
        let mut separator: Option<char> = None;
        loop {
            cursor.skip_ws();
            items.push(parse_content_particle(cursor)?);
            cursor.skip_ws();
            match cursor.peek() {
                Some(')') => {
                    cursor.bump();
                    break;
                }
                Some(c @ (',' | '|')) => {
                    if separator.is_some_and(|s| s != c) {
                        return Err(cursor.error("Cannot mix ',' and '|' in one group"));
                    }
                    separator = Some(c);
                    cursor.bump();
                }
                _ => return Err(cursor.error("Expected ',', '|' or ')'")),
            }
        }
        match (separator, items.len()) {
            (Some('|'), _) => Particle::Choice(items),
            (_, 1) => items.remove(0),
            _ => Particle::Sequence(items),
        }
    } else {
        Particle::Element(cursor.name()?)
    };

    let particle = match cursor.peek() {
        Some('?') => particle.occurs(0, Some(1)),
        Some('*') => particle.occurs(0, None),
        Some('+') => particle.occurs(1, None),
        _ => return Ok(particle),
    };
    cursor.bump();
    Ok(particle)
}

fn parse_attlist(cursor: &mut Cursor<'_>, grammar: &mut Grammar) -> Result<(), GrammarError> {
    cursor.require_ws()?;
    let element = cursor.name()?;

    loop {
        cursor.skip_ws();
        if cursor.eat(">") {
            return Ok(());
        }

        let name = cursor.name()?;
        cursor.require_ws()?;
        let datatype = parse_attribute_type(cursor)?;
        cursor.require_ws()?;
        let default = if cursor.eat("#REQUIRED") {
            AttributeDefault::Required
        } else if cursor.eat("#IMPLIED") {
            AttributeDefault::Implied
        } else if cursor.eat("#FIXED") {
            cursor.require_ws()?;
            AttributeDefault::Fixed(cursor.quoted()?)
        } else {
            AttributeDefault::Value(cursor.quoted()?)
        };

        grammar.declare_attribute(
            element.clone(),
            AttributeDecl {
                name,
                datatype,
                default,
            },
        );
    }
}

fn parse_attribute_type(cursor: &mut Cursor<'_>) -> Result<Datatype, GrammarError> {
    if cursor.eat("NOTATION") {
        cursor.require_ws()?;
    }
    if cursor.eat("(") {
        let mut values = Vec::new();
        loop {
            cursor.skip_ws();
            values.push(cursor.name()?);
            cursor.skip_ws();
            if cursor.eat(")") {
                return Ok(Datatype::Enumeration(values));
            }
            cursor.expect("|")?;
        }
    }

    let keyword = cursor.name()?;
    match keyword.as_str() {
        "CDATA" | "ID" | "IDREF" | "IDREFS" | "ENTITY" | "ENTITIES" | "NMTOKEN" | "NMTOKENS" => {
            Ok(Datatype::String)
        }
        other => Err(cursor.error(&format!("Unknown attribute type '{other}'"))),
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), GrammarError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected '{token}'")))
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start_matches([' ', '\t', '\r', '\n']);
        self.pos = self.text.len() - trimmed.len();
    }

    fn require_ws(&mut self) -> Result<(), GrammarError> {
        let before = self.pos;
        self.skip_ws();
        if self.pos == before {
            return Err(self.error("Expected whitespace"));
        }
        Ok(())
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), GrammarError> {
        match self.rest().find(terminator) {
            Some(offset) => {
                self.pos += offset + terminator.len();
                Ok(())
            }
            None => Err(self.error(&format!("Unterminated construct, expected '{terminator}'"))),
        }
    }

    /// Skip to the `>` closing a declaration, ignoring `>` inside literals.
    fn skip_declaration(&mut self) -> Result<(), GrammarError> {
        let mut quote: Option<char> = None;
        while let Some(c) = self.peek() {
            self.bump();
            match (quote, c) {
                (None, '"' | '\'') => quote = Some(c),
                (Some(q), c) if q == c => quote = None,
                (None, '>') => return Ok(()),
                _ => {}
            }
        }
        Err(self.error("Unterminated declaration"))
    }

    fn name(&mut self) -> Result<String, GrammarError> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
            .map_or(rest.len(), |(i, _)| i);
        if len == 0 {
            return Err(self.error("Expected a name"));
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    fn quoted(&mut self) -> Result<String, GrammarError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("Expected a quoted literal")),
        };
        self.bump();
        let rest = self.rest();
        match rest.find(quote) {
            Some(end) => {
                self.pos += end + 1;
                Ok(rest[..end].to_string())
            }
            None => Err(self.error("Unterminated literal")),
        }
    }

    fn error(&self, message: &str) -> GrammarError {
        let consumed = &self.text[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rfind('\n')
            .map_or(consumed.chars().count(), |nl| consumed[nl + 1..].chars().count())
            + 1;
        GrammarError::Syntax {
            message: message.to_string(),
            line: u32::try_from(line).unwrap_or(u32::MAX),
            column: u32::try_from(column).unwrap_or(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BUNDLED: &str = include_str!("../../resources/job_scheduling_data_1_0.dtd");

    #[test]
    fn test_parse_bundled_dtd() {
        let grammar = parse_dtd(BUNDLED).unwrap();

        assert_eq!(
            grammar.element("job"),
            Some(&ContentModel::Elements(Particle::Sequence(vec![
                Particle::Element("job-detail".to_string()),
                Particle::Element("trigger".to_string()).occurs(0, None),
            ])))
        );
        assert_eq!(grammar.element("name"), Some(&ContentModel::Mixed(vec![])));

        let calendar_attrs = grammar.attributes("calendar");
        assert_eq!(calendar_attrs.len(), 2);
        assert_eq!(calendar_attrs[0].name, "class-name");
        assert_eq!(calendar_attrs[0].default, AttributeDefault::Required);
    }

    #[test]
    fn test_trigger_is_choice() {
        let grammar = parse_dtd(BUNDLED).unwrap();
        let Some(ContentModel::Elements(trigger)) = grammar.element("trigger") else {
            panic!("trigger should have element content");
        };
        assert_eq!(trigger.to_string(), "(simple | cron)");
        assert!(trigger.matches(&["cron"]));
    }

    #[test]
    fn test_simple_trigger_model() {
        let grammar = parse_dtd(BUNDLED).unwrap();
        let Some(ContentModel::Elements(simple)) = grammar.element("simple") else {
            panic!("simple should have element content");
        };
        assert!(simple.matches(&["name", "job-name", "start-time"]));
        assert!(simple.matches(&[
            "name",
            "group",
            "misfire-instruction",
            "job-name",
            "job-group",
            "start-time",
            "repeat-count",
            "repeat-interval"
        ]));
        assert!(!simple.matches(&["name", "job-name", "start-time", "repeat-count"]));
    }

    #[test]
    fn test_mixed_content_and_defaults() {
        let dtd = r#"
            <!-- comment with <!ELEMENT fake EMPTY> inside -->
            <!ELEMENT p (#PCDATA | b | i)*>
            <!ELEMENT br EMPTY>
            <!ATTLIST p
                align (left | right) "left"
                id ID #IMPLIED
                lang CDATA #FIXED 'en'>
            <!ENTITY copy "&#169; > 2000">
        "#;
        let grammar = parse_dtd(dtd).unwrap();

        assert!(grammar.element("fake").is_none());
        assert_eq!(
            grammar.element("p"),
            Some(&ContentModel::Mixed(vec!["b".to_string(), "i".to_string()]))
        );
        assert_eq!(grammar.element("br"), Some(&ContentModel::Empty));

        let attrs = grammar.attributes("p");
        assert_eq!(
            attrs[0].datatype,
            Datatype::Enumeration(vec!["left".to_string(), "right".to_string()])
        );
        assert_eq!(attrs[0].default, AttributeDefault::Value("left".to_string()));
        assert_eq!(attrs[2].default, AttributeDefault::Fixed("en".to_string()));
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_dtd("<!ELEMENT a EMPTY>\n<!ELEMENT b (x, y | z)>").unwrap_err();
        match err {
            GrammarError::Syntax { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("Cannot mix"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parameter_entities_unsupported() {
        let err = parse_dtd("%common;").unwrap_err();
        assert!(matches!(err, GrammarError::Unsupported(_)));
    }
}
