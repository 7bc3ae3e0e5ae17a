//! Grammar-based validation.
//!
//! A [`Grammar`] is read either from DTD declarations ([`parse_dtd`]) or from
//! an XML Schema ([`parse_xsd`]), and a [`Validator`] checks a parsed
//! document tree against it.

mod dtd;
mod grammar;
mod validator;
mod xsd;

use thiserror::Error;

pub use dtd::parse_dtd;
pub use grammar::{
    AttributeDecl, AttributeDefault, ContentModel, Datatype, Grammar, GrammarKind, Particle,
};
pub use validator::Validator;
pub use xsd::parse_xsd;

/// Failure to read a grammar.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("{message} at {line}:{column}")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("Schema is not well-formed: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Unsupported grammar construct: {0}")]
    Unsupported(String),

    #[error("Unknown type '{0}'")]
    UnknownType(String),
}

impl GrammarError {
    /// Position of the error within the grammar text, when known.
    #[must_use]
    pub fn position(&self) -> Option<(u32, u32)> {
        match self {
            Self::Syntax { line, column, .. } => Some((*line, *column)),
            Self::Xml(err) => {
                let pos = err.pos();
                Some((pos.row, pos.col))
            }
            Self::Unsupported(_) | Self::UnknownType(_) => None,
        }
    }
}
