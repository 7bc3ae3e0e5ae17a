//! Error types for the loader.
//!
//! Uses the dual-error pattern: `LoaderError` for library consumers with
//! detailed error context, and specific error types (`ConversionError`,
//! `GrammarError`, `SchedulerError`) for the components that raise them.

use thiserror::Error;

use crate::convert::ConversionError;
use crate::mapping::PropertyError;
use crate::scheduler::SchedulerError;
use crate::validation::ValidationErrors;

/// Main error type for the loader library.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// One or more validation problems were recorded during a parse call.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// The document could not be found as a resource or on the filesystem.
    #[error("Job scheduling document not found: {0}")]
    DocumentNotFound(String),

    /// Element text could not be converted to the property's type.
    #[error("Invalid value for '{property}' at <{path}>: {source}")]
    Conversion {
        path: String,
        property: String,
        #[source]
        source: ConversionError,
    },

    /// A property setter rejected its value.
    #[error("Failed to set '{property}' at <{path}>: {source}")]
    Property {
        path: String,
        property: String,
        #[source]
        source: PropertyError,
    },

    /// A body-text rule targeted a property the object does not have.
    #[error("No property '{property}' on {target} (at <{path}>)")]
    UnknownProperty {
        path: String,
        property: String,
        target: &'static str,
    },

    /// A method call rule fired without one of its parameters.
    #[error("Missing parameter {index} for '{method}' at <{path}>")]
    MissingParameter {
        path: String,
        method: &'static str,
        index: usize,
    },

    /// The construction stack did not hold the expected object.
    #[error("Cannot {action} at <{path}>: found {found}")]
    UnexpectedFrame {
        path: String,
        action: &'static str,
        found: &'static str,
    },

    /// A job without triggers that is not durable cannot be scheduled.
    #[error("A job defined without any triggers must be durable: {0}")]
    NonDurableJobWithoutTriggers(String),

    /// The scheduler rejected an operation.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote entity is larger than the loader accepts.
    #[error("Entity at {url} exceeds {limit} bytes")]
    EntityTooLarge { url: String, limit: usize },

    /// Retried HTTP request never succeeded.
    #[error("Request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error.
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl LoaderError {
    /// Whether this error describes the document's content rather than the
    /// environment or a collaborator.
    ///
    /// Document errors raised while validation problems are pending are
    /// folded into the problem list instead of replacing it.
    #[must_use]
    pub fn is_document_error(&self) -> bool {
        matches!(
            self,
            Self::Conversion { .. }
                | Self::Property { .. }
                | Self::UnknownProperty { .. }
                | Self::MissingParameter { .. }
                | Self::UnexpectedFrame { .. }
        )
    }
}

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;
