//! Rule-driven mapping of documents onto jobs, triggers and calendars.
//!
//! Rules are registered per element path in a [`RuleRegistry`]. The
//! [`MappingEngine`] walks the document, fires the rules bound to each
//! element and builds objects on an explicit construction stack of
//! [`Frame`]s, each with its own table of settable properties.

mod config;
mod core;
mod engine;
mod rules;
mod stack;

pub use config::create_job_scheduling_rules;
pub use core::RuleRegistry;
pub use engine::{MappingContext, MappingEngine};
pub use rules::{AttachTarget, Method, Rule};
pub use stack::{DocumentSettings, Frame, FrameKind, PropertyError};
