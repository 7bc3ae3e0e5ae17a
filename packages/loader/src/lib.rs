//! Jobsched Loader - Load declarative job scheduling data.
//!
//! This crate reads job, trigger and calendar definitions from XML
//! documents and reconciles them against a job scheduling service, adding,
//! replacing or skipping entries according to an overwrite policy.
//!
//! # Example
//!
//! ```
//! use jobsched_loader::{CalendarBundle, JobSchedulingDataLoader, LoaderConfig, MemoryScheduler};
//!
//! let xml = r#"<job-scheduling-data>
//!   <job>
//!     <job-detail>
//!       <name>cleanup</name>
//!       <job-class>com.example.CleanupJob</job-class>
//!       <durability>true</durability>
//!     </job-detail>
//!   </job>
//! </job-scheduling-data>"#;
//!
//! let mut loader = JobSchedulingDataLoader::new(LoaderConfig::default().with_validation(false, false));
//! let mut scheduler = MemoryScheduler::new();
//! loader.process_str(xml, None, &mut Vec::<CalendarBundle>::new()).unwrap();
//! let report = loader.schedule_jobs(&mut scheduler).unwrap();
//! assert_eq!(report.scheduled.len(), 1);
//! ```
//!
//! # Architecture
//!
//! The loader is organized into several modules:
//!
//! - [`config`]: Identifiers, constants and loader settings
//! - [`model`]: Jobs, triggers, calendars and the bundle registry
//! - [`error`]: Error types and Result alias
//! - [`convert`]: Typed conversion of element text
//! - [`resolver`]: Entity resolution for DTDs and schemas
//! - [`http`]: HTTP client for remote entities
//! - [`xml`]: XML utilities
//! - [`schema`]: Grammar model, DTD and XSD readers, and the validator
//! - [`validation`]: Aggregation of validation problems
//! - [`mapping`]: Rule-driven mapping of documents onto the model
//! - [`reconcile`]: Reconciliation against a scheduler
//! - [`scheduler`]: The scheduler collaborator and an in-memory scheduler
//! - [`loader`]: The loader tying all components together
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod http;
pub mod loader;
pub mod mapping;
pub mod model;
pub mod reconcile;
pub mod resolver;
pub mod scheduler;
pub mod schema;
pub mod validation;
pub mod xml;

// Re-export the main entry points
pub use loader::JobSchedulingDataLoader;
pub use reconcile::{reconcile, ReconcileReport};

// Re-export commonly used items
pub use config::LoaderConfig;
pub use error::{LoaderError, Result};
pub use model::{
    BundleRegistry, Calendar, CalendarBundle, JobBundle, JobDetail, JobKey, TriggerDefinition,
    TriggerKey, TriggerKind,
};
pub use scheduler::{CalendarSink, MemoryScheduler, Scheduler, SchedulerError};
pub use validation::{Severity, ValidationErrors, ValidationProblem};
