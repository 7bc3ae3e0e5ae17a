//! Configuration constants and loader settings.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::{LoaderError, Result};

/// Public identifier of the bundled job scheduling data DTD.
pub const PUBLIC_ID: &str = "-//Jobsched//DTD Job Scheduling Data 1.0//EN";

/// Published system identifier of the DTD.
pub const SYSTEM_ID: &str = "http://jobsched.dev/dtd/job_scheduling_data_1_0.dtd";

/// Resource name of the bundled DTD.
pub const DTD_RESOURCE: &str = "job_scheduling_data_1_0.dtd";

/// Target namespace of the XML Schema.
pub const NAMESPACE: &str = "http://jobsched.dev/ns/job-scheduling-data";

/// Published location of the XML Schema.
pub const SCHEMA_URL: &str =
    "http://jobsched.dev/ns/job-scheduling-data/job_scheduling_data_1_1.xsd";

/// Resource name of the bundled XML Schema.
pub const XSD_RESOURCE: &str = "job_scheduling_data_1_1.xsd";

/// System id prefix marking a local resource name.
pub const RESOURCE_PREFIX: &str = "resource:";

/// Document name used when no explicit source is given.
pub const DEFAULT_FILE_NAME: &str = "job_scheduling_data.xml";

/// Group assigned to jobs and triggers that do not declare one.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// XML Schema dateTime format (without offset).
pub const SCHEMA_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Legacy 12-hour date format accepted by the 1.0 DTD.
pub const LEGACY_DATE_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";

/// HTTP timeout in seconds for fetching remote DTDs and schemas.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Settings for a [`JobSchedulingDataLoader`](crate::JobSchedulingDataLoader).
///
/// These are the only values that survive across parse calls.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Validate the document against its grammar.
    pub validate: bool,
    /// Use the XML Schema as grammar instead of the document's DOCTYPE.
    pub validate_schema: bool,
    /// Replace jobs that already exist in the scheduler.
    pub overwrite_existing_jobs: bool,
    /// Directories searched for local resources, in order.
    pub resource_roots: Vec<PathBuf>,
    /// Serve the bundled DTD and schema as local resources.
    pub bundled_resources: bool,
    /// Zone used to interpret document timestamps.
    pub time_zone: Tz,
    /// Timeout for remote entity requests.
    pub http_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            validate: true,
            validate_schema: true,
            overwrite_existing_jobs: true,
            resource_roots: Vec::new(),
            bundled_resources: true,
            time_zone: Tz::UTC,
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }
}

impl LoaderConfig {
    /// Build a configuration from `JOBSCHED_*` environment variables,
    /// falling back to defaults for unset values.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let validate = env_flag("JOBSCHED_VALIDATE").unwrap_or(defaults.validate);
        let validate_schema =
            env_flag("JOBSCHED_VALIDATE_SCHEMA").unwrap_or(defaults.validate_schema);
        let overwrite_existing_jobs = env_flag("JOBSCHED_OVERWRITE_EXISTING_JOBS")
            .unwrap_or(defaults.overwrite_existing_jobs);

        let resource_roots = std::env::var_os("JOBSCHED_RESOURCE_PATH")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();

        let time_zone = match std::env::var("JOBSCHED_TIME_ZONE") {
            Ok(name) => parse_time_zone(&name)?,
            Err(_) => defaults.time_zone,
        };

        let http_timeout = match std::env::var("JOBSCHED_HTTP_TIMEOUT_SECS") {
            Ok(value) => parse_timeout(&value)?,
            Err(_) => defaults.http_timeout,
        };

        Ok(Self {
            validate,
            validate_schema,
            overwrite_existing_jobs,
            resource_roots,
            bundled_resources: defaults.bundled_resources,
            time_zone,
            http_timeout,
        })
    }

    #[must_use]
    pub fn with_validation(mut self, validate: bool, validate_schema: bool) -> Self {
        self.validate = validate;
        self.validate_schema = validate_schema;
        self
    }

    #[must_use]
    pub fn with_overwrite_existing_jobs(mut self, overwrite: bool) -> Self {
        self.overwrite_existing_jobs = overwrite;
        self
    }

    #[must_use]
    pub fn with_resource_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resource_roots.push(root.into());
        self
    }

    #[must_use]
    pub fn with_bundled_resources(mut self, bundled: bool) -> Self {
        self.bundled_resources = bundled;
        self
    }

    #[must_use]
    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }
}

fn parse_time_zone(name: &str) -> Result<Tz> {
    name.trim().parse::<Tz>().map_err(|_| {
        LoaderError::Config(format!("JOBSCHED_TIME_ZONE is not a known time zone: {name}"))
    })
}

fn parse_timeout(value: &str) -> Result<Duration> {
    value
        .trim()
        .parse()
        .map(Duration::from_secs)
        .map_err(|_| {
            LoaderError::Config(format!(
                "JOBSCHED_HTTP_TIMEOUT_SECS is not a number of seconds: {value}"
            ))
        })
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v != "false" && v != "0")
}
