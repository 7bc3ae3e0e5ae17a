//! The job scheduling data loader.
//!
//! One loader parses documents into a [`BundleRegistry`] and reconciles the
//! registry against a [`Scheduler`]. Every parse call starts from an empty
//! registry and an empty problem list.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use roxmltree::Document;

use crate::config::{LoaderConfig, DEFAULT_FILE_NAME, SCHEMA_URL};
use crate::convert::Converters;
use crate::error::{LoaderError, Result};
use crate::mapping::{create_job_scheduling_rules, MappingContext, MappingEngine};
use crate::model::{BundleRegistry, JobBundle};
use crate::reconcile::{reconcile, schedule_bundle, BundleOutcome, ReconcileReport};
use crate::resolver::{EntityResolver, InputSource, Origin};
use crate::scheduler::{CalendarSink, Scheduler, SchedulerCalendars};
use crate::schema::{parse_dtd, parse_xsd, Grammar, GrammarError, GrammarKind, Validator};
use crate::validation::{Severity, ValidationProblem, ValidationProblems};
use crate::xml::{find_doctype, parse_document};

/// Loads job scheduling data documents and schedules their contents.
///
/// A loader is not meant to be shared between threads. Use one loader per
/// task or guard it with a lock.
#[derive(Debug)]
pub struct JobSchedulingDataLoader {
    config: LoaderConfig,
    resolver: EntityResolver,
    converters: Converters,
    engine: MappingEngine,
    schema: Option<Grammar>,
    bundles: BundleRegistry,
    problems: ValidationProblems,
    overwrite_existing_jobs: bool,
}

impl JobSchedulingDataLoader {
    #[must_use]
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            resolver: EntityResolver::from_config(&config),
            converters: Converters::for_zone(config.time_zone),
            engine: MappingEngine::new(create_job_scheduling_rules()),
            schema: None,
            bundles: BundleRegistry::new(),
            problems: ValidationProblems::new(),
            overwrite_existing_jobs: config.overwrite_existing_jobs,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Whether existing jobs are replaced when scheduling.
    ///
    /// Starts from the configuration and is updated by a document's
    /// `overwrite-existing-jobs` attribute.
    #[must_use]
    pub fn overwrite_existing_jobs(&self) -> bool {
        self.overwrite_existing_jobs
    }

    pub fn set_overwrite_existing_jobs(&mut self, overwrite: bool) {
        self.overwrite_existing_jobs = overwrite;
    }

    /// Bundles parsed by the last call.
    #[must_use]
    pub fn bundles(&self) -> &BundleRegistry {
        &self.bundles
    }

    /// Bundle of the job with the given full name (`group.name`).
    #[must_use]
    pub fn bundle(&self, full_name: &str) -> Option<&JobBundle> {
        self.bundles.get(full_name)
    }

    /// Problems recorded by the last call.
    #[must_use]
    pub fn problems(&self) -> &[ValidationProblem] {
        self.problems.as_slice()
    }

    /// Process [`DEFAULT_FILE_NAME`].
    pub fn process_default_file(&mut self, calendars: &mut dyn CalendarSink) -> Result<()> {
        self.process_file(DEFAULT_FILE_NAME, calendars)
    }

    /// Process a document found as a resource or on the filesystem.
    ///
    /// # Errors
    /// Returns [`LoaderError::DocumentNotFound`] when neither exists, and
    /// any error [`process_str`](Self::process_str) returns.
    pub fn process_file(&mut self, name: &str, calendars: &mut dyn CalendarSink) -> Result<()> {
        let source = self.open_document(name)?;
        tracing::debug!(name, origin = %source.origin, "Opened job scheduling data");
        let text = source.into_string()?;
        self.process_str(&text, Some(name), calendars)
    }

    /// Process a document read from `reader`.
    pub fn process_reader(
        &mut self,
        mut reader: impl Read,
        system_id: Option<&str>,
        calendars: &mut dyn CalendarSink,
    ) -> Result<()> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        self.process_str(&text, system_id, calendars)
    }

    /// Parse, optionally validate, and map a document.
    ///
    /// Completed top-level calendars are handed to `calendars` during the
    /// walk. Jobs end up in [`bundles`](Self::bundles).
    ///
    /// # Errors
    /// Returns [`LoaderError::Validation`] carrying every recorded problem
    /// when there are any. Mapping errors are returned as they are, unless
    /// problems were already recorded, in which case they are added to the
    /// problem list.
    pub fn process_str(
        &mut self,
        text: &str,
        system_id: Option<&str>,
        calendars: &mut dyn CalendarSink,
    ) -> Result<()> {
        self.bundles.clear();
        self.problems.reset(system_id);
        tracing::info!(system_id, validate = self.config.validate, "Parsing job scheduling data");

        let result = self.parse(text, calendars);
        let result = match result {
            Err(err) if err.is_document_error() && !self.problems.is_empty() => {
                self.problems.fatal(err.to_string(), None);
                Ok(())
            }
            other => other,
        };
        result?;

        if let Some(errors) = self.problems.to_error() {
            tracing::warn!(
                system_id,
                problems = errors.problems().len(),
                "Job scheduling data has validation problems"
            );
            return Err(errors.into());
        }

        tracing::info!(system_id, jobs = self.bundles.len(), "Parsed job scheduling data");
        Ok(())
    }

    /// Schedule every parsed bundle.
    pub fn schedule_jobs<S: Scheduler + ?Sized>(&self, scheduler: &mut S) -> Result<ReconcileReport> {
        reconcile(&self.bundles, scheduler, self.overwrite_existing_jobs)
    }

    /// Schedule one bundle with the loader's overwrite policy.
    pub fn schedule_job<S: Scheduler + ?Sized>(
        &self,
        bundle: &JobBundle,
        scheduler: &mut S,
    ) -> Result<BundleOutcome> {
        schedule_bundle(bundle, scheduler, self.overwrite_existing_jobs)
    }

    /// Process a document, registering its calendars with `scheduler`, then
    /// schedule its jobs.
    pub fn process_file_and_schedule_jobs<S: Scheduler + ?Sized>(
        &mut self,
        name: &str,
        scheduler: &mut S,
    ) -> Result<ReconcileReport> {
        self.process_file(name, &mut SchedulerCalendars::new(scheduler))?;
        self.schedule_jobs(scheduler)
    }

    fn open_document(&self, name: &str) -> Result<InputSource> {
        if let Some(source) = self.resolver.locator().locate(name) {
            return Ok(source);
        }

        let path = Path::new(name);
        if path.is_file() {
            let file = File::open(path)?;
            return Ok(InputSource::new(Origin::File(path.to_path_buf()), Box::new(file)));
        }

        Err(LoaderError::DocumentNotFound(name.to_string()))
    }

    fn parse(&mut self, text: &str, calendars: &mut dyn CalendarSink) -> Result<()> {
        let doc = match parse_document(text) {
            Ok(doc) => doc,
            Err(err) => {
                let pos = err.pos();
                self.problems.fatal(
                    format!("Document is not well-formed: {err}"),
                    Some((pos.row, pos.col)),
                );
                return Ok(());
            }
        };

        if self.config.validate {
            self.validate(text, &doc);
        }

        let settings = self.engine.run(
            &doc,
            &mut MappingContext {
                converters: &self.converters,
                problems: &mut self.problems,
                registry: &mut self.bundles,
                calendars,
            },
        )?;

        if let Some(overwrite) = settings.overwrite_existing_jobs {
            self.overwrite_existing_jobs = overwrite;
        }
        Ok(())
    }

    fn validate(&mut self, text: &str, doc: &Document<'_>) {
        let dtd;
        let grammar = if self.config.validate_schema {
            if self.schema.is_none() {
                self.schema = load_schema(&self.resolver, &mut self.problems);
            }
            self.schema.as_ref()
        } else {
            dtd = load_dtd(&self.resolver, text, &mut self.problems);
            dtd.as_ref()
        };

        if let Some(grammar) = grammar {
            Validator::new(grammar).validate(doc, &mut self.problems);
        }
    }
}

fn load_schema(resolver: &EntityResolver, problems: &mut ValidationProblems) -> Option<Grammar> {
    let Some(source) = resolver.locate_schema() else {
        problems.fatal(format!("Cannot locate XML Schema {SCHEMA_URL}"), None);
        return None;
    };
    read_grammar(source, problems, parse_xsd)
}

fn load_dtd(
    resolver: &EntityResolver,
    text: &str,
    problems: &mut ValidationProblems,
) -> Option<Grammar> {
    let Some(doctype) = find_doctype(text) else {
        problems.error("Document is invalid: no grammar found", None);
        return None;
    };

    // The internal subset is read first so its declarations take precedence
    let mut grammar = Grammar::new(GrammarKind::Dtd);
    if let Some(subset) = &doctype.internal_subset {
        match parse_dtd(subset) {
            Ok(internal) => grammar.merge(internal),
            Err(err) => {
                grammar_problem(problems, "internal subset", &err);
                return None;
            }
        }
    }

    if doctype.has_external_subset() {
        let public_id = doctype.public_id.as_deref();
        let system_id = doctype.system_id.as_deref();
        let Some(source) = resolver.resolve(public_id, system_id) else {
            problems.fatal(
                format!(
                    "Cannot resolve external DTD subset {}",
                    system_id.or(public_id).unwrap_or_default()
                ),
                None,
            );
            return None;
        };
        grammar.merge(read_grammar(source, problems, parse_dtd)?);
    }

    grammar.root = Some(doctype.name);
    Some(grammar)
}

fn read_grammar(
    source: InputSource,
    problems: &mut ValidationProblems,
    parse: fn(&str) -> std::result::Result<Grammar, GrammarError>,
) -> Option<Grammar> {
    let origin = source.origin.to_string();
    let text = match source.into_string() {
        Ok(text) => text,
        Err(err) => {
            problems.fatal(format!("Failed to read grammar {origin}: {err}"), None);
            return None;
        }
    };

    match parse(&text) {
        Ok(grammar) => {
            tracing::debug!(origin = %origin, elements = grammar.element_count(), "Loaded grammar");
            Some(grammar)
        }
        Err(err) => {
            grammar_problem(problems, &origin, &err);
            None
        }
    }
}

fn grammar_problem(problems: &mut ValidationProblems, origin: &str, err: &GrammarError) {
    let problem = ValidationProblem::new(Severity::Fatal, format!("Invalid grammar: {err}"))
        .in_document(Some(origin));
    problems.push(match err.position() {
        Some((line, column)) => problem.at(line, column),
        None => problem,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CalendarBundle, CalendarKind, Key, TriggerSchedule};
    use crate::scheduler::MemoryScheduler;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<job-scheduling-data xmlns="http://jobsched.dev/ns/job-scheduling-data" version="1.1">
  <calendar class-name="weekly" replace="true">
    <name>weekdays</name>
    <base-calendar class-name="holiday">
      <name>holidays</name>
    </base-calendar>
  </calendar>
  <job>
    <job-detail>
      <name>cleanup</name>
      <group>maintenance</group>
      <job-class>com.example.CleanupJob</job-class>
      <job-data-map allows-transient-data="true">
        <entry><key>path</key><value>/tmp</value></entry>
      </job-data-map>
    </job-detail>
    <trigger>
      <simple>
        <name>every-minute</name>
        <misfire-instruction>MISFIRE_INSTRUCTION_FIRE_NOW</misfire-instruction>
        <calendar-name>weekdays</calendar-name>
        <job-name>cleanup</job-name>
        <job-group>maintenance</job-group>
        <start-time>2024-01-02T03:04:05</start-time>
        <repeat-count>-1</repeat-count>
        <repeat-interval>60000</repeat-interval>
      </simple>
    </trigger>
  </job>
</job-scheduling-data>"#;

    fn loader(validate: bool) -> JobSchedulingDataLoader {
        JobSchedulingDataLoader::new(LoaderConfig::default().with_validation(validate, true))
    }

    #[test]
    fn test_process_str_builds_registry_and_calendars() {
        let mut loader = loader(true);
        let mut calendars: Vec<CalendarBundle> = Vec::new();
        loader.process_str(DOCUMENT, None, &mut calendars).unwrap();

        assert_eq!(loader.bundles().len(), 1);
        let bundle = loader.bundle("maintenance.cleanup").unwrap();
        let detail = bundle.job_detail.as_ref().unwrap();
        assert_eq!(detail.job_data_map.get("path"), Some("/tmp"));
        assert!(detail.job_data_map.allows_transient_data);

        let trigger = &bundle.triggers[0];
        assert_eq!(trigger.misfire_instruction, 1);
        assert_eq!(
            trigger.schedule,
            TriggerSchedule::Simple {
                repeat_count: -1,
                repeat_interval: 60000
            }
        );

        assert_eq!(calendars.len(), 1);
        assert_eq!(calendars[0].kind, CalendarKind::Weekly);
        assert!(calendars[0].replace);
        assert_eq!(
            calendars[0].base.as_ref().map(|b| b.calendar_name.as_str()),
            Some("holidays")
        );
    }

    #[test]
    fn test_reparse_clears_previous_state() {
        let mut loader = loader(false);
        let mut calendars: Vec<CalendarBundle> = Vec::new();
        loader.process_str(DOCUMENT, None, &mut calendars).unwrap();
        loader.process_str(DOCUMENT, None, &mut calendars).unwrap();
        assert_eq!(loader.bundles().len(), 1);

        loader
            .process_str("<job-scheduling-data/>", None, &mut calendars)
            .unwrap();
        assert!(loader.bundles().is_empty());
    }

    #[test]
    fn test_job_without_detail_is_skipped() {
        let document = r#"<job-scheduling-data>
  <job>
    <trigger>
      <cron>
        <name>orphaned</name>
        <job-name>missing</job-name>
        <cron-expression>0 0 * * * ?</cron-expression>
      </cron>
    </trigger>
  </job>
  <job>
    <job-detail>
      <name>ok</name>
      <job-class>com.example.OkJob</job-class>
      <durability>true</durability>
    </job-detail>
  </job>
</job-scheduling-data>"#;

        let mut loader = loader(false);
        loader
            .process_str(document, None, &mut Vec::<CalendarBundle>::new())
            .unwrap();
        assert_eq!(loader.bundles().names().collect::<Vec<_>>(), vec!["DEFAULT.ok"]);
        assert!(loader.problems().is_empty());
    }

    #[test]
    fn test_not_well_formed_is_fatal_problem() {
        let mut loader = loader(true);
        let err = loader
            .process_str("<job-scheduling-data>\n<job>", Some("broken.xml"), &mut Vec::<CalendarBundle>::new())
            .unwrap_err();

        let LoaderError::Validation(errors) = err else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.max_severity(), Some(Severity::Fatal));
        assert_eq!(errors.problems()[0].system_id.as_deref(), Some("broken.xml"));
        assert!(errors.problems()[0].line.is_some());
    }

    #[test]
    fn test_schema_problems_are_all_reported() {
        let document = DOCUMENT
            .replace("<job-class>com.example.CleanupJob</job-class>", "")
            .replace("MISFIRE_INSTRUCTION_FIRE_NOW", "MISFIRE_INSTRUCTION_SOMETIMES");

        let mut loader = loader(true);
        let err = loader.process_str(&document, None, &mut Vec::<CalendarBundle>::new()).unwrap_err();
        let LoaderError::Validation(errors) = err else {
            panic!("expected validation errors");
        };

        // Content model, datatype, and misfire resolution problems
        assert!(errors.problems().len() >= 3, "{errors}");
        assert_eq!(loader.problems().len(), errors.problems().len());
    }

    #[test]
    fn test_document_error_is_folded_into_pending_problems() {
        let document = DOCUMENT
            .replace("<repeat-count>-1</repeat-count>", "<repeat-count>many</repeat-count>");

        let mut loader = loader(true);
        let err = loader.process_str(&document, None, &mut Vec::<CalendarBundle>::new()).unwrap_err();
        let LoaderError::Validation(errors) = err else {
            panic!("expected validation errors");
        };
        let last = errors.problems().last().unwrap();
        assert_eq!(last.severity, Severity::Fatal);
        assert!(last.message.contains("repeat_count"), "{last}");
    }

    #[test]
    fn test_document_error_without_problems_is_returned() {
        let document = DOCUMENT
            .replace("<repeat-count>-1</repeat-count>", "<repeat-count>many</repeat-count>");

        let mut loader = loader(false);
        let err = loader.process_str(&document, None, &mut Vec::<CalendarBundle>::new()).unwrap_err();
        assert!(matches!(err, LoaderError::Conversion { .. }));
    }

    #[test]
    fn test_dtd_mode_without_doctype() {
        let mut loader = JobSchedulingDataLoader::new(
            LoaderConfig::default().with_validation(true, false),
        );
        let err = loader
            .process_str("<job-scheduling-data/>", None, &mut Vec::<CalendarBundle>::new())
            .unwrap_err();
        let LoaderError::Validation(errors) = err else {
            panic!("expected validation errors");
        };
        assert_eq!(
            errors.problems()[0].message,
            "Document is invalid: no grammar found"
        );
        assert_eq!(errors.problems()[0].severity, Severity::Error);
    }

    #[test]
    fn test_dtd_mode_with_bundled_public_id() {
        let document = r#"<?xml version="1.0"?>
<!DOCTYPE job-scheduling-data PUBLIC "-//Jobsched//DTD Job Scheduling Data 1.0//EN"
  "http://jobsched.dev/dtd/job_scheduling_data_1_0.dtd">
<job-scheduling-data overwrite-existing-jobs="false">
  <job>
    <job-detail>
      <name>report</name>
      <job-class>com.example.ReportJob</job-class>
      <durability>true</durability>
    </job-detail>
  </job>
</job-scheduling-data>"#;

        let mut loader = JobSchedulingDataLoader::new(
            LoaderConfig::default().with_validation(true, false),
        );
        loader.process_str(document, None, &mut Vec::<CalendarBundle>::new()).unwrap();
        assert!(!loader.overwrite_existing_jobs());
        assert!(loader.bundle("DEFAULT.report").unwrap().is_durable());
    }

    #[test]
    fn test_absent_attribute_ignores_dtd_default() {
        // The DTD declares overwrite-existing-jobs "true"; it is not applied.
        let document = r#"<?xml version="1.0"?>
<!DOCTYPE job-scheduling-data PUBLIC "-//Jobsched//DTD Job Scheduling Data 1.0//EN"
  "http://jobsched.dev/dtd/job_scheduling_data_1_0.dtd">
<job-scheduling-data>
  <job>
    <job-detail>
      <name>report</name>
      <job-class>com.example.ReportJob</job-class>
      <durability>true</durability>
    </job-detail>
  </job>
</job-scheduling-data>"#;

        let mut loader = JobSchedulingDataLoader::new(
            LoaderConfig::default()
                .with_validation(true, false)
                .with_overwrite_existing_jobs(false),
        );
        loader.process_str(document, None, &mut Vec::<CalendarBundle>::new()).unwrap();
        assert!(!loader.overwrite_existing_jobs());
    }

    #[test]
    fn test_unresolvable_external_subset_is_fatal() {
        let document = r#"<!DOCTYPE job-scheduling-data SYSTEM "missing.dtd"><job-scheduling-data/>"#;
        let mut loader = JobSchedulingDataLoader::new(
            LoaderConfig::default().with_validation(true, false),
        );
        let err = loader.process_str(document, None, &mut Vec::<CalendarBundle>::new()).unwrap_err();
        let LoaderError::Validation(errors) = err else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.max_severity(), Some(Severity::Fatal));
    }

    #[test]
    fn test_internal_subset_only() {
        let document = r#"<!DOCTYPE job-scheduling-data [
  <!ELEMENT job-scheduling-data EMPTY>
]>
<job-scheduling-data><job/></job-scheduling-data>"#;
        let mut loader = JobSchedulingDataLoader::new(
            LoaderConfig::default().with_validation(true, false),
        );
        let err = loader.process_str(document, None, &mut Vec::<CalendarBundle>::new()).unwrap_err();
        let LoaderError::Validation(errors) = err else {
            panic!("expected validation errors");
        };
        assert!(errors
            .problems()
            .iter()
            .any(|p| p.message == "Element 'job-scheduling-data' must have no content"));
    }

    #[test]
    fn test_missing_document() {
        let mut loader = loader(false);
        let err = loader
            .process_file("does-not-exist.xml", &mut Vec::<CalendarBundle>::new())
            .unwrap_err();
        assert!(matches!(err, LoaderError::DocumentNotFound(name) if name == "does-not-exist.xml"));
    }

    #[test]
    fn test_process_and_schedule_into_memory_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("jobs.xml"), DOCUMENT).unwrap();
        let mut loader = JobSchedulingDataLoader::new(
            LoaderConfig::default().with_resource_root(dir.path()),
        );

        let mut scheduler = MemoryScheduler::new();
        let report = loader
            .process_file_and_schedule_jobs("jobs.xml", &mut scheduler)
            .unwrap();

        assert_eq!(report.scheduled, vec![Key::new("cleanup", "maintenance")]);
        assert_eq!(scheduler.calendars().len(), 1);
        assert!(scheduler.calendars().contains_key("weekdays"));
        assert_eq!(scheduler.triggers().len(), 1);
    }
}
