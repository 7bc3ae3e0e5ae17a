//! The scheduler collaborator.
//!
//! The loader never constructs a scheduler. Callers pass one in, either a
//! real backend or the [`MemoryScheduler`] used by the command line and tests.

mod memory;

use thiserror::Error;

use crate::model::{Calendar, CalendarBundle, JobDetail, JobKey, TriggerDefinition, TriggerKey};

pub use memory::{MemoryScheduler, SchedulerCall};

/// Failure reported by a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{kind} '{key}' already exists")]
    ObjectAlreadyExists { kind: &'static str, key: String },

    #[error("{kind} '{key}' does not exist")]
    NotFound { kind: &'static str, key: String },

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Operations the loader needs from a job scheduling service.
#[cfg_attr(test, mockall::automock)]
pub trait Scheduler {
    /// Look up a stored job.
    fn job_detail(&self, key: &JobKey) -> Result<Option<JobDetail>, SchedulerError>;

    /// Store a job, replacing an existing one when `replace` is set.
    fn add_job(&mut self, detail: &JobDetail, replace: bool) -> Result<(), SchedulerError>;

    /// Look up a stored trigger.
    fn trigger(&self, key: &TriggerKey) -> Result<Option<TriggerDefinition>, SchedulerError>;

    /// Replace the trigger stored under `key` with `trigger`.
    fn reschedule_job(
        &mut self,
        key: &TriggerKey,
        trigger: &TriggerDefinition,
    ) -> Result<(), SchedulerError>;

    /// Store a new trigger for the job it names.
    fn schedule_job(&mut self, trigger: &TriggerDefinition) -> Result<(), SchedulerError>;

    /// Store a calendar under `name`.
    fn add_calendar(
        &mut self,
        name: &str,
        calendar: &Calendar,
        replace: bool,
        update_triggers: bool,
    ) -> Result<(), SchedulerError>;
}

/// Receives calendars as soon as the mapping walk completes them.
pub trait CalendarSink {
    fn add_calendar(&mut self, bundle: CalendarBundle) -> Result<(), SchedulerError>;
}

/// Collects calendars for later inspection.
impl CalendarSink for Vec<CalendarBundle> {
    fn add_calendar(&mut self, bundle: CalendarBundle) -> Result<(), SchedulerError> {
        self.push(bundle);
        Ok(())
    }
}

/// Registers calendars with a scheduler, asking it to update the triggers
/// that reference them.
pub struct SchedulerCalendars<'a, S: Scheduler + ?Sized> {
    scheduler: &'a mut S,
}

impl<'a, S: Scheduler + ?Sized> SchedulerCalendars<'a, S> {
    pub fn new(scheduler: &'a mut S) -> Self {
        Self { scheduler }
    }
}

impl<S: Scheduler + ?Sized> CalendarSink for SchedulerCalendars<'_, S> {
    fn add_calendar(&mut self, bundle: CalendarBundle) -> Result<(), SchedulerError> {
        tracing::debug!(
            calendar = %bundle.calendar_name,
            replace = bundle.replace,
            "Adding calendar"
        );
        self.scheduler
            .add_calendar(&bundle.calendar_name, &bundle.calendar(), bundle.replace, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CalendarKind;
    use mockall::predicate::{always, eq};

    fn holidays() -> CalendarBundle {
        CalendarBundle {
            calendar_name: "holidays".to_string(),
            kind: CalendarKind::Holiday,
            replace: true,
            ..CalendarBundle::default()
        }
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<CalendarBundle> = Vec::new();
        sink.add_calendar(holidays()).unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_scheduler_sink_forwards_replace_and_updates_triggers() {
        let mut scheduler = MockScheduler::new();
        scheduler
            .expect_add_calendar()
            .with(eq("holidays"), always(), eq(true), eq(true))
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        SchedulerCalendars::new(&mut scheduler)
            .add_calendar(holidays())
            .unwrap();
    }
}
