//! In-memory scheduler.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{Scheduler, SchedulerError};
use crate::model::{Calendar, JobDetail, JobKey, Key, TriggerDefinition, TriggerKey};

/// A mutating call made against a [`MemoryScheduler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum SchedulerCall {
    AddJob { job: JobKey, replace: bool },
    RescheduleJob { trigger: TriggerKey },
    ScheduleJob { trigger: TriggerKey },
    AddCalendar { name: String, replace: bool },
}

/// Scheduler that keeps jobs, triggers and calendars in maps.
///
/// Nothing ever fires. Every mutating call is recorded in [`history`](Self::history).
#[derive(Debug, Clone, Default)]
pub struct MemoryScheduler {
    jobs: BTreeMap<JobKey, JobDetail>,
    triggers: BTreeMap<TriggerKey, TriggerDefinition>,
    calendars: BTreeMap<String, Calendar>,
    history: Vec<SchedulerCall>,
}

impl MemoryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn jobs(&self) -> &BTreeMap<JobKey, JobDetail> {
        &self.jobs
    }

    #[must_use]
    pub fn triggers(&self) -> &BTreeMap<TriggerKey, TriggerDefinition> {
        &self.triggers
    }

    #[must_use]
    pub fn calendars(&self) -> &BTreeMap<String, Calendar> {
        &self.calendars
    }

    /// Triggers pointing at `job`.
    pub fn triggers_of_job<'a>(
        &'a self,
        job: &'a JobKey,
    ) -> impl Iterator<Item = &'a TriggerDefinition> + 'a {
        self.triggers
            .values()
            .filter(move |trigger| owner(trigger).as_ref() == Some(job))
    }

    #[must_use]
    pub fn history(&self) -> &[SchedulerCall] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

fn owner(trigger: &TriggerDefinition) -> Option<JobKey> {
    trigger
        .job_name
        .as_ref()
        .map(|name| Key::new(name.clone(), trigger.job_group.clone().unwrap_or_default()))
}

impl Scheduler for MemoryScheduler {
    fn job_detail(&self, key: &JobKey) -> Result<Option<JobDetail>, SchedulerError> {
        Ok(self.jobs.get(key).cloned())
    }

    fn add_job(&mut self, detail: &JobDetail, replace: bool) -> Result<(), SchedulerError> {
        self.history.push(SchedulerCall::AddJob {
            job: detail.key.clone(),
            replace,
        });

        if !detail.durable && !replace {
            return Err(SchedulerError::Rejected(
                "Jobs added with no trigger must be durable".to_string(),
            ));
        }
        if !replace && self.jobs.contains_key(&detail.key) {
            return Err(SchedulerError::ObjectAlreadyExists {
                kind: "job",
                key: detail.key.full_name(),
            });
        }
        self.jobs.insert(detail.key.clone(), detail.clone());
        Ok(())
    }

    fn trigger(&self, key: &TriggerKey) -> Result<Option<TriggerDefinition>, SchedulerError> {
        Ok(self.triggers.get(key).cloned())
    }

    fn reschedule_job(
        &mut self,
        key: &TriggerKey,
        trigger: &TriggerDefinition,
    ) -> Result<(), SchedulerError> {
        self.history.push(SchedulerCall::RescheduleJob {
            trigger: key.clone(),
        });

        let Some(existing) = self.triggers.remove(key) else {
            return Err(SchedulerError::NotFound {
                kind: "trigger",
                key: key.full_name(),
            });
        };

        // The replacement keeps the job of the trigger it replaces
        let mut replacement = trigger.clone();
        replacement.job_name = existing.job_name;
        replacement.job_group = existing.job_group;
        self.triggers.insert(replacement.key.clone(), replacement);
        Ok(())
    }

    fn schedule_job(&mut self, trigger: &TriggerDefinition) -> Result<(), SchedulerError> {
        self.history.push(SchedulerCall::ScheduleJob {
            trigger: trigger.key.clone(),
        });

        let job = owner(trigger).ok_or_else(|| {
            SchedulerError::Rejected(format!("Trigger '{}' does not name a job", trigger.key))
        })?;
        if !self.jobs.contains_key(&job) {
            return Err(SchedulerError::NotFound {
                kind: "job",
                key: job.full_name(),
            });
        }
        if let Some(calendar) = &trigger.calendar_name {
            if !self.calendars.contains_key(calendar) {
                return Err(SchedulerError::NotFound {
                    kind: "calendar",
                    key: calendar.clone(),
                });
            }
        }
        if self.triggers.contains_key(&trigger.key) {
            return Err(SchedulerError::ObjectAlreadyExists {
                kind: "trigger",
                key: trigger.key.full_name(),
            });
        }

        self.triggers.insert(trigger.key.clone(), trigger.clone());
        Ok(())
    }

    fn add_calendar(
        &mut self,
        name: &str,
        calendar: &Calendar,
        replace: bool,
        _update_triggers: bool,
    ) -> Result<(), SchedulerError> {
        self.history.push(SchedulerCall::AddCalendar {
            name: name.to_string(),
            replace,
        });

        if !replace && self.calendars.contains_key(name) {
            return Err(SchedulerError::ObjectAlreadyExists {
                kind: "calendar",
                key: name.to_string(),
            });
        }
        self.calendars.insert(name.to_string(), calendar.clone());
        Ok(())
    }
}
