//! Core data types for job scheduling data.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::DEFAULT_GROUP;

/// Identity of a job or trigger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Key {
    pub name: String,
    pub group: String,
}

/// Identity of a job.
pub type JobKey = Key;

/// Identity of a trigger.
pub type TriggerKey = Key;

impl Key {
    /// Create a key, using the default group when `group` is empty.
    #[must_use]
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        let group = group.into();
        Self {
            name: name.into(),
            group: if group.is_empty() {
                DEFAULT_GROUP.to_string()
            } else {
                group
            },
        }
    }

    /// Create a key in the default group.
    #[must_use]
    pub fn in_default_group(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }

    /// `group.name`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.group, self.name)
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::in_default_group("")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// String entries handed to a job when it executes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobDataMap {
    pub entries: BTreeMap<String, String>,
    pub allows_transient_data: bool,
}

impl JobDataMap {
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Definition of a job as stored by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobDetail {
    pub key: JobKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Reference to the job implementation, resolved by the scheduler.
    pub job_class: String,
    pub volatile: bool,
    pub durable: bool,
    pub requests_recovery: bool,
    #[serde(skip_serializing_if = "JobDataMap::is_empty")]
    pub job_data_map: JobDataMap,
}

/// The two trigger variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Simple,
    Cron,
}

/// Misfire policy shared by every trigger kind.
pub const MISFIRE_INSTRUCTION_SMART_POLICY: i32 = 0;

const SIMPLE_MISFIRE_INSTRUCTIONS: &[(&str, i32)] = &[
    ("MISFIRE_INSTRUCTION_SMART_POLICY", MISFIRE_INSTRUCTION_SMART_POLICY),
    ("MISFIRE_INSTRUCTION_FIRE_NOW", 1),
    ("MISFIRE_INSTRUCTION_RESCHEDULE_NOW_WITH_EXISTING_REPEAT_COUNT", 2),
    ("MISFIRE_INSTRUCTION_RESCHEDULE_NOW_WITH_REMAINING_REPEAT_COUNT", 3),
    ("MISFIRE_INSTRUCTION_RESCHEDULE_NEXT_WITH_REMAINING_COUNT", 4),
    ("MISFIRE_INSTRUCTION_RESCHEDULE_NEXT_WITH_EXISTING_COUNT", 5),
];

const CRON_MISFIRE_INSTRUCTIONS: &[(&str, i32)] = &[
    ("MISFIRE_INSTRUCTION_SMART_POLICY", MISFIRE_INSTRUCTION_SMART_POLICY),
    ("MISFIRE_INSTRUCTION_FIRE_ONCE_NOW", 1),
    ("MISFIRE_INSTRUCTION_DO_NOTHING", 2),
];

impl TriggerKind {
    /// Named misfire instructions understood by this kind of trigger.
    #[must_use]
    pub fn misfire_instructions(self) -> &'static [(&'static str, i32)] {
        match self {
            Self::Simple => SIMPLE_MISFIRE_INSTRUCTIONS,
            Self::Cron => CRON_MISFIRE_INSTRUCTIONS,
        }
    }

    /// Look up a misfire instruction by its constant name.
    #[must_use]
    pub fn resolve_misfire(self, name: &str) -> Option<i32> {
        self.misfire_instructions()
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, code)| *code)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Cron => "cron",
        }
    }
}

/// Firing schedule of a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TriggerSchedule {
    Simple {
        /// Number of repeats after the first firing, `-1` for indefinitely.
        repeat_count: i32,
        /// Milliseconds between firings.
        repeat_interval: i64,
    },
    Cron {
        #[serde(skip_serializing_if = "Option::is_none")]
        cron_expression: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_zone: Option<Tz>,
    },
}

impl TriggerSchedule {
    #[must_use]
    pub fn for_kind(kind: TriggerKind) -> Self {
        match kind {
            TriggerKind::Simple => Self::Simple {
                repeat_count: 0,
                repeat_interval: 0,
            },
            TriggerKind::Cron => Self::Cron {
                cron_expression: None,
                time_zone: None,
            },
        }
    }

    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Simple { .. } => TriggerKind::Simple,
            Self::Cron { .. } => TriggerKind::Cron,
        }
    }
}

/// A trigger as declared in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerDefinition {
    pub key: TriggerKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_name: Option<String>,
    pub misfire_instruction: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub schedule: TriggerSchedule,
}

impl TriggerDefinition {
    #[must_use]
    pub fn new(key: TriggerKey, kind: TriggerKind) -> Self {
        Self {
            key,
            description: None,
            job_name: None,
            job_group: None,
            calendar_name: None,
            misfire_instruction: MISFIRE_INSTRUCTION_SMART_POLICY,
            start_time: None,
            end_time: None,
            schedule: TriggerSchedule::for_kind(kind),
        }
    }

    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        self.schedule.kind()
    }

    /// Point the trigger at the job that owns it.
    pub fn stamp(&mut self, job: &JobKey) {
        self.job_name = Some(job.name.clone());
        self.job_group = Some(job.group.clone());
    }
}

/// The result of parsing one `job` element: a job and its triggers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_detail: Option<JobDetail>,
    pub triggers: Vec<TriggerDefinition>,
}

impl JobBundle {
    /// A bundle can be scheduled only once it has a job detail.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.job_detail.is_some()
    }

    #[must_use]
    pub fn key(&self) -> Option<&JobKey> {
        self.job_detail.as_ref().map(|detail| &detail.key)
    }

    #[must_use]
    pub fn full_name(&self) -> Option<String> {
        self.key().map(Key::full_name)
    }

    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.job_detail.as_ref().is_some_and(|detail| detail.durable)
    }
}

/// Known calendar implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarKind {
    #[default]
    Base,
    Annual,
    Cron,
    Daily,
    Holiday,
    Monthly,
    Weekly,
}

impl CalendarKind {
    /// Resolve a calendar class reference.
    ///
    /// Accepts short names (`weekly`), and class names with or without a
    /// package qualifier (`org.example.WeeklyCalendar`), ignoring case.
    #[must_use]
    pub fn from_class_name(class_name: &str) -> Option<Self> {
        let simple = class_name
            .trim()
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let simple = simple.strip_suffix("calendar").unwrap_or(&simple);
        let simple = simple.trim_end_matches('-');

        match simple {
            "base" => Some(Self::Base),
            "annual" => Some(Self::Annual),
            "cron" => Some(Self::Cron),
            "daily" => Some(Self::Daily),
            "holiday" => Some(Self::Holiday),
            "monthly" => Some(Self::Monthly),
            "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }
}

/// A calendar as handed to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Calendar {
    pub kind: CalendarKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<Box<Calendar>>,
}

/// The result of parsing one `calendar` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CalendarBundle {
    pub calendar_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub kind: CalendarKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub replace: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<Box<CalendarBundle>>,
}

impl CalendarBundle {
    /// Build the calendar value, including its chain of base calendars.
    #[must_use]
    pub fn calendar(&self) -> Calendar {
        Calendar {
            kind: self.kind,
            description: self.description.clone(),
            base: self.base.as_ref().map(|base| Box::new(base.calendar())),
        }
    }
}

/// Parsed job bundles keyed by full job name.
///
/// Iteration follows the sorted full name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BundleRegistry {
    bundles: BTreeMap<String, JobBundle>,
}

impl BundleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bundle under its full job name.
    ///
    /// Returns the bundle it replaced. Bundles without a job detail have no
    /// name and are handed back unregistered.
    pub fn add(&mut self, bundle: JobBundle) -> Result<Option<JobBundle>, JobBundle> {
        match bundle.full_name() {
            Some(name) => Ok(self.bundles.insert(name, bundle)),
            None => Err(bundle),
        }
    }

    /// Register a bundle under an explicit name.
    pub fn insert(&mut self, name: impl Into<String>, bundle: JobBundle) -> Option<JobBundle> {
        self.bundles.insert(name.into(), bundle)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&JobBundle> {
        self.bundles.get(name)
    }

    pub fn clear(&mut self) {
        self.bundles.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JobBundle)> {
        self.bundles.iter().map(|(name, bundle)| (name.as_str(), bundle))
    }

    pub fn bundles(&self) -> impl Iterator<Item = &JobBundle> {
        self.bundles.values()
    }
}

impl<'a> IntoIterator for &'a BundleRegistry {
    type Item = (&'a String, &'a JobBundle);
    type IntoIter = std::collections::btree_map::Iter<'a, String, JobBundle>;

    fn into_iter(self) -> Self::IntoIter {
        self.bundles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bundle(name: &str, group: &str) -> JobBundle {
        JobBundle {
            job_detail: Some(JobDetail {
                key: Key::new(name, group),
                job_class: "com.example.Job".to_string(),
                ..JobDetail::default()
            }),
            triggers: Vec::new(),
        }
    }

    #[test]
    fn test_key_defaults_group() {
        let key = Key::new("cleanup", "");
        assert_eq!(key.group, "DEFAULT");
        assert_eq!(key.full_name(), "DEFAULT.cleanup");
        assert_eq!(key.to_string(), "DEFAULT.cleanup");
    }

    #[test]
    fn test_misfire_tables_per_kind() {
        assert_eq!(
            TriggerKind::Simple.resolve_misfire("MISFIRE_INSTRUCTION_FIRE_NOW"),
            Some(1)
        );
        assert_eq!(
            TriggerKind::Simple
                .resolve_misfire("MISFIRE_INSTRUCTION_RESCHEDULE_NEXT_WITH_EXISTING_COUNT"),
            Some(5)
        );
        assert_eq!(
            TriggerKind::Cron.resolve_misfire("MISFIRE_INSTRUCTION_DO_NOTHING"),
            Some(2)
        );
        // Names belong to one kind only
        assert_eq!(TriggerKind::Cron.resolve_misfire("MISFIRE_INSTRUCTION_FIRE_NOW"), None);
        assert_eq!(
            TriggerKind::Simple.resolve_misfire("MISFIRE_INSTRUCTION_DO_NOTHING"),
            None
        );
        for kind in [TriggerKind::Simple, TriggerKind::Cron] {
            assert_eq!(kind.resolve_misfire("MISFIRE_INSTRUCTION_SMART_POLICY"), Some(0));
        }
    }

    #[test]
    fn test_trigger_stamp() {
        let mut trigger = TriggerDefinition::new(Key::new("t1", "g"), TriggerKind::Cron);
        trigger.job_name = Some("declared".to_string());
        trigger.stamp(&Key::new("owner", "jobs"));

        assert_eq!(trigger.job_name.as_deref(), Some("owner"));
        assert_eq!(trigger.job_group.as_deref(), Some("jobs"));
    }

    #[test]
    fn test_bundle_validity() {
        assert!(!JobBundle::default().is_valid());
        assert!(bundle("a", "g").is_valid());
        assert_eq!(bundle("a", "g").full_name().as_deref(), Some("g.a"));
    }

    #[test]
    fn test_calendar_kind_from_class_name() {
        assert_eq!(CalendarKind::from_class_name("weekly"), Some(CalendarKind::Weekly));
        assert_eq!(
            CalendarKind::from_class_name("org.example.calendar.HolidayCalendar"),
            Some(CalendarKind::Holiday)
        );
        assert_eq!(CalendarKind::from_class_name("AnnualCalendar"), Some(CalendarKind::Annual));
        assert_eq!(CalendarKind::from_class_name("base-calendar"), Some(CalendarKind::Base));
        assert_eq!(CalendarKind::from_class_name("com.example.LunarCalendar"), None);
    }

    #[test]
    fn test_calendar_chain() {
        let bundle = CalendarBundle {
            calendar_name: "weekdays".to_string(),
            kind: CalendarKind::Weekly,
            base: Some(Box::new(CalendarBundle {
                calendar_name: "holidays".to_string(),
                kind: CalendarKind::Holiday,
                ..CalendarBundle::default()
            })),
            ..CalendarBundle::default()
        };

        let calendar = bundle.calendar();
        assert_eq!(calendar.kind, CalendarKind::Weekly);
        assert_eq!(calendar.base.map(|b| b.kind), Some(CalendarKind::Holiday));
    }

    #[test]
    fn test_registry_orders_by_full_name_and_replaces() {
        let mut registry = BundleRegistry::new();
        registry.add(bundle("zeta", "a")).unwrap();
        registry.add(bundle("alpha", "b")).unwrap();
        let replaced = registry.add(bundle("zeta", "a")).unwrap();

        assert!(replaced.is_some());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a.zeta", "b.alpha"]);
    }

    #[test]
    fn test_registry_rejects_unnamed_bundle() {
        let mut registry = BundleRegistry::new();
        assert!(registry.add(JobBundle::default()).is_err());
        assert!(registry.is_empty());
    }
}
