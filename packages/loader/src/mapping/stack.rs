//! Frames of the construction stack and their property setters.

use thiserror::Error;

use crate::convert::{parse_flag, parse_number, ConversionError, Converter, Converters};
use crate::model::{
    CalendarBundle, CalendarKind, JobBundle, JobDataMap, JobDetail, Key, TriggerDefinition,
    TriggerKind, TriggerSchedule,
};

/// A setter rejected the value it was given.
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("unknown calendar class '{0}'")]
    UnknownCalendarClass(String),
}

/// Settings declared on the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSettings {
    pub overwrite_existing_jobs: Option<bool>,
    pub version: Option<String>,
}

/// What a `Create` rule pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Job,
    JobDetail,
    DataMap,
    Trigger(TriggerKind),
    Calendar,
}

/// An object under construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Root(DocumentSettings),
    Job(JobBundle),
    JobDetail(JobDetail),
    DataMap(JobDataMap),
    Trigger(TriggerDefinition),
    Calendar(CalendarBundle),
}

impl Frame {
    #[must_use]
    pub fn new(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Job => Self::Job(JobBundle::default()),
            FrameKind::JobDetail => Self::JobDetail(JobDetail::default()),
            FrameKind::DataMap => Self::DataMap(JobDataMap::default()),
            FrameKind::Trigger(kind) => {
                Self::Trigger(TriggerDefinition::new(Key::default(), kind))
            }
            FrameKind::Calendar => Self::Calendar(CalendarBundle::default()),
        }
    }

    /// Human readable name used in error messages.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Root(_) => "document",
            Self::Job(_) => "job",
            Self::JobDetail(_) => "job detail",
            Self::DataMap(_) => "job data map",
            Self::Trigger(_) => "trigger",
            Self::Calendar(_) => "calendar",
        }
    }

    /// Apply `value` to `property`.
    ///
    /// Returns `Ok(false)` when the frame has no such property.
    pub fn set(
        &mut self,
        property: &str,
        value: &str,
        converters: &Converters,
    ) -> Result<bool, PropertyError> {
        match self {
            Self::Root(settings) => set_document(settings, property, value),
            Self::Job(_) => Ok(false),
            Self::JobDetail(detail) => set_job_detail(detail, property, value),
            Self::DataMap(map) => set_data_map(map, property, value),
            Self::Trigger(trigger) => set_trigger(trigger, property, value, converters),
            Self::Calendar(calendar) => set_calendar(calendar, property, value),
        }
    }
}

fn set_document(
    settings: &mut DocumentSettings,
    property: &str,
    value: &str,
) -> Result<bool, PropertyError> {
    match property {
        "overwrite_existing_jobs" => settings.overwrite_existing_jobs = Some(parse_flag(value)?),
        "version" => settings.version = Some(value.to_string()),
        _ => return Ok(false),
    }
    Ok(true)
}

fn set_job_detail(
    detail: &mut JobDetail,
    property: &str,
    value: &str,
) -> Result<bool, PropertyError> {
    match property {
        "name" => detail.key.name = value.to_string(),
        "group" => detail.key = Key::new(detail.key.name.clone(), value),
        "description" => detail.description = Some(value.to_string()),
        "job_class" => detail.job_class = value.to_string(),
        "volatility" => detail.volatile = parse_flag(value)?,
        "durability" => detail.durable = parse_flag(value)?,
        "recover" => detail.requests_recovery = parse_flag(value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn set_data_map(map: &mut JobDataMap, property: &str, value: &str) -> Result<bool, PropertyError> {
    match property {
        "allows_transient_data" => map.allows_transient_data = parse_flag(value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn set_trigger(
    trigger: &mut TriggerDefinition,
    property: &str,
    value: &str,
    converters: &Converters,
) -> Result<bool, PropertyError> {
    match property {
        "name" => trigger.key.name = value.to_string(),
        "group" => trigger.key = Key::new(trigger.key.name.clone(), value),
        "description" => trigger.description = Some(value.to_string()),
        "calendar_name" => trigger.calendar_name = Some(value.to_string()),
        "job_name" => trigger.job_name = Some(value.to_string()),
        "job_group" => trigger.job_group = Some(value.to_string()),
        "start_time" => trigger.start_time = Some(converters.dates.decode(value)?),
        "end_time" => trigger.end_time = Some(converters.dates.decode(value)?),
        _ => return set_schedule(&mut trigger.schedule, property, value, converters),
    }
    Ok(true)
}

fn set_schedule(
    schedule: &mut TriggerSchedule,
    property: &str,
    value: &str,
    converters: &Converters,
) -> Result<bool, PropertyError> {
    match (schedule, property) {
        (TriggerSchedule::Simple { repeat_count, .. }, "repeat_count") => {
            *repeat_count = parse_number(value)?;
        }
        (TriggerSchedule::Simple { repeat_interval, .. }, "repeat_interval") => {
            *repeat_interval = parse_number(value)?;
        }
        (TriggerSchedule::Cron { cron_expression, .. }, "cron_expression") => {
            *cron_expression = Some(value.to_string());
        }
        (TriggerSchedule::Cron { time_zone, .. }, "time_zone") => {
            *time_zone = Some(converters.time_zones.decode(value)?);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn set_calendar(
    calendar: &mut CalendarBundle,
    property: &str,
    value: &str,
) -> Result<bool, PropertyError> {
    match property {
        "calendar_name" => calendar.calendar_name = value.to_string(),
        "class_name" => {
            calendar.kind = CalendarKind::from_class_name(value)
                .ok_or_else(|| PropertyError::UnknownCalendarClass(value.to_string()))?;
            calendar.class_name = Some(value.to_string());
        }
        "description" => calendar.description = Some(value.to_string()),
        "replace" => calendar.replace = parse_flag(value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    fn set(frame: &mut Frame, property: &str, value: &str) -> Result<bool, PropertyError> {
        frame.set(property, value, &Converters::default())
    }

    #[test]
    fn test_job_detail_setters() {
        let mut frame = Frame::new(FrameKind::JobDetail);
        assert!(set(&mut frame, "name", "cleanup").unwrap());
        assert!(set(&mut frame, "group", "maintenance").unwrap());
        assert!(set(&mut frame, "durability", "yes").unwrap());
        assert!(!set(&mut frame, "colour", "red").unwrap());

        let Frame::JobDetail(detail) = frame else {
            panic!("expected job detail");
        };
        assert_eq!(detail.key, Key::new("cleanup", "maintenance"));
        assert!(detail.durable);
    }

    #[test]
    fn test_empty_group_falls_back_to_default() {
        let mut frame = Frame::new(FrameKind::Trigger(TriggerKind::Cron));
        set(&mut frame, "name", "nightly").unwrap();
        set(&mut frame, "group", "").unwrap();

        let Frame::Trigger(trigger) = frame else {
            panic!("expected trigger");
        };
        assert_eq!(trigger.key.full_name(), "DEFAULT.nightly");
    }

    #[test]
    fn test_schedule_properties_follow_trigger_kind() {
        let mut simple = Frame::new(FrameKind::Trigger(TriggerKind::Simple));
        assert!(set(&mut simple, "repeat_count", "-1").unwrap());
        assert!(set(&mut simple, "repeat_interval", "60000").unwrap());
        assert!(!set(&mut simple, "cron_expression", "0 0 * * * ?").unwrap());

        let mut cron = Frame::new(FrameKind::Trigger(TriggerKind::Cron));
        assert!(set(&mut cron, "time_zone", "Europe/Amsterdam").unwrap());
        assert!(!set(&mut cron, "repeat_count", "3").unwrap());

        let Frame::Trigger(trigger) = cron else {
            panic!("expected trigger");
        };
        assert_eq!(
            trigger.schedule,
            TriggerSchedule::Cron {
                cron_expression: None,
                time_zone: Some(Tz::Europe__Amsterdam),
            }
        );
    }

    #[test]
    fn test_trigger_times_use_date_converter() {
        let mut frame = Frame::new(FrameKind::Trigger(TriggerKind::Simple));
        set(&mut frame, "start_time", "2024-03-01T08:30:00").unwrap();
        set(&mut frame, "end_time", "2024-03-02 05:00:00 PM").unwrap();

        let Frame::Trigger(trigger) = frame else {
            panic!("expected trigger");
        };
        assert_eq!(
            trigger.start_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(
            trigger.end_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 2, 17, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_conversion_failures() {
        let mut frame = Frame::new(FrameKind::Trigger(TriggerKind::Simple));
        assert!(matches!(
            set(&mut frame, "start_time", "tomorrow"),
            Err(PropertyError::Conversion(ConversionError::InvalidDate { .. }))
        ));
        assert!(matches!(
            set(&mut frame, "repeat_count", "many"),
            Err(PropertyError::Conversion(ConversionError::InvalidNumber(_)))
        ));
    }

    #[test]
    fn test_calendar_class_resolution() {
        let mut frame = Frame::new(FrameKind::Calendar);
        set(&mut frame, "class_name", "org.example.HolidayCalendar").unwrap();
        assert!(matches!(
            set(&mut frame, "class_name", "LunarCalendar"),
            Err(PropertyError::UnknownCalendarClass(_))
        ));

        let Frame::Calendar(calendar) = frame else {
            panic!("expected calendar");
        };
        assert_eq!(calendar.kind, CalendarKind::Holiday);
        assert_eq!(calendar.class_name.as_deref(), Some("org.example.HolidayCalendar"));
    }

    #[test]
    fn test_document_settings() {
        let mut frame = Frame::Root(DocumentSettings::default());
        set(&mut frame, "overwrite_existing_jobs", "false").unwrap();
        set(&mut frame, "version", "1.1").unwrap();
        assert_eq!(
            frame,
            Frame::Root(DocumentSettings {
                overwrite_existing_jobs: Some(false),
                version: Some("1.1".to_string()),
            })
        );
    }
}
