//! Rule table for job scheduling data documents.

use super::core::RuleRegistry;
use super::rules::{AttachTarget, Method, Rule};
use super::stack::FrameKind;
use crate::model::TriggerKind;

const ROOT: &str = "job-scheduling-data";

/// Create the rule registry for `job-scheduling-data` documents.
///
/// Top-level calendars go to the calendar sink as soon as they end, nested
/// `base-calendar` elements become the base of their enclosing calendar at
/// any depth, and every `job` ends up in the bundle registry.
#[must_use]
pub fn create_job_scheduling_rules() -> RuleRegistry {
    let mut registry = RuleRegistry::new();

    registry.add(
        ROOT,
        Rule::properties(&[("overwrite-existing-jobs", "overwrite_existing_jobs")]),
    );

    add_calendar_rules(
        &mut registry,
        &format!("{ROOT}/calendar"),
        AttachTarget::AddCalendar,
    );
    add_calendar_rules(&mut registry, "*/base-calendar", AttachTarget::SetBaseCalendar);

    let job = format!("{ROOT}/job");
    registry.add_all(
        &job,
        [
            Rule::Create(FrameKind::Job),
            Rule::Attach(AttachTarget::ScheduleJob),
        ],
    );

    let detail = format!("{job}/job-detail");
    registry.add_all(
        &detail,
        [
            Rule::Create(FrameKind::JobDetail),
            Rule::Attach(AttachTarget::SetJobDetail),
        ],
    );
    for (element, property) in [
        ("name", "name"),
        ("group", "group"),
        ("description", "description"),
        ("job-class", "job_class"),
        ("volatility", "volatility"),
        ("durability", "durability"),
        ("recover", "recover"),
    ] {
        registry.add(&format!("{detail}/{element}"), Rule::property(property));
    }

    let data_map = format!("{detail}/job-data-map");
    registry.add_all(
        &data_map,
        [
            Rule::Create(FrameKind::DataMap),
            Rule::properties(&[("allows-transient-data", "allows_transient_data")]),
            Rule::Attach(AttachTarget::SetJobDataMap),
        ],
    );
    registry.add(
        &format!("{data_map}/entry"),
        Rule::CallMethod {
            method: Method::Put,
            params: 2,
        },
    );
    registry.add(&format!("{data_map}/entry/key"), Rule::CallParam(0));
    registry.add(&format!("{data_map}/entry/value"), Rule::CallParam(1));

    add_trigger_rules(
        &mut registry,
        &format!("{job}/trigger/simple"),
        TriggerKind::Simple,
        &[("repeat-count", "repeat_count"), ("repeat-interval", "repeat_interval")],
    );
    add_trigger_rules(
        &mut registry,
        &format!("{job}/trigger/cron"),
        TriggerKind::Cron,
        &[("cron-expression", "cron_expression"), ("time-zone", "time_zone")],
    );

    registry
}

fn add_calendar_rules(registry: &mut RuleRegistry, pattern: &str, target: AttachTarget) {
    registry.add_all(
        pattern,
        [
            Rule::Create(FrameKind::Calendar),
            Rule::properties(&[("class-name", "class_name")]),
            Rule::Attach(target),
        ],
    );
    registry.add(&format!("{pattern}/name"), Rule::property("calendar_name"));
    registry.add(&format!("{pattern}/description"), Rule::property("description"));
}

fn add_trigger_rules(
    registry: &mut RuleRegistry,
    pattern: &str,
    kind: TriggerKind,
    schedule: &[(&str, &str)],
) {
    registry.add_all(
        pattern,
        [
            Rule::Create(FrameKind::Trigger(kind)),
            Rule::Attach(AttachTarget::AddTrigger),
        ],
    );
    registry.add(&format!("{pattern}/misfire-instruction"), Rule::MisfireInstruction);

    let common = [
        ("name", "name"),
        ("group", "group"),
        ("description", "description"),
        ("calendar-name", "calendar_name"),
        ("job-name", "job_name"),
        ("job-group", "job_group"),
        ("start-time", "start_time"),
        ("end-time", "end_time"),
    ];
    for (element, property) in common.iter().chain(schedule) {
        registry.add(&format!("{pattern}/{element}"), Rule::property(property));
    }
}
