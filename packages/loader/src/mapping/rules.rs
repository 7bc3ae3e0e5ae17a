//! Rule types bound to element paths.

use super::stack::FrameKind;

/// Method invoked by a [`Rule::CallMethod`] with its captured parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `put(key, value)` on a job data map.
    Put,
}

impl Method {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Put => "put",
        }
    }
}

/// Where a finished frame is wired when its element ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachTarget {
    /// Data map into its job detail.
    SetJobDataMap,
    /// Job detail into its job bundle.
    SetJobDetail,
    /// Trigger onto its job bundle.
    AddTrigger,
    /// Calendar as base of the enclosing calendar.
    SetBaseCalendar,
    /// Top-level calendar to the calendar sink.
    AddCalendar,
    /// Job bundle to the bundle registry.
    ScheduleJob,
}

impl AttachTarget {
    #[must_use]
    pub fn action(self) -> &'static str {
        match self {
            Self::SetJobDataMap => "set job data map",
            Self::SetJobDetail => "set job detail",
            Self::AddTrigger => "add trigger",
            Self::SetBaseCalendar => "set base calendar",
            Self::AddCalendar => "add calendar",
            Self::ScheduleJob => "schedule job",
        }
    }

    /// Description of the frame this target consumes.
    #[must_use]
    pub fn child(self) -> &'static str {
        match self {
            Self::SetJobDataMap => "job data map",
            Self::SetJobDetail => "job detail",
            Self::AddTrigger => "trigger",
            Self::SetBaseCalendar | Self::AddCalendar => "calendar",
            Self::ScheduleJob => "job",
        }
    }
}

/// An action fired while walking an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Push a new frame when the element starts, pop it when it ends.
    Create(FrameKind),
    /// Apply every attribute to the top frame. `aliases` maps attribute
    /// names to property names; attributes without a property are ignored.
    SetProperties { aliases: Vec<(String, String)> },
    /// Apply the element's text to a property of the top frame.
    SetProperty(String),
    /// Collect `params` values from child elements and invoke `method` on
    /// the top frame when the element ends.
    CallMethod { method: Method, params: usize },
    /// Capture the element's text as parameter `index` of the pending call.
    CallParam(usize),
    /// Resolve the element's text as a misfire instruction name.
    MisfireInstruction,
    /// Pop the top frame and wire it into the one below.
    Attach(AttachTarget),
}

impl Rule {
    /// Whether the rule consumes the element's text.
    #[must_use]
    pub fn uses_text(&self) -> bool {
        matches!(
            self,
            Self::SetProperty(_) | Self::CallParam(_) | Self::MisfireInstruction
        )
    }

    /// Set the element text on `property`.
    #[must_use]
    pub fn property(property: &str) -> Self {
        Self::SetProperty(property.to_string())
    }

    /// Apply attributes, renaming those listed in `aliases`.
    #[must_use]
    pub fn properties(aliases: &[(&str, &str)]) -> Self {
        Self::SetProperties {
            aliases: aliases
                .iter()
                .map(|(attribute, property)| ((*attribute).to_string(), (*property).to_string()))
                .collect(),
        }
    }
}
