//! Typed conversion of element text.
//!
//! Converters are owned by a loader instance (see [`Converters`]) so two
//! loaders never share conversion settings.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::config::{LEGACY_DATE_FORMAT, SCHEMA_DATE_FORMAT};

/// Failure to convert text into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("'{value}' does not match any of the date formats [{}]", formats.join(", "))]
    InvalidDate { value: String, formats: Vec<String> },

    #[error("'{value}' does not exist in time zone {zone}")]
    NonexistentLocalTime { value: String, zone: String },

    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),

    #[error("'{0}' is not a boolean")]
    InvalidFlag(String),

    #[error("'{0}' is not a valid integer")]
    InvalidNumber(String),
}

/// Two-way conversion between element text and a typed value.
pub trait Converter {
    type Value;

    /// Render a value as text.
    fn encode(&self, value: &Self::Value) -> String;

    /// Parse text into a value.
    fn decode(&self, text: &str) -> Result<Self::Value, ConversionError>;
}

/// Converts timestamps using an ordered list of formats.
///
/// Decoding tries each format in turn and the first that parses wins.
/// Encoding always uses the first format.
#[derive(Debug, Clone)]
pub struct DateConverter {
    formats: Vec<String>,
    zone: Tz,
    default: Option<DateTime<Utc>>,
}

impl DateConverter {
    /// Create a converter that raises on unparseable input.
    #[must_use]
    pub fn new(formats: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            formats: formats.into_iter().map(Into::into).collect(),
            zone: Tz::UTC,
            default: None,
        }
    }

    /// Return `default` instead of raising when no format matches.
    #[must_use]
    pub fn with_default(mut self, default: DateTime<Utc>) -> Self {
        self.default = Some(default);
        self
    }

    /// Interpret document times in `zone`.
    #[must_use]
    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    #[must_use]
    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    fn parse(&self, text: &str) -> Result<DateTime<Utc>, ConversionError> {
        let naive = self
            .formats
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .ok_or_else(|| ConversionError::InvalidDate {
                value: text.to_string(),
                formats: self.formats.clone(),
            })?;

        self.zone
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| ConversionError::NonexistentLocalTime {
                value: text.to_string(),
                zone: self.zone.name().to_string(),
            })
    }
}

impl Default for DateConverter {
    fn default() -> Self {
        Self::new([SCHEMA_DATE_FORMAT, LEGACY_DATE_FORMAT])
    }
}

impl Converter for DateConverter {
    type Value = DateTime<Utc>;

    fn encode(&self, value: &DateTime<Utc>) -> String {
        match self.formats.first() {
            Some(format) => value.with_timezone(&self.zone).format(format).to_string(),
            None => value.to_rfc3339(),
        }
    }

    fn decode(&self, text: &str) -> Result<DateTime<Utc>, ConversionError> {
        match self.parse(text.trim()) {
            Ok(value) => Ok(value),
            Err(err) => self.default.ok_or(err),
        }
    }
}

/// Converts IANA time zone identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeZoneConverter;

impl Converter for TimeZoneConverter {
    type Value = Tz;

    fn encode(&self, value: &Tz) -> String {
        value.name().to_string()
    }

    fn decode(&self, text: &str) -> Result<Tz, ConversionError> {
        let text = text.trim();
        text.parse::<Tz>()
            .map_err(|_| ConversionError::UnknownTimeZone(text.to_string()))
    }
}

/// Converters used by one loader instance.
#[derive(Debug, Clone, Default)]
pub struct Converters {
    pub dates: DateConverter,
    pub time_zones: TimeZoneConverter,
}

impl Converters {
    /// Converters interpreting document timestamps in `zone`.
    #[must_use]
    pub fn for_zone(zone: Tz) -> Self {
        Self {
            dates: DateConverter::default().with_zone(zone),
            time_zones: TimeZoneConverter,
        }
    }
}

/// Parse a boolean flag.
///
/// Accepts `true/false`, `yes/no`, `y/n`, `on/off` and `1/0`, ignoring case.
pub fn parse_flag(text: &str) -> Result<bool, ConversionError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(ConversionError::InvalidFlag(text.trim().to_string())),
    }
}

/// Parse a signed integer.
pub fn parse_number<T: std::str::FromStr>(text: &str) -> Result<T, ConversionError> {
    text.trim()
        .parse()
        .map_err(|_| ConversionError::InvalidNumber(text.trim().to_string()))
}
