//! The log record consumed by designs, filters and the handler, along with its [`Severity`].

use std::{borrow::Cow, fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

use crate::{LogConfig, SlackLoggerError};

/// Numeric severity of a log record.
///
/// Higher values are more severe. The named constants mirror the conventional level ladder used
/// by chat alerting, which has one level (`CRITICAL`) above [`tracing::Level::ERROR`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u32", try_from = "SeverityRepr")]
pub struct Severity(u32);

impl Severity {
    /// No severity set.
    pub const NOTSET: Self = Self(0);
    /// Severity of [`tracing::Level::TRACE`] events.
    pub const TRACE: Self = Self(5);
    /// Debugging information.
    pub const DEBUG: Self = Self(10);
    /// Informational messages.
    pub const INFO: Self = Self(20);
    /// Something unexpected happened, but processing continues.
    pub const WARNING: Self = Self(30);
    /// An operation failed.
    pub const ERROR: Self = Self(40);
    /// The application may not be able to continue.
    pub const CRITICAL: Self = Self(50);

    /// Creates a severity from its numeric value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the numeric value of this severity.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns the level name shown in message headers, e.g. `WARNING`.
    ///
    /// Values without a name are rendered as `Level <n>`.
    pub fn name(self) -> Cow<'static, str> {
        match self {
            Self::NOTSET => Cow::Borrowed("NOTSET"),
            Self::TRACE => Cow::Borrowed("TRACE"),
            Self::DEBUG => Cow::Borrowed("DEBUG"),
            Self::INFO => Cow::Borrowed("INFO"),
            Self::WARNING => Cow::Borrowed("WARNING"),
            Self::ERROR => Cow::Borrowed("ERROR"),
            Self::CRITICAL => Cow::Borrowed("CRITICAL"),
            Self(value) => Cow::Owned(format!("Level {value}")),
        }
    }

    /// The most verbose [`LevelFilter`] that still lets records of this severity through.
    pub fn level_filter(self) -> LevelFilter {
        if self >= Self::ERROR {
            LevelFilter::ERROR
        } else if self >= Self::WARNING {
            LevelFilter::WARN
        } else if self >= Self::INFO {
            LevelFilter::INFO
        } else if self >= Self::DEBUG {
            LevelFilter::DEBUG
        } else {
            LevelFilter::TRACE
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Self::ERROR,
            tracing::Level::WARN => Self::WARNING,
            tracing::Level::INFO => Self::INFO,
            tracing::Level::DEBUG => Self::DEBUG,
            tracing::Level::TRACE => Self::TRACE,
        }
    }
}

impl From<Severity> for u32 {
    fn from(severity: Severity) -> Self {
        severity.0
    }
}

impl FromStr for Severity {
    type Err = SlackLoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(value) = trimmed.parse::<u32>() {
            return Ok(Self(value));
        }

        match trimmed.to_ascii_uppercase().as_str() {
            "NOTSET" => Ok(Self::NOTSET),
            "TRACE" => Ok(Self::TRACE),
            "DEBUG" => Ok(Self::DEBUG),
            "INFO" => Ok(Self::INFO),
            "WARN" | "WARNING" => Ok(Self::WARNING),
            "ERROR" => Ok(Self::ERROR),
            "FATAL" | "CRITICAL" => Ok(Self::CRITICAL),
            _ => Err(SlackLoggerError::Configuration(format!(
                "Unknown severity `{s}`"
            ))),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeverityRepr {
    Number(u32),
    Name(String),
}

impl TryFrom<SeverityRepr> for Severity {
    type Error = SlackLoggerError;

    fn try_from(repr: SeverityRepr) -> Result<Self, Self::Error> {
        match repr {
            SeverityRepr::Number(value) => Ok(Self(value)),
            SeverityRepr::Name(name) => name.parse(),
        }
    }
}

/// Attributes supplied dynamically with a single record.
///
/// Each attribute overrides the corresponding static configuration while this record is
/// rendered or filtered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordAttributes {
    /// Environment the record originates from.
    pub environment: Option<String>,

    /// Service the record originates from.
    pub service: Option<String>,

    /// Extra fields shown in the fields section of rich messages.
    pub extra_fields: IndexMap<String, String>,

    /// Configuration the attached filters are evaluated against.
    pub filter: Option<LogConfig>,
}

impl RecordAttributes {
    /// Returns `true` if no attribute was supplied.
    pub fn is_empty(&self) -> bool {
        self.environment.is_none()
            && self.service.is_none()
            && self.extra_fields.is_empty()
            && self.filter.is_none()
    }
}

/// A single log record as seen by the rendering and filtering pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity of the record.
    pub severity: Severity,

    /// The rendered message text.
    pub message: String,

    /// Name of the logger that produced the record (the `tracing` target).
    pub logger: String,

    /// Exception or error chain attached to the record.
    pub exception: Option<String>,

    /// Dynamic per-record attributes.
    pub attributes: RecordAttributes,
}

impl LogRecord {
    /// Creates a record without exception text or dynamic attributes.
    pub fn new(
        severity: Severity,
        logger: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            logger: logger.into(),
            exception: None,
            attributes: RecordAttributes::default(),
        }
    }

    /// Attaches exception text to the record.
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Sets the dynamic `environment` attribute.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.attributes.environment = Some(environment.into());
        self
    }

    /// Sets the dynamic `service` attribute.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.attributes.service = Some(service.into());
        self
    }

    /// Adds a dynamic extra field, replacing any previous value for the same key.
    pub fn with_extra_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .extra_fields
            .insert(key.into(), value.into());
        self
    }

    /// Sets the dynamic `filter` attribute.
    pub fn with_filter(mut self, filter: LogConfig) -> Self {
        self.attributes.filter = Some(filter);
        self
    }

    /// Renders the record as bare text: the message, followed by the exception text if present.
    pub fn text(&self) -> String {
        match &self.exception {
            Some(exception) => format!("{}\n{exception}", self.message),
            None => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn severity_names() {
        assert_eq!(Severity::WARNING.name(), "WARNING");
        assert_eq!(Severity::CRITICAL.to_string(), "CRITICAL");
        assert_eq!(Severity::new(25).name(), "Level 25");
    }

    #[test]
    fn severity_from_tracing_level() {
        assert_eq!(Severity::from(&tracing::Level::WARN), Severity::WARNING);
        assert_eq!(Severity::from(&tracing::Level::TRACE), Severity::TRACE);
        assert!(Severity::from(&tracing::Level::INFO) < Severity::WARNING);
    }

    #[test]
    fn severity_parses_names_and_numbers() {
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::WARNING);
        assert_eq!("Critical".parse::<Severity>().unwrap(), Severity::CRITICAL);
        assert_eq!("40".parse::<Severity>().unwrap(), Severity::ERROR);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_deserializes_from_name_or_number() {
        let by_name: Severity = serde_json::from_str(r#""error""#).unwrap();
        let by_number: Severity = serde_json::from_str("40").unwrap();
        assert_eq!(by_name, Severity::ERROR);
        assert_eq!(by_number, Severity::ERROR);
        assert_eq!(serde_json::to_string(&Severity::INFO).unwrap(), "20");
    }

    #[test]
    fn severity_level_filter() {
        assert_eq!(Severity::CRITICAL.level_filter(), LevelFilter::ERROR);
        assert_eq!(Severity::WARNING.level_filter(), LevelFilter::WARN);
        assert_eq!(Severity::NOTSET.level_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn text_appends_exception() {
        let record = LogRecord::new(Severity::ERROR, "app", "boom");
        assert_eq!(record.text(), "boom");

        let record = record.with_exception("division by zero");
        assert_eq!(record.text(), "boom\ndivision by zero");
    }
}
