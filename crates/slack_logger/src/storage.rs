//! Captures the fields of spans and events into the attributes of a [`LogRecord`].

use std::{error::Error, fmt};

use indexmap::IndexMap;
use tracing::field::{Field, Visit};

use crate::{LogConfig, LogRecord, RecordAttributes, Severity, keys};

/// Holds the fields recorded for a span or an event, in the order they were recorded.
///
/// Span storage lives in the span's extensions; events start from a copy of the storage of
/// their enclosing span so that their own fields take precedence.
#[derive(Clone, Debug, Default)]
pub(crate) struct Storage {
    /// The collected key-value pairs.
    values: IndexMap<&'static str, String>,

    /// The primary message of an event, if captured.
    message: Option<String>,

    /// Error details, recorded through [`Visit::record_error`] or the `exception` field.
    exception: Option<String>,
}

impl Storage {
    /// Creates the storage of an event from the storage of its enclosing span.
    pub(crate) fn for_event(span_storage: Option<&Self>) -> Self {
        span_storage
            .map(|storage| Self {
                values: storage.values.clone(),
                message: None,
                exception: storage.exception.clone(),
            })
            .unwrap_or_default()
    }

    fn record_value(&mut self, key: &'static str, value: String) {
        if key == keys::EXCEPTION {
            self.exception = Some(value);
        } else {
            self.values.insert(key, value);
        }
    }

    fn record_message(&mut self, message: String, preferred: bool) {
        if preferred || self.message.is_none() {
            self.message = Some(message);
        }
    }

    /// Splits the recorded fields into the well-known record attributes.
    ///
    /// Fields that are neither reserved attribute keys nor prefixed with `extra_fields.` or
    /// `filter.extra_fields.` are ignored.
    pub(crate) fn attributes(&self) -> RecordAttributes {
        let mut attributes = RecordAttributes::default();
        let mut filter = LogConfig::default();

        for (&key, value) in &self.values {
            match key {
                keys::ENVIRONMENT => attributes.environment = Some(value.clone()),
                keys::SERVICE => attributes.service = Some(value.clone()),
                keys::FILTER_SERVICE => filter.service = Some(value.clone()),
                keys::FILTER_ENVIRONMENT => filter.environment = Some(value.clone()),
                keys::FILTER_CONTEXT => filter.context = parse_context(value),
                key => {
                    if let Some(field) = key.strip_prefix(keys::FILTER_EXTRA_FIELDS_PREFIX) {
                        filter.extra_fields.insert(field.to_owned(), value.clone());
                    } else if let Some(field) = key.strip_prefix(keys::EXTRA_FIELDS_PREFIX) {
                        attributes.extra_fields.insert(field.to_owned(), value.clone());
                    }
                }
            }
        }

        if !filter.is_empty() {
            attributes.filter = Some(filter);
        }
        attributes
    }

    /// Builds the record of an event.
    pub(crate) fn into_record(self, severity: Severity, logger: &str) -> LogRecord {
        let attributes = self.attributes();
        LogRecord {
            severity,
            message: self.message.unwrap_or_default(),
            logger: logger.to_owned(),
            exception: self.exception,
            attributes,
        }
    }
}

/// Accepts a JSON array of strings or a comma-separated list.
fn parse_context(value: &str) -> Vec<String> {
    if let Ok(entries) = serde_json::from_str::<Vec<String>>(value) {
        return entries;
    }

    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `error`, followed by one `caused by` line per source.
fn error_chain(error: &(dyn Error + 'static)) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str("\ncaused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

// Implement `Visit` to capture span or event fields into the `Storage` map.
impl Visit for Storage {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_str(field, &value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_str(field, &value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_str(field, &value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_str(field, &value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == keys::MESSAGE {
            self.record_message(value.to_owned(), true);
        } else {
            self.record_value(field.name(), value.to_owned());
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if field.name() == keys::MESSAGE {
            self.record_message(value.to_string(), false);
        } else {
            self.exception = Some(error_chain(value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            keys::MESSAGE => self.record_message(format!("{value:?}"), false),
            // Skip fields added by `tracing-log`
            name if name.starts_with("log.") => (),
            name => {
                let name = name.strip_prefix("r#").unwrap_or(name);
                self.record_value(name, format!("{value:?}"));
            }
        }
    }
}
