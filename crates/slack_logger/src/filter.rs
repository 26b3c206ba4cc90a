//! Allow/deny filtering of records by their effective configuration.

use indexmap::IndexMap;
use regex::Regex;

use crate::{FilterConfig, FilterType, LogConfig, SlackLoggerError};

/// A single configured value, compiled for comparison.
#[derive(Clone, Debug)]
enum Matcher {
    Exact(String),
    Pattern(Regex),

    /// Kept until evaluation so a bad pattern surfaces when the filter is used.
    Invalid {
        pattern: String,
        error: regex::Error,
    },
}

impl Matcher {
    fn new(value: &str, use_regex: bool) -> Self {
        if !use_regex {
            return Self::Exact(value.to_owned());
        }

        match Regex::new(value) {
            Ok(regex) => Self::Pattern(regex),
            Err(error) => Self::Invalid {
                pattern: value.to_owned(),
                error,
            },
        }
    }

    /// Exact matchers compare for equality and never match an absent value. Patterns search
    /// anywhere in the value, with an absent value searched as the empty string.
    fn matches(&self, candidate: Option<&str>) -> Result<bool, SlackLoggerError> {
        match self {
            Self::Exact(expected) => Ok(candidate == Some(expected.as_str())),
            Self::Pattern(regex) => Ok(regex.is_match(candidate.unwrap_or_default())),
            Self::Invalid { pattern, error } => Err(SlackLoggerError::InvalidPattern {
                pattern: pattern.clone(),
                source: error.clone(),
            }),
        }
    }
}

/// Decides whether a record should be sent, based on its effective configuration.
///
/// Every dimension set in the [`FilterConfig`] yields match results: one for the service, one
/// for the environment, one per pair of configured and effective context entries and one per
/// configured extra field. The [`FilterType`] combines them into the verdict.
#[derive(Clone, Debug)]
pub struct SlackFilter {
    config: FilterConfig,
    service: Option<Matcher>,
    environment: Option<Matcher>,
    context: Vec<Matcher>,
    extra_fields: Vec<(String, Matcher)>,
}

impl SlackFilter {
    /// Creates a filter from its configuration.
    ///
    /// Regular expressions are compiled here, but an invalid pattern is only reported once the
    /// filter is evaluated.
    pub fn new(config: FilterConfig) -> Self {
        let use_regex = config.use_regex;
        let matcher = |value: &String| Matcher::new(value, use_regex);

        Self {
            service: config.log.service.as_ref().map(matcher),
            environment: config.log.environment.as_ref().map(matcher),
            context: config.log.context.iter().map(matcher).collect(),
            extra_fields: config
                .log
                .extra_fields
                .iter()
                .map(|(key, value)| (key.clone(), matcher(value)))
                .collect(),
            config,
        }
    }

    /// Lets records through if any of the configured dimensions matches.
    pub fn any_allow(config: LogConfig) -> Self {
        Self::new(FilterConfig::new(config, FilterType::AnyAllow))
    }

    /// Lets records through only if all configured dimensions match.
    pub fn all_allow(config: LogConfig) -> Self {
        Self::new(FilterConfig::new(config, FilterType::AllAllow))
    }

    /// Drops records if any of the configured dimensions matches.
    pub fn any_deny(config: LogConfig) -> Self {
        Self::new(FilterConfig::new(config, FilterType::AnyDeny))
    }

    /// Drops records only if all configured dimensions match.
    pub fn all_deny(config: LogConfig) -> Self {
        Self::new(FilterConfig::new(config, FilterType::AllDeny))
    }

    /// Filters on extra fields only.
    pub fn filter_by_fields(fields: IndexMap<String, String>, filter_type: FilterType) -> Self {
        let config = LogConfig {
            extra_fields: fields,
            ..LogConfig::default()
        };
        Self::new(FilterConfig::new(config, filter_type))
    }

    /// Drops records carrying any of the given extra fields.
    pub fn hide_by_fields(fields: IndexMap<String, String>) -> Self {
        Self::filter_by_fields(fields, FilterType::AnyDeny)
    }

    /// Returns the configuration this filter was built from.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Checks that every configured regular expression compiled.
    ///
    /// # Errors
    ///
    /// Returns [`SlackLoggerError::InvalidPattern`] for the first invalid pattern.
    pub fn validate(&self) -> Result<(), SlackLoggerError> {
        self.service
            .iter()
            .chain(&self.environment)
            .chain(&self.context)
            .chain(self.extra_fields.iter().map(|(_, matcher)| matcher))
            .try_for_each(|matcher| matcher.matches(None).map(drop))
    }

    /// Evaluates the filter against the effective configuration of a record.
    ///
    /// Returns `Ok(true)` if the record should be sent.
    ///
    /// # Errors
    ///
    /// Returns [`SlackLoggerError::InvalidPattern`] if a configured regular expression is
    /// invalid.
    pub fn matches(&self, effective: &LogConfig) -> Result<bool, SlackLoggerError> {
        let mut results = Vec::new();

        if let Some(service) = &self.service {
            results.push(service.matches(effective.service.as_deref())?);
        }
        if let Some(environment) = &self.environment {
            results.push(environment.matches(effective.environment.as_deref())?);
        }
        for configured in &self.context {
            for actual in &effective.context {
                results.push(configured.matches(Some(actual))?);
            }
        }
        for (key, configured) in &self.extra_fields {
            results.push(configured.matches(effective.extra_fields.get(key).map(String::as_str))?);
        }

        let verdict = self.config.filter_type.combine(&results);
        tracing::debug!(
            filter_type = ?self.config.filter_type,
            ?results,
            verdict,
            "Evaluated filter"
        );
        Ok(verdict)
    }
}
