//! Configuration value objects shared by designs, filters and the handler.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::Severity;

/// Returns the default mapping from severities to the emoji shown in message headers.
pub fn default_emojis() -> FxHashMap<Severity, String> {
    [
        (Severity::CRITICAL, ":fire:"),
        (Severity::ERROR, ":x:"),
        (Severity::WARNING, ":warning:"),
        (Severity::INFO, ":bell:"),
        (Severity::DEBUG, ":microscope:"),
        (Severity::NOTSET, ":mega:"),
    ]
    .into_iter()
    .map(|(severity, emoji)| (severity, emoji.to_owned()))
    .collect()
}

/// Identity and free-form tags describing where log records come from.
///
/// Unset values are `None`, never empty strings. An empty `context` or `extra_fields` means
/// "nothing to render" for designs and "no constraint" for filters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Name of the service.
    pub service: Option<String>,

    /// Deployment environment, e.g. `prod`.
    pub environment: Option<String>,

    /// Free-form context tags, displayed in insertion order.
    pub context: Vec<String>,

    /// Additional key-value fields.
    pub extra_fields: IndexMap<String, String>,
}

impl LogConfig {
    /// Sets the service name.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the environment.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Appends a context tag.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Adds an extra field, replacing any previous value for the same key.
    pub fn with_extra_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_fields.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.environment.is_none()
            && self.context.is_empty()
            && self.extra_fields.is_empty()
    }

    /// Computes a new configuration with `overlay` laid over `self`, field by field.
    ///
    /// Set values of `overlay` win: its `service` and `environment` replace ours when present,
    /// a non-empty `context` replaces ours, and `extra_fields` are unioned with `overlay`
    /// winning on key collisions. Neither input is modified.
    #[must_use]
    pub fn overlay(&self, overlay: &Self) -> Self {
        let context = if overlay.context.is_empty() {
            self.context.clone()
        } else {
            overlay.context.clone()
        };

        let mut extra_fields = self.extra_fields.clone();
        extra_fields.extend(
            overlay
                .extra_fields
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        Self {
            service: overlay.service.clone().or_else(|| self.service.clone()),
            environment: overlay
                .environment
                .clone()
                .or_else(|| self.environment.clone()),
            context,
            extra_fields,
        }
    }
}

/// Configuration used by message designs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Identity and tags rendered into messages.
    #[serde(flatten)]
    pub log: LogConfig,

    /// Emoji prefixed to the header, by severity.
    #[serde(default = "default_emojis")]
    pub emojis: FxHashMap<Severity, String>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            emojis: default_emojis(),
        }
    }
}

impl From<LogConfig> for FormatConfig {
    fn from(log: LogConfig) -> Self {
        Self {
            log,
            emojis: default_emojis(),
        }
    }
}

impl FormatConfig {
    /// Returns the emoji configured for `severity`, if any.
    pub fn emoji(&self, severity: Severity) -> Option<&str> {
        self.emojis.get(&severity).map(String::as_str)
    }
}

/// How the per-dimension match results of a filter combine into its verdict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Let the record through if any configured dimension matches.
    #[default]
    AnyAllow,

    /// Let the record through only if every configured dimension matches.
    AllAllow,

    /// Drop the record if any configured dimension matches.
    AnyDeny,

    /// Drop the record only if every configured dimension matches.
    AllDeny,
}

impl FilterType {
    /// Combines per-dimension match results into a verdict, `true` meaning "let through".
    ///
    /// With no results, "any" is `false` and "all" is `true`, so an unconstrained filter drops
    /// everything under [`FilterType::AnyAllow`] and [`FilterType::AllDeny`].
    pub fn combine(self, results: &[bool]) -> bool {
        let any = || results.iter().any(|matched| *matched);
        let all = || results.iter().all(|matched| *matched);

        match self {
            Self::AnyAllow => any(),
            Self::AllAllow => all(),
            Self::AnyDeny => !any(),
            Self::AllDeny => !all(),
        }
    }
}

/// Configuration of a single filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// The dimensions to match against.
    #[serde(flatten)]
    pub log: LogConfig,

    /// Treat configured values as regular expressions searched within the record's values.
    #[serde(default)]
    pub use_regex: bool,

    /// How match results combine into a verdict.
    #[serde(default)]
    pub filter_type: FilterType,
}

impl FilterConfig {
    /// Creates a filter configuration from its dimensions and combinator.
    pub fn new(log: LogConfig, filter_type: FilterType) -> Self {
        Self {
            log,
            use_regex: false,
            filter_type,
        }
    }

    /// Switches to regular expression matching.
    pub fn with_regex(mut self) -> Self {
        self.use_regex = true;
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn overlay_prefers_set_values_of_the_overlay() {
        let base = LogConfig::default()
            .with_service("api")
            .with_environment("test")
            .with_context("base")
            .with_extra_field("foo", "bar")
            .with_extra_field("raven", "caw");
        let overlay = LogConfig::default()
            .with_environment("prod")
            .with_extra_field("foo", "baba")
            .with_extra_field("cow", "moo");

        let merged = base.overlay(&overlay);

        assert_eq!(merged.service.as_deref(), Some("api"));
        assert_eq!(merged.environment.as_deref(), Some("prod"));
        assert_eq!(merged.context, vec!["base".to_owned()]);
        let fields: Vec<(&str, &str)> = merged
            .extra_fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(fields, [("foo", "baba"), ("raven", "caw"), ("cow", "moo")]);

        // Inputs are left untouched
        assert_eq!(base.environment.as_deref(), Some("test"));
        assert_eq!(base.extra_fields.len(), 2);
    }

    #[test]
    fn overlay_replaces_non_empty_context() {
        let base = LogConfig::default().with_context("a").with_context("b");
        let overlay = LogConfig::default().with_context("c");
        assert_eq!(base.overlay(&overlay).context, vec!["c".to_owned()]);
    }

    #[test]
    fn combine_truth_table() {
        assert!(FilterType::AnyAllow.combine(&[false, true]));
        assert!(!FilterType::AllAllow.combine(&[false, true]));
        assert!(!FilterType::AnyDeny.combine(&[false, true]));
        assert!(FilterType::AllDeny.combine(&[false, true]));
    }

    #[test]
    fn combine_without_results() {
        assert!(!FilterType::AnyAllow.combine(&[]));
        assert!(FilterType::AllAllow.combine(&[]));
        assert!(FilterType::AnyDeny.combine(&[]));
        assert!(!FilterType::AllDeny.combine(&[]));
    }

    #[test]
    fn default_emojis_cover_named_levels() {
        let config = FormatConfig::default();
        assert_eq!(config.emoji(Severity::WARNING), Some(":warning:"));
        assert_eq!(config.emoji(Severity::CRITICAL), Some(":fire:"));
        assert_eq!(config.emoji(Severity::TRACE), None);
    }

    #[test]
    fn filter_config_deserializes_with_defaults() {
        let config: FilterConfig = serde_json::from_str(
            r#"{"environment": "prod", "context": [".*job.*"], "use_regex": true, "filter_type": "any_deny"}"#,
        )
        .unwrap();

        assert_eq!(config.log.environment.as_deref(), Some("prod"));
        assert_eq!(config.log.context, vec![".*job.*".to_owned()]);
        assert!(config.use_regex);
        assert_eq!(config.filter_type, FilterType::AnyDeny);

        let config: FilterConfig = serde_json::from_str(r#"{"service": "api"}"#).unwrap();
        assert!(!config.use_regex);
        assert_eq!(config.filter_type, FilterType::AnyAllow);
    }

    #[test]
    fn format_config_deserializes_emoji_overrides() {
        let config: FormatConfig =
            serde_json::from_str(r#"{"service": "api", "emojis": {"30": ":eyes:"}}"#).unwrap();
        assert_eq!(config.log.service.as_deref(), Some("api"));
        assert_eq!(config.emoji(Severity::WARNING), Some(":eyes:"));
        assert_eq!(config.emoji(Severity::ERROR), None);

        let config: FormatConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.emoji(Severity::ERROR), Some(":x:"));
    }
}
