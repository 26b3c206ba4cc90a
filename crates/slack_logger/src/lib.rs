//! `slack_logger` sends log records to Slack through an incoming webhook, based on the
//! [`tracing`] ecosystem.
//!
//! It offers:
//! - [`MessageDesign`]s rendering a [`LogRecord`] into Slack blocks, through a
//!   [`SlackFormatter`].
//! - [`SlackFilter`]s deciding which records are sent, by comparing the service, environment,
//!   context and extra fields of a record against allow or deny rules.
//! - A [`SlackHandler`] tying formatter, filters and a [`WebhookClient`] together.
//! - A [`SlackLayer`] feeding `tracing` events to the handler, and a central
//!   [`build_slack_layer`] function constructing it from a [`SlackLoggerConfig`].
//!
//! Records carry per-event attributes through `tracing` fields, either on the event itself or on
//! an enclosing span:
//!
//! | Field                        | Meaning                                              |
//! |------------------------------|------------------------------------------------------|
//! | `service`, `environment`     | Override the configured service or environment.      |
//! | `extra_fields.<key>`         | Additional field rendered below the message.         |
//! | `filter.service`, `filter.environment`, `filter.context`, `filter.extra_fields.<key>` | Values filters are evaluated against. |
//! | `exception`                  | Error details rendered in a code block.              |

mod blocks;
mod client;
mod config;
mod design;
mod filter;
mod formatter;
mod handler;
mod layer;
mod record;
mod storage;

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::{FilterExt, filter_fn},
};

#[cfg(feature = "http-client")]
pub use self::client::HttpWebhookClient;
pub use self::{
    blocks::{Block, TextObject, WebhookPayload},
    client::{DummyClient, WebhookClient, WebhookResponse},
    config::{FilterConfig, FilterType, FormatConfig, LogConfig, default_emojis},
    design::MessageDesign,
    filter::SlackFilter,
    formatter::SlackFormatter,
    handler::{DEFAULT_DISPATCH_TIMEOUT, ErrorHook, FilterId, SlackHandler},
    layer::SlackLayer,
    record::{LogRecord, RecordAttributes, Severity},
};

mod keys {
    pub(crate) const MESSAGE: &str = "message";
    pub(crate) const ENVIRONMENT: &str = "environment";
    pub(crate) const SERVICE: &str = "service";
    pub(crate) const EXCEPTION: &str = "exception";
    pub(crate) const EXTRA_FIELDS_PREFIX: &str = "extra_fields.";

    pub(crate) const FILTER_SERVICE: &str = "filter.service";
    pub(crate) const FILTER_ENVIRONMENT: &str = "filter.environment";
    pub(crate) const FILTER_CONTEXT: &str = "filter.context";
    pub(crate) const FILTER_EXTRA_FIELDS_PREFIX: &str = "filter.extra_fields.";
}

/// Errors that can occur within the logger.
#[derive(Debug, thiserror::Error)]
pub enum SlackLoggerError {
    /// The webhook answered with anything other than `200 ok`.
    #[error("Webhook rejected the message with status {status}: {body}")]
    Dispatch {
        /// HTTP status code of the response.
        status: u16,

        /// Response body.
        body: String,
    },

    /// A filter was configured with an invalid regular expression.
    #[error("Invalid filter pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,

        /// Why the pattern was rejected.
        #[source]
        source: regex::Error,
    },

    /// Represents an error in configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Represents an error during JSON serialization.
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// The HTTP request to the webhook failed.
    #[cfg(feature = "http-client")]
    #[error("Failed to send webhook request: {0}")]
    Transport(#[from] reqwest::Error),

    /// The runtime dispatching webhook requests could not be started.
    #[error("Failed to start dispatch runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// The webhook did not answer in time.
    #[error("Webhook did not answer within {0:?}")]
    DispatchTimeout(Duration),

    /// The dispatch task ended without producing a response.
    #[error("Webhook dispatch was aborted")]
    DispatchAborted,

    /// Represents an error due to an invalid filtering directive.
    #[error("Failed to parse filtering directive: {0}")]
    InvalidFilteringDirective(#[from] tracing_subscriber::filter::ParseError),

    /// The webhook URL could not be parsed.
    #[error("Invalid webhook URL: {0}")]
    InvalidWebhookUrl(#[from] url::ParseError),
}

/// Broad classes of [`SlackLoggerError`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The message could not be delivered.
    Dispatch,

    /// The logger was set up with invalid values.
    Configuration,

    /// Anything else.
    Unexpected,
}

impl SlackLoggerError {
    /// Returns the class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Dispatch { .. } | Self::DispatchTimeout(_) | Self::DispatchAborted => {
                ErrorKind::Dispatch
            }
            #[cfg(feature = "http-client")]
            Self::Transport(_) => ErrorKind::Dispatch,
            Self::InvalidPattern { .. }
            | Self::Configuration(_)
            | Self::InvalidFilteringDirective(_)
            | Self::InvalidWebhookUrl(_) => ErrorKind::Configuration,
            Self::JsonSerialization(_) | Self::Runtime(_) => ErrorKind::Unexpected,
        }
    }
}

/// Which [`MessageDesign`] a [`SlackLoggerConfig`] installs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignKind {
    /// No formatter: records are sent as bare text.
    Text,

    /// [`MessageDesign::Plain`].
    Plain,

    /// [`MessageDesign::Minimal`].
    Minimal,

    /// [`MessageDesign::Rich`].
    #[default]
    Rich,
}

fn default_dispatch_timeout_secs() -> u64 {
    DEFAULT_DISPATCH_TIMEOUT.as_secs()
}

/// Comprehensive configuration for sending logs to Slack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackLoggerConfig {
    /// The incoming webhook URL.
    pub webhook_url: String,

    /// Minimum severity of records to send.
    #[serde(default)]
    pub level: Severity,

    /// How messages are rendered.
    #[serde(default)]
    pub design: DesignKind,

    /// Service identity used by the design and as the static side of filtering.
    ///
    /// With [`DesignKind::Plain`] it is only used for filtering; with [`DesignKind::Text`] it is
    /// ignored.
    #[serde(default)]
    pub format_config: Option<FormatConfig>,

    /// Configuration laid over the format configuration when filtering.
    #[serde(default)]
    pub handler_config: LogConfig,

    /// Filters every record must pass.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,

    /// How long logging waits for the webhook, in seconds.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// An [`EnvFilter`] directive (e.g., `"warn,my_crate=info"`) selecting which events reach the
    /// layer. If `None`, only the `level` threshold applies.
    #[serde(default)]
    pub filtering_directive: Option<String>,
}

impl SlackLoggerConfig {
    /// Creates a configuration for `webhook_url` with default values for everything else.
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            level: Severity::NOTSET,
            design: DesignKind::default(),
            format_config: None,
            handler_config: LogConfig::default(),
            filters: Vec::new(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            filtering_directive: None,
        }
    }

    /// Returns the dispatch timeout.
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    fn formatter(&self) -> Option<SlackFormatter> {
        let format_config = self.format_config.clone();
        match self.design {
            DesignKind::Text => None,
            DesignKind::Plain => Some(match format_config {
                Some(format_config) => SlackFormatter::plain().with_config(format_config),
                None => SlackFormatter::plain(),
            }),
            DesignKind::Minimal => Some(SlackFormatter::minimal(
                format_config.unwrap_or_default(),
            )),
            DesignKind::Rich => Some(SlackFormatter::rich(format_config.unwrap_or_default())),
        }
    }
}

/// Holds the constructed layer and the handler it feeds.
#[allow(missing_debug_implementations)] // The layer is a `dyn Trait` object
pub struct SlackLoggingComponents {
    /// The layer sending events to Slack, filtered by the configured level and directive.
    ///
    /// Spans are never filtered out, so their fields reach the events inside them.
    pub layer: Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync + 'static>,

    /// The handler behind the layer, for adjusting filters and formatter at runtime.
    pub handler: Arc<SlackHandler>,
}

/// Constructs the Slack logging components based on the provided [`SlackLoggerConfig`].
///
/// The returned layer can be combined with a [`tracing_subscriber::Registry`] and other layers
/// before initializing the global `tracing` subscriber.
///
/// # Errors
///
/// Returns [`SlackLoggerError`] if the webhook URL, a filter pattern or the filtering directive
/// is invalid, or if the HTTP client or dispatch runtime cannot be created.
#[cfg(feature = "http-client")]
pub fn build_slack_layer(
    config: SlackLoggerConfig,
) -> Result<SlackLoggingComponents, SlackLoggerError> {
    let client = HttpWebhookClient::new(&config.webhook_url, config.dispatch_timeout())?;
    build_slack_layer_with_client(config, client)
}

/// Like [`build_slack_layer`], but sending through `client` instead of the configured webhook.
///
/// # Example
///
/// ```
/// use slack_logger::{
///     DesignKind, DummyClient, LogConfig, Severity, SlackLoggerConfig,
///     build_slack_layer_with_client,
/// };
/// use tracing_subscriber::layer::SubscriberExt;
///
/// let config = SlackLoggerConfig {
///     level: Severity::WARNING,
///     design: DesignKind::Minimal,
///     format_config: Some(LogConfig::default().with_service("billing").into()),
///     ..SlackLoggerConfig::new("https://hooks.slack.com/services/T000/B000/XXXX")
/// };
///
/// let client = DummyClient::new();
/// let components = build_slack_layer_with_client(config, client.clone())?;
/// let subscriber = tracing_subscriber::registry().with(components.layer);
///
/// tracing::subscriber::with_default(subscriber, || {
///     tracing::info!("Not important enough");
///     tracing::warn!("Disk almost full");
/// });
///
/// assert_eq!(client.sent().len(), 1);
/// # Ok::<(), slack_logger::SlackLoggerError>(())
/// ```
///
/// # Errors
///
/// Returns [`SlackLoggerError`] if a filter pattern or the filtering directive is invalid, or if
/// the dispatch runtime cannot be created.
pub fn build_slack_layer_with_client(
    config: SlackLoggerConfig,
    client: impl WebhookClient + 'static,
) -> Result<SlackLoggingComponents, SlackLoggerError> {
    let filters = config
        .filters
        .iter()
        .cloned()
        .map(SlackFilter::new)
        .collect::<Vec<_>>();
    filters.iter().try_for_each(SlackFilter::validate)?;

    // Using an empty string causes it to use the default directive
    let filtering_directive = config.filtering_directive.as_deref().unwrap_or_default();
    let event_filter = EnvFilter::builder()
        .with_default_directive(config.level.level_filter().into())
        .parse(filtering_directive)?;
    // Spans below the threshold still carry fields for the events inside them
    let filter = event_filter.or(filter_fn(|metadata| metadata.is_span()));

    let mut handler = SlackHandler::new(client)?
        .with_level(config.level)
        .with_config(config.handler_config.clone())
        .with_dispatch_timeout(config.dispatch_timeout());
    handler.set_formatter(config.formatter());
    for slack_filter in filters {
        handler = handler.with_filter(slack_filter);
    }

    tracing::debug!(
        design = ?config.design,
        level = %config.level,
        filtering_directive,
        "Built Slack logging layer"
    );

    let handler = Arc::new(handler);
    let layer = SlackLayer::from_shared(Arc::clone(&handler))
        .with_filter(filter)
        .boxed();

    Ok(SlackLoggingComponents { layer, handler })
}
