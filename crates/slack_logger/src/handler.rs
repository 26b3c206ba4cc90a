//! Provides [`SlackHandler`], which filters, formats and dispatches log records.

use std::{
    cell::Cell,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    time::Duration,
};

use parking_lot::RwLock;
use tokio::runtime::Runtime;

use crate::{
    DummyClient, LogConfig, LogRecord, Severity, SlackFilter, SlackFormatter, SlackLoggerError, WebhookClient,
    WebhookPayload, WebhookResponse,
};

/// How long [`SlackHandler::emit`] waits for the webhook by default.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

const DISPATCH_THREAD_NAME: &str = "slack-logger-dispatch";

thread_local! {
    static DISPATCH_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Returns `true` when called from one of the threads delivering webhook requests.
pub(crate) fn on_dispatch_thread() -> bool {
    DISPATCH_THREAD.with(Cell::get)
}

/// Callback receiving every error that prevented a record from being delivered.
pub type ErrorHook = Arc<dyn Fn(&SlackLoggerError, &LogRecord) + Send + Sync>;

/// Identifies a filter attached to a [`SlackHandler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterId(u64);

/// Sends log records to a chat webhook.
///
/// For each record, [`SlackHandler::handle`] checks the severity threshold, evaluates all
/// attached filters against the record's effective configuration and, if the record passes,
/// renders and sends it through [`SlackHandler::emit`]. Sending blocks the calling thread for at
/// most the dispatch timeout; the request itself runs on a small runtime owned by the handler.
///
/// Delivery failures never reach the caller: they are logged and passed to the error hook,
/// which reports them on stderr by default.
pub struct SlackHandler {
    client: Arc<dyn WebhookClient>,
    level: Severity,
    config: LogConfig,
    formatter: RwLock<Option<SlackFormatter>>,
    filters: RwLock<Vec<(FilterId, SlackFilter)>>,
    next_filter_id: AtomicU64,
    dispatch_timeout: Duration,
    error_hook: ErrorHook,
    // Only `None` while dropping.
    runtime: Option<Runtime>,
}

impl SlackHandler {
    /// Creates a handler sending records through `client`.
    ///
    /// The handler starts without formatter (records are sent as bare text), without filters and
    /// with a [`Severity::NOTSET`] threshold.
    ///
    /// # Errors
    ///
    /// Returns [`SlackLoggerError::Runtime`] if the dispatch runtime cannot be started.
    pub fn new(client: impl WebhookClient + 'static) -> Result<Self, SlackLoggerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(DISPATCH_THREAD_NAME)
            .on_thread_start(|| DISPATCH_THREAD.with(|flag| flag.set(true)))
            .enable_all()
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            level: Severity::NOTSET,
            config: LogConfig::default(),
            formatter: RwLock::new(None),
            filters: RwLock::new(Vec::new()),
            next_filter_id: AtomicU64::new(0),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            error_hook: Arc::new(report_to_stderr),
            runtime: Some(runtime),
        })
    }

    /// Creates a handler posting to a Slack incoming webhook.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client or runtime cannot be built.
    #[cfg(feature = "http-client")]
    pub fn from_webhook(webhook_url: &str) -> Result<Self, SlackLoggerError> {
        let client = crate::HttpWebhookClient::new(webhook_url, DEFAULT_DISPATCH_TIMEOUT)?;
        Self::new(client)
    }

    /// Creates a handler keeping payloads in memory through a [`DummyClient`].
    ///
    /// Use [`SlackHandler::new`] with a cloned [`DummyClient`] to inspect what was sent.
    ///
    /// # Errors
    ///
    /// Returns [`SlackLoggerError::Runtime`] if the dispatch runtime cannot be started.
    pub fn dummy() -> Result<Self, SlackLoggerError> {
        Self::new(DummyClient::new())
    }

    /// Sets the minimum severity of records to send.
    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    /// Sets the handler's own configuration, laid over the formatter's when filtering.
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the formatter.
    pub fn with_formatter(self, formatter: SlackFormatter) -> Self {
        self.set_formatter(Some(formatter));
        self
    }

    /// Attaches a filter.
    pub fn with_filter(self, filter: SlackFilter) -> Self {
        self.add_filter(filter);
        self
    }

    /// Sets how long [`SlackHandler::emit`] waits for the webhook response.
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Replaces the callback receiving delivery errors.
    pub fn with_error_hook(
        mut self,
        hook: impl Fn(&SlackLoggerError, &LogRecord) + Send + Sync + 'static,
    ) -> Self {
        self.error_hook = Arc::new(hook);
        self
    }

    /// Returns the minimum severity of records to send.
    pub fn level(&self) -> Severity {
        self.level
    }

    /// Returns `true` if records of `severity` pass the threshold.
    pub fn is_enabled_for(&self, severity: Severity) -> bool {
        severity >= self.level
    }

    /// Replaces the formatter. With no formatter, records are sent as bare text.
    pub fn set_formatter(&self, formatter: Option<SlackFormatter>) {
        *self.formatter.write() = formatter;
    }

    /// Attaches a filter and returns its identifier.
    pub fn add_filter(&self, filter: SlackFilter) -> FilterId {
        let id = FilterId(self.next_filter_id.fetch_add(1, Ordering::Relaxed));
        self.filters.write().push((id, filter));
        id
    }

    /// Detaches a filter, returning it if it was attached.
    pub fn remove_filter(&self, id: FilterId) -> Option<SlackFilter> {
        let mut filters = self.filters.write();
        let position = filters.iter().position(|(filter_id, _)| *filter_id == id)?;
        Some(filters.remove(position).1)
    }

    /// Detaches all filters.
    pub fn clear_filters(&self) {
        self.filters.write().clear();
    }

    /// Returns the number of attached filters.
    pub fn filter_count(&self) -> usize {
        self.filters.read().len()
    }

    /// Computes the configuration filters are evaluated against for `record`.
    ///
    /// The handler's configuration is laid over the formatter's, and the record's `filter`
    /// attribute over the result. Returns `None` when there is neither a formatter configuration
    /// nor a `filter` attribute, in which case filters are not consulted.
    pub fn effective_config(&self, record: &LogRecord) -> Option<LogConfig> {
        let static_config = self
            .formatter
            .read()
            .as_ref()
            .and_then(SlackFormatter::config)
            .map(|format_config| format_config.log.overlay(&self.config));

        match (static_config, record.attributes.filter.as_ref()) {
            (Some(static_config), Some(dynamic)) => Some(static_config.overlay(dynamic)),
            (Some(static_config), None) => Some(static_config),
            (None, Some(dynamic)) => Some(dynamic.clone()),
            (None, None) => None,
        }
    }

    /// Runs `record` through the threshold and the filters and sends it if it passes.
    ///
    /// Returns `true` if the record was handed to [`SlackHandler::emit`]. A filter with an
    /// invalid pattern drops the record; every such error is reported.
    pub fn handle(&self, record: &LogRecord) -> bool {
        if !self.is_enabled_for(record.severity) {
            return false;
        }

        let mut passed = true;
        for verdict in self.filter_verdicts(record) {
            match verdict {
                Ok(matched) => passed &= matched,
                Err(error) => {
                    self.report(&error, record);
                    passed = false;
                }
            }
        }
        if !passed {
            tracing::debug!(logger = %record.logger, "Record dropped by filters");
            return false;
        }

        self.emit(record);
        true
    }

    /// Formats and sends `record`, reporting any failure instead of returning it.
    pub fn emit(&self, record: &LogRecord) {
        if let Err(error) = self.try_emit(record) {
            self.report(&error, record);
        }
    }

    /// Formats and sends `record`.
    ///
    /// # Errors
    ///
    /// Returns [`SlackLoggerError::Dispatch`] if the webhook did not accept the message, or any
    /// error raised while sending it.
    pub fn try_emit(&self, record: &LogRecord) -> Result<WebhookResponse, SlackLoggerError> {
        let payload = match self.formatter.read().as_ref() {
            Some(formatter) => WebhookPayload::blocks(formatter.format_blocks(record)),
            None => WebhookPayload::text(record.text()),
        };
        let serialized = payload.to_json()?;
        tracing::debug!(payload = %serialized, "Serialized webhook payload");

        self.dispatch(payload)
    }

    /// Evaluates every filter against the effective configuration of `record`.
    ///
    /// Empty when there are no filters or nothing to compare them with. The filter lock is
    /// released before returning.
    fn filter_verdicts(&self, record: &LogRecord) -> Vec<Result<bool, SlackLoggerError>> {
        let filters = self.filters.read();
        if filters.is_empty() {
            return Vec::new();
        }
        let Some(effective) = self.effective_config(record) else {
            return Vec::new();
        };

        filters
            .iter()
            .map(|(_, filter)| filter.matches(&effective))
            .collect()
    }

    /// Sends `payload` on the dispatch runtime and waits for the response.
    fn dispatch(&self, payload: WebhookPayload) -> Result<WebhookResponse, SlackLoggerError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or(SlackLoggerError::DispatchAborted)?;

        let client = Arc::clone(&self.client);
        let (sender, receiver) = mpsc::sync_channel(1);
        let task = runtime.spawn(async move {
            let result = client.send(&payload).await;
            // The receiver is gone if the caller stopped waiting.
            let _ = sender.send(result);
        });

        let response = match receiver.recv_timeout(self.dispatch_timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                // A reported timeout must not be followed by a delivery.
                task.abort();
                return Err(SlackLoggerError::DispatchTimeout(self.dispatch_timeout));
            }
            Err(RecvTimeoutError::Disconnected) => return Err(SlackLoggerError::DispatchAborted),
        };

        if !response.is_success() {
            return Err(SlackLoggerError::Dispatch {
                status: response.status,
                body: response.body,
            });
        }

        tracing::debug!(status = response.status, "Webhook accepted the message");
        Ok(response)
    }

    fn report(&self, error: &SlackLoggerError, record: &LogRecord) {
        tracing::error!(
            error = %error,
            kind = ?error.kind(),
            logger = %record.logger,
            "Failed to deliver log record"
        );
        (self.error_hook)(error, record);
    }
}

impl fmt::Debug for SlackHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackHandler")
            .field("level", &self.level)
            .field("config", &self.config)
            .field("formatter", &*self.formatter.read())
            .field("filters", &self.filter_count())
            .field("dispatch_timeout", &self.dispatch_timeout)
            .finish_non_exhaustive()
    }
}

impl Drop for SlackHandler {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which panics inside async contexts.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn report_to_stderr(error: &SlackLoggerError, record: &LogRecord) {
    #[allow(clippy::print_stderr)]
    {
        eprintln!(
            "[ERROR] {}: Failed to deliver log record from `{}`: {error}",
            env!("CARGO_PKG_NAME"),
            record.logger
        );
    }
}
