//! Provides a [`tracing_subscriber::Layer`] ([`SlackLayer`]) sending events to Slack.

use std::sync::Arc;

use tracing::{
    Event, Id, Subscriber,
    span::{Attributes, Record},
};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

use crate::{Severity, SlackHandler, handler::on_dispatch_thread, storage::Storage};

/// Events of this crate are never forwarded to the handler.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// A [`tracing_subscriber::Layer`] turning events into [`LogRecord`][crate::LogRecord]s and
/// passing them to a [`SlackHandler`].
///
/// Span fields are stored in the span's extensions and inherited by child spans and events, so
/// `service`, `environment`, `extra_fields.*` and `filter.*` fields can be set once on an
/// enclosing span.
#[derive(Clone, Debug)]
pub struct SlackLayer {
    handler: Arc<SlackHandler>,
}

impl SlackLayer {
    /// Creates a layer owning `handler`.
    pub fn new(handler: SlackHandler) -> Self {
        Self::from_shared(Arc::new(handler))
    }

    /// Creates a layer sharing `handler`, e.g. to add filters after the subscriber is installed.
    pub fn from_shared(handler: Arc<SlackHandler>) -> Self {
        Self { handler }
    }

    /// Returns the handler records are passed to.
    pub fn handler(&self) -> &Arc<SlackHandler> {
        &self.handler
    }
}

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(OWN_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for SlackLayer {
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        #[allow(clippy::expect_used)]
        let span = ctx
            .span(id)
            .expect("span with specified id does not exist in `on_new_span()`");

        // Inherit storage from parent span if it exists, otherwise create a new one.
        let mut storage = span
            .parent()
            .and_then(|parent| parent.extensions().get::<Storage>().cloned())
            .unwrap_or_default();

        attrs.record(&mut storage);
        span.extensions_mut().insert(storage);
    }

    fn on_record(&self, span_id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        #[allow(clippy::expect_used)]
        let span = ctx
            .span(span_id)
            .expect("span with specified id does not exist in `on_record()`");
        let mut extensions = span.extensions_mut();

        if let Some(storage) = extensions.get_mut::<Storage>() {
            values.record(storage);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_own_target(metadata.target()) || on_dispatch_thread() {
            return;
        }

        let severity = Severity::from(metadata.level());
        if !self.handler.is_enabled_for(severity) {
            return;
        }

        let mut storage = match ctx.event_span(event) {
            Some(span) => Storage::for_event(span.extensions().get::<Storage>()),
            None => Storage::default(),
        };
        event.record(&mut storage);

        self.handler
            .handle(&storage.into_record(severity, metadata.target()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_own_target() {
        assert!(is_own_target("slack_logger"));
        assert!(is_own_target("slack_logger::handler"));
        assert!(!is_own_target("slack_logger_demo"));
        assert!(!is_own_target("app::slack_logger"));
    }
}
