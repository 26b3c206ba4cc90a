//! Provides [`SlackFormatter`], which renders log records through a [`MessageDesign`].

use crate::{Block, FormatConfig, LogRecord, MessageDesign, SlackLoggerError};

/// Renders log records into Slack block documents.
///
/// Besides rendering, the formatter carries the [`FormatConfig`] describing the service, which
/// the [`SlackHandler`][crate::SlackHandler] reuses as the static side of the configuration
/// that filters are evaluated against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackFormatter {
    design: MessageDesign,
    config: Option<FormatConfig>,
}

impl SlackFormatter {
    /// Creates a formatter from a design, keeping the design's configuration (if any).
    pub fn new(design: MessageDesign) -> Self {
        let config = design.config().cloned();
        Self { design, config }
    }

    /// A formatter that renders the bare message into a single plain text section.
    pub fn plain() -> Self {
        Self::new(MessageDesign::Plain)
    }

    /// A formatter rendering a header and the message.
    pub fn minimal(config: FormatConfig) -> Self {
        Self::new(MessageDesign::Minimal(config))
    }

    /// The default formatter, rendering the rich layout with context, errors and extra fields.
    #[doc(alias = "default")]
    pub fn rich(config: FormatConfig) -> Self {
        Self::new(MessageDesign::Rich(config))
    }

    /// Replaces the configuration handed to filters, without changing how messages look.
    ///
    /// This is mostly useful with [`SlackFormatter::plain`], which has no configuration of its
    /// own.
    pub fn with_config(mut self, config: FormatConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Returns the design used for rendering.
    pub fn design(&self) -> &MessageDesign {
        &self.design
    }

    /// Returns the configuration describing the service, if any.
    pub fn config(&self) -> Option<&FormatConfig> {
        self.config.as_ref()
    }

    /// Renders `record` into its blocks.
    pub fn format_blocks(&self, record: &LogRecord) -> Vec<Block> {
        self.design.blocks(record)
    }

    /// Renders `record` into a JSON array of blocks.
    ///
    /// # Errors
    ///
    /// Returns [`SlackLoggerError::JsonSerialization`] if the blocks cannot be serialized.
    pub fn format(&self, record: &LogRecord) -> Result<String, SlackLoggerError> {
        Ok(self.design.format(record)?)
    }
}
