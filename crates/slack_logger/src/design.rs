//! Message designs: strategies turning a [`LogRecord`] into an ordered list of [`Block`]s.

use indexmap::IndexMap;

use crate::{Block, FormatConfig, LogRecord, TextObject};

/// Text standing in for an unresolved environment or service in the context line.
const MISSING_VALUE: &str = "None";

/// The verbosity level of rendered messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageDesign {
    /// A single section holding the message as plain text.
    Plain,

    /// A header with severity and service, followed by the message.
    Minimal(FormatConfig),

    /// Header, context line, message, error details and extra fields.
    Rich(FormatConfig),
}

impl MessageDesign {
    /// Returns the format configuration used by this design, if any.
    pub fn config(&self) -> Option<&FormatConfig> {
        match self {
            Self::Plain => None,
            Self::Minimal(config) | Self::Rich(config) => Some(config),
        }
    }

    /// Renders `record` into blocks. `None` entries stand for optional blocks that were skipped.
    pub fn format_blocks(&self, record: &LogRecord) -> Vec<Option<Block>> {
        match self {
            Self::Plain => vec![Some(Block::section(TextObject::plain(
                record.message.as_str(),
            )))],
            Self::Minimal(config) => vec![
                Some(header(config, record)),
                Some(Block::section(TextObject::markdown(record.message.as_str()))),
            ],
            Self::Rich(config) => {
                let environment = resolve_environment(config, record);
                let service = resolve_service(config, record);

                let error = record
                    .exception
                    .as_ref()
                    .map(|exception| Block::section(TextObject::markdown(format!("```{exception}```"))));

                vec![
                    Some(header(config, record)),
                    context(config, environment, service),
                    Some(Block::Divider),
                    Some(Block::section(TextObject::markdown(record.message.as_str()))),
                    error,
                    Some(Block::Divider),
                    fields(config, record),
                ]
            }
        }
    }

    /// Renders `record` into the blocks that remain once skipped entries are dropped.
    pub fn blocks(&self, record: &LogRecord) -> Vec<Block> {
        let maybe_blocks = self.format_blocks(record);
        tracing::trace!(?maybe_blocks, "Rendered message blocks");
        maybe_blocks.into_iter().flatten().collect()
    }

    /// Renders `record` into a JSON array of blocks.
    pub fn format(&self, record: &LogRecord) -> Result<String, serde_json::Error> {
        let serialized = serde_json::to_string(&self.blocks(record))?;
        tracing::debug!(blocks = %serialized, "Serialized message blocks");
        Ok(serialized)
    }
}

/// Resolves the environment of a record: the dynamic attribute first, then the configuration.
pub(crate) fn resolve_environment<'a>(
    config: &'a FormatConfig,
    record: &'a LogRecord,
) -> Option<&'a str> {
    record
        .attributes
        .environment
        .as_deref()
        .or(config.log.environment.as_deref())
}

/// Resolves the service of a record: the dynamic attribute first, then the configuration.
pub(crate) fn resolve_service<'a>(
    config: &'a FormatConfig,
    record: &'a LogRecord,
) -> Option<&'a str> {
    record
        .attributes
        .service
        .as_deref()
        .or(config.log.service.as_deref())
}

/// `[icon ]LEVEL | service`, falling back to the logger name if no service is known.
fn header(config: &FormatConfig, record: &LogRecord) -> Block {
    let source = resolve_service(config, record).unwrap_or(record.logger.as_str());
    let level = record.severity.name();

    let text = match config.emoji(record.severity) {
        Some(icon) => format!("{icon} {level} | {source}"),
        None => format!("{level} | {source}"),
    };
    Block::header(text)
}

fn context(
    config: &FormatConfig,
    environment: Option<&str>,
    service: Option<&str>,
) -> Option<Block> {
    if !config.log.context.is_empty() {
        return Some(Block::context(config.log.context.join(", ")));
    }

    match (environment, service) {
        (Some(environment), Some(service)) => {
            Some(Block::context(format!(":point_right: {environment}, {service}")))
        }
        // Names the missing value, not the resolved one.
        (Some(_), None) | (None, Some(_)) => {
            Some(Block::context(format!(":point_right: {MISSING_VALUE}")))
        }
        (None, None) => None,
    }
}

fn fields(config: &FormatConfig, record: &LogRecord) -> Option<Block> {
    let mut all_fields: IndexMap<&str, &str> = config
        .log
        .extra_fields
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    all_fields.extend(
        record
            .attributes
            .extra_fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    );

    if all_fields.is_empty() {
        return None;
    }

    Some(Block::fields(
        all_fields
            .into_iter()
            .map(|(key, value)| TextObject::markdown(format!("*{key}*\n{value}")))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use super::*;
    use crate::{LogConfig, Severity};

    fn service_config() -> FormatConfig {
        LogConfig::default()
            .with_service("testrunner")
            .with_environment("test")
            .with_extra_field("foo", "bar")
            .with_extra_field("raven", "caw")
            .into()
    }

    #[test]
    fn plain_design_is_a_single_plain_section() {
        let record = LogRecord::new(Severity::WARNING, "tests", "plain warning");
        assert_eq!(
            MessageDesign::Plain.format(&record).unwrap(),
            r#"[{"type":"section","text":{"type":"plain_text","text":"plain warning"}}]"#
        );
    }

    #[test]
    fn minimal_design_uses_configured_service() {
        let config: FormatConfig = LogConfig::default().with_service("testrunner").into();
        let record = LogRecord::new(Severity::WARNING, "tests", "oO warning");

        assert_eq!(
            MessageDesign::Minimal(config).format(&record).unwrap(),
            r#"[{"type":"header","text":{"type":"plain_text","text":":warning: WARNING | testrunner"}},{"type":"section","text":{"type":"mrkdwn","text":"oO warning"}}]"#
        );
    }

    #[test]
    fn header_prefers_dynamic_service_then_logger_name() {
        let record = LogRecord::new(Severity::ERROR, "tests::module", "boom");

        let design = MessageDesign::Minimal(FormatConfig::default());
        assert_eq!(
            design.blocks(&record)[0],
            Block::header(":x: ERROR | tests::module")
        );

        let design = MessageDesign::Minimal(LogConfig::default().with_service("static").into());
        let dynamic = record.clone().with_service("dynamic");
        assert_eq!(
            design.blocks(&dynamic)[0],
            Block::header(":x: ERROR | dynamic")
        );
        assert_eq!(design.blocks(&record)[0], Block::header(":x: ERROR | static"));
    }

    #[test]
    fn header_without_icon() {
        let config = FormatConfig {
            log: LogConfig::default().with_service("api"),
            emojis: Default::default(),
        };
        let record = LogRecord::new(Severity::INFO, "tests", "hello");
        assert_eq!(
            MessageDesign::Minimal(config).blocks(&record)[0],
            Block::header("INFO | api")
        );
    }

    #[test]
    fn rich_design_full_layout() {
        let record = LogRecord::new(Severity::WARNING, "tests", "default warning");
        let blocks = MessageDesign::Rich(service_config()).blocks(&record);

        assert_eq!(
            blocks,
            vec![
                Block::header(":warning: WARNING | testrunner"),
                Block::context(":point_right: test, testrunner"),
                Block::Divider,
                Block::section(TextObject::markdown("default warning")),
                Block::Divider,
                Block::fields(vec![
                    TextObject::markdown("*foo*\nbar"),
                    TextObject::markdown("*raven*\ncaw"),
                ]),
            ]
        );
    }

    #[test]
    fn rich_design_without_optional_blocks_round_trips() {
        let record = LogRecord::new(Severity::ERROR, "tests", "bare");
        let serialized = MessageDesign::Rich(FormatConfig::default())
            .format(&record)
            .unwrap();

        let parsed: Vec<Block> = serde_json::from_str(&serialized).unwrap();
        let kinds: Vec<&str> = parsed.iter().map(Block::kind).collect();
        assert_eq!(kinds, ["header", "divider", "section", "divider"]);
    }

    #[test]
    fn rich_design_renders_exception_in_code_fence() {
        let record = LogRecord::new(Severity::ERROR, "tests", "Error!")
            .with_exception("attempt to divide by zero");
        let blocks = MessageDesign::Rich(service_config()).blocks(&record);

        assert_eq!(
            blocks[4],
            Block::section(TextObject::markdown("```attempt to divide by zero```"))
        );
        assert_eq!(blocks.len(), 7);
    }

    #[test]
    fn dynamic_extra_fields_extend_and_overwrite() {
        let design = MessageDesign::Rich(service_config());

        let added = LogRecord::new(Severity::WARNING, "tests", "additional")
            .with_extra_field("cow", "moo");
        assert_eq!(
            design.blocks(&added).last(),
            Some(&Block::fields(vec![
                TextObject::markdown("*foo*\nbar"),
                TextObject::markdown("*raven*\ncaw"),
                TextObject::markdown("*cow*\nmoo"),
            ]))
        );

        let overwritten = LogRecord::new(Severity::ERROR, "tests", "overwrite")
            .with_extra_field("foo", "baba");
        assert_eq!(
            design.blocks(&overwritten).last(),
            Some(&Block::fields(vec![
                TextObject::markdown("*foo*\nbaba"),
                TextObject::markdown("*raven*\ncaw"),
            ]))
        );
    }

    #[test]
    fn context_list_takes_precedence() {
        let config: FormatConfig = LogConfig::default()
            .with_service("api")
            .with_environment("prod")
            .with_context("eu-west")
            .with_context("canary")
            .into();
        let record = LogRecord::new(Severity::INFO, "tests", "hello");

        assert_eq!(
            MessageDesign::Rich(config).blocks(&record)[1],
            Block::context("eu-west, canary")
        );
    }

    #[test]
    fn context_line_names_the_missing_value() {
        let only_service: FormatConfig = LogConfig::default().with_service("api").into();
        let record = LogRecord::new(Severity::INFO, "tests", "hello");
        assert_eq!(
            MessageDesign::Rich(only_service).blocks(&record)[1],
            Block::context(":point_right: None")
        );

        let only_environment: FormatConfig = LogConfig::default().with_environment("prod").into();
        assert_eq!(
            MessageDesign::Rich(only_environment).blocks(&record)[1],
            Block::context(":point_right: None")
        );
    }

    #[test]
    fn dynamic_environment_completes_the_context_line() {
        let config: FormatConfig = LogConfig::default().with_service("api").into();
        let record = LogRecord::new(Severity::INFO, "tests", "hello").with_environment("staging");
        assert_eq!(
            MessageDesign::Rich(config).blocks(&record)[1],
            Block::context(":point_right: staging, api")
        );
    }
}
