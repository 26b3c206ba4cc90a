//! The structured chat document: Slack layout blocks and the webhook payload carrying them.
//!
//! Key order within serialized blocks is part of the output contract: the `type` tag always
//! comes first, followed by the block-specific keys in declaration order.

use serde::{Deserialize, Serialize};

/// A text element inside a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    /// Text shown verbatim.
    PlainText {
        /// The text.
        text: String,
    },

    /// Text rendered with Slack's markdown dialect.
    Mrkdwn {
        /// The text.
        text: String,
    },
}

impl TextObject {
    /// Creates a plain text object.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    /// Creates a markdown text object.
    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    /// Returns the text content.
    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text,
        }
    }
}

/// One unit of a structured chat document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Large bold heading.
    Header {
        /// Heading text, always plain text.
        text: TextObject,
    },

    /// Body text, or a two-column grid of fields.
    Section {
        /// Main text of the section.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,

        /// Fields laid out in columns.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<TextObject>>,
    },

    /// Small, muted line of contextual elements.
    Context {
        /// The elements of the line.
        elements: Vec<TextObject>,
    },

    /// Horizontal rule.
    Divider,
}

impl Block {
    /// Creates a header block.
    pub fn header(text: impl Into<String>) -> Self {
        Self::Header {
            text: TextObject::plain(text),
        }
    }

    /// Creates a section block with a single text.
    pub fn section(text: TextObject) -> Self {
        Self::Section {
            text: Some(text),
            fields: None,
        }
    }

    /// Creates a section block made of fields.
    pub fn fields(fields: Vec<TextObject>) -> Self {
        Self::Section {
            text: None,
            fields: Some(fields),
        }
    }

    /// Creates a context block with a single markdown element.
    pub fn context(text: impl Into<String>) -> Self {
        Self::Context {
            elements: vec![TextObject::markdown(text)],
        }
    }

    /// Returns the `type` tag of this block as it appears in the serialized document.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Header { .. } => "header",
            Self::Section { .. } => "section",
            Self::Context { .. } => "context",
            Self::Divider => "divider",
        }
    }
}

/// The body posted to an incoming webhook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    /// A structured message made of blocks.
    Blocks {
        /// The blocks, in display order.
        blocks: Vec<Block>,
    },

    /// A bare text message.
    Text {
        /// The message text.
        text: String,
    },
}

impl WebhookPayload {
    /// Creates a bare text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a structured payload.
    pub fn blocks(blocks: Vec<Block>) -> Self {
        Self::Blocks { blocks }
    }

    /// Serializes the payload into its compact JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
