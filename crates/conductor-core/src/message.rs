use crate::tool::{ToolCallRequest, ToolCallResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of the participant that authored a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user, or tool results fed back on the user's side.
    User,
    /// The model.
    Assistant,
}

/// One structured block inside a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Narrative text.
    Text {
        /// The text itself.
        text: String,
    },
    /// A model request to invoke a tool.
    ToolUse {
        /// Call identifier assigned by the model.
        id: String,
        /// Namespaced wire name of the tool.
        name: String,
        /// JSON arguments.
        input: serde_json::Value,
    },
    /// The outcome of a tool call, fed back to the model.
    ToolResult {
        /// Identifier of the `ToolUse` block this answers.
        tool_use_id: String,
        /// Textual output or error message.
        content: String,
        /// Whether the call failed.
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    /// Creates a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

impl From<ToolCallResult> for ContentBlock {
    fn from(result: ToolCallResult) -> Self {
        Self::ToolResult {
            tool_use_id: result.tool_use_id,
            content: result.content,
            is_error: result.is_error,
        }
    }
}

/// Turn content: plain text or a list of structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    /// A plain string.
    Text(String),
    /// Structured blocks (assistant tool rounds, tool results).
    Blocks(Vec<ContentBlock>),
}

/// A single turn of the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who authored the turn.
    pub role: Role,
    /// Text or blocks.
    pub content: TurnContent,
    /// UTC timestamp of when the turn was created.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Creates a new turn stamped with the current time.
    pub fn new(role: Role, content: TurnContent) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Creates a plain-text [`Role::User`] turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, TurnContent::Text(text.into()))
    }

    /// Creates a plain-text [`Role::Assistant`] turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, TurnContent::Text(text.into()))
    }

    /// Creates an assistant turn holding the raw blocks returned by the model.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::Assistant, TurnContent::Blocks(blocks))
    }

    /// Creates the user turn that carries a round's tool results.
    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        let blocks = results.into_iter().map(ContentBlock::from).collect();
        Self::new(Role::User, TurnContent::Blocks(blocks))
    }

    /// The first text in this turn, if any.
    pub fn first_text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(text) => Some(text),
            TurnContent::Blocks(blocks) => blocks.iter().find_map(ContentBlock::as_text),
        }
    }

    /// Every tool-use block in this turn, in order.
    pub fn tool_requests(&self) -> Vec<ToolCallRequest> {
        match &self.content {
            TurnContent::Text(_) => Vec::new(),
            TurnContent::Blocks(blocks) => tool_requests(blocks),
        }
    }
}

/// Extracts every tool-use block from `blocks`, preserving order.
pub fn tool_requests(blocks: &[ContentBlock]) -> Vec<ToolCallRequest> {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some(ToolCallRequest {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            _ => None,
        })
        .collect()
}
