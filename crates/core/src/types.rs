//! Conversation data model: messages, parts and tool lifecycle states.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Output recorded on a tool part the user declined. The model reads it on
/// its next step like any other tool result.
pub const DECLINED_OUTPUT: &str = "User declined to execute this tool.";

/// Message role in conversation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Lifecycle state of a tool part.
///
/// `input-streaming -> input-available -> (awaiting-approval -> approved | declined)
/// -> output-available | errored`. `approved` is transient: it is never
/// observable once reconciliation for a request has completed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    AwaitingApproval,
    Approved,
    Declined,
    OutputAvailable,
    Errored,
}

impl ToolState {
    /// Terminal states are never re-processed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ToolState::Declined | ToolState::OutputAvailable | ToolState::Errored
        )
    }
}

/// The user's answer to an approval prompt. Anything other than these two
/// values fails to deserialize.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    Declined,
}

/// One proposed tool invocation embedded in an assistant message.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolPart {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    pub state: ToolState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

impl ToolPart {
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
        state: ToolState,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
            state,
            output: None,
            error_text: None,
            decision: None,
        }
    }

    /// Record the user's decision on a part awaiting approval.
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }
}

/// A message part: either free text or a tool invocation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Tool(ToolPart),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn as_tool(&self) -> Option<&ToolPart> {
        match self {
            Part::Tool(part) => Some(part),
            Part::Text { .. } => None,
        }
    }
}

/// A single message in the conversation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    #[serde(default = "new_message_id")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Generate a fresh message id.
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: new_message_id(),
            role,
            parts,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    /// Empty assistant message with the given id.
    pub fn assistant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            parts: Vec::new(),
        }
    }

    /// Concatenated text of every text part.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::Tool(_) => None,
            })
            .collect()
    }

    pub fn tool_parts(&self) -> impl Iterator<Item = &ToolPart> {
        self.parts.iter().filter_map(Part::as_tool)
    }

    pub fn tool_part(&self, tool_call_id: &str) -> Option<&ToolPart> {
        self.tool_parts()
            .find(|part| part.tool_call_id == tool_call_id)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConversationError {
    #[error("conversation has no messages")]
    Empty,

    #[error("duplicate toolCallId in conversation: {0}")]
    DuplicateToolCallId(String),

    #[error("tool part {0} has an empty toolCallId or toolName")]
    IncompleteToolPart(String),
}

/// Check the invariants an inbound conversation must satisfy before any
/// stage touches it.
pub fn validate_conversation(messages: &[Message]) -> Result<(), ConversationError> {
    if messages.is_empty() {
        return Err(ConversationError::Empty);
    }

    let mut seen = HashSet::new();
    for part in messages.iter().flat_map(|m| m.tool_parts()) {
        if part.tool_call_id.trim().is_empty() || part.tool_name.trim().is_empty() {
            return Err(ConversationError::IncompleteToolPart(
                part.tool_call_id.clone(),
            ));
        }
        if !seen.insert(part.tool_call_id.as_str()) {
            return Err(ConversationError::DuplicateToolCallId(
                part.tool_call_id.clone(),
            ));
        }
    }
    Ok(())
}
