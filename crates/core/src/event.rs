//! Events streamed to the client for one chat request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a run ended. Carried by the terminal [`StreamEvent::Done`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// The model produced a final answer.
    Stop,
    /// A gated tool call is waiting on the user.
    AwaitingApproval,
    /// The per-request step budget ran out.
    StepBudget,
    /// The wall-clock ceiling was hit.
    Timeout,
    /// The client went away.
    Cancelled,
    /// The model provider failed.
    Error,
}

/// One server-sent event. Serialized as a JSON object tagged by `type`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    Start { message_id: String },

    TextDelta { text: String },

    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },

    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable { tool_call_id: String, output: Value },

    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },

    #[serde(rename_all = "camelCase")]
    Error { error_text: String },

    #[serde(rename_all = "camelCase")]
    Done { finish_reason: FinishReason },
}

impl StreamEvent {
    /// The tool call this event resolves, if it carries a tool result.
    pub fn resolved_tool_call(&self) -> Option<&str> {
        match self {
            StreamEvent::ToolOutputAvailable { tool_call_id, .. }
            | StreamEvent::ToolOutputError { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = StreamEvent::ToolOutputAvailable {
            tool_call_id: "call_1".into(),
            output: json!({"ok": true}),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "tool-output-available", "toolCallId": "call_1", "output": {"ok": true}})
        );

        let done = StreamEvent::Done {
            finish_reason: FinishReason::AwaitingApproval,
        };
        assert_eq!(
            serde_json::to_value(&done).unwrap(),
            json!({"type": "done", "finishReason": "awaiting-approval"})
        );

        let delta = StreamEvent::TextDelta { text: "hi".into() };
        assert_eq!(
            serde_json::to_value(&delta).unwrap(),
            json!({"type": "text-delta", "text": "hi"})
        );
    }

    #[test]
    fn test_resolved_tool_call() {
        let err = StreamEvent::ToolOutputError {
            tool_call_id: "c".into(),
            error_text: "boom".into(),
        };
        assert_eq!(err.resolved_tool_call(), Some("c"));
        assert_eq!(StreamEvent::TextDelta { text: "x".into() }.resolved_tool_call(), None);
        assert!(StreamEvent::Done { finish_reason: FinishReason::Stop }.is_done());
    }
}
