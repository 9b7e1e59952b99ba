//! Conversion from the conversation model to OpenAI chat-completions
//! messages.

use concierge_core::{Message, Part, Role, ToolPart, ToolState};
use serde_json::{json, Value};

/// The text the model reads back for a resolved tool part. `None` for parts
/// that are still unresolved; those are withheld from the model.
pub fn tool_result_text(part: &ToolPart) -> Option<String> {
    match part.state {
        ToolState::OutputAvailable | ToolState::Declined => Some(match &part.output {
            Some(Value::String(text)) => text.clone(),
            Some(value) => value.to_string(),
            None => String::new(),
        }),
        ToolState::Errored => Some(format!(
            "Error: {}",
            part.error_text.as_deref().unwrap_or("tool failed")
        )),
        _ => None,
    }
}

pub fn to_wire_messages(system_prompt: &str, messages: &[Message]) -> Vec<Value> {
    let mut wire = Vec::new();
    if !system_prompt.trim().is_empty() {
        wire.push(json!({"role": "system", "content": system_prompt}));
    }

    for message in messages {
        match message.role {
            Role::System => {
                let text = message.text();
                if !text.is_empty() {
                    wire.push(json!({"role": "system", "content": text}));
                }
            }
            Role::User => wire.push(json!({"role": "user", "content": message.text()})),
            Role::Assistant => push_assistant(message, &mut wire),
        }
    }
    wire
}

/// An assistant message that interleaves text and tool calls is split into
/// segments, each followed by its tool results, so every `tool_calls` entry
/// is answered before the next assistant turn.
fn push_assistant(message: &Message, wire: &mut Vec<Value>) {
    let mut text = String::new();
    let mut calls: Vec<&ToolPart> = Vec::new();

    for part in &message.parts {
        match part {
            Part::Text { text: chunk } => {
                if !calls.is_empty() {
                    flush_segment(&mut text, &mut calls, wire);
                }
                text.push_str(chunk);
            }
            Part::Tool(tool) => {
                if tool_result_text(tool).is_some() {
                    calls.push(tool);
                }
            }
        }
    }
    flush_segment(&mut text, &mut calls, wire);
}

fn flush_segment(text: &mut String, calls: &mut Vec<&ToolPart>, wire: &mut Vec<Value>) {
    if text.is_empty() && calls.is_empty() {
        return;
    }

    let content = if text.is_empty() {
        Value::Null
    } else {
        Value::String(std::mem::take(text))
    };
    let mut assistant = json!({"role": "assistant", "content": content});
    if !calls.is_empty() {
        assistant["tool_calls"] = calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.tool_call_id,
                    "type": "function",
                    "function": {
                        "name": call.tool_name,
                        "arguments": call.input.to_string(),
                    }
                })
            })
            .collect();
    }
    wire.push(assistant);

    for call in calls.drain(..) {
        wire.push(json!({
            "role": "tool",
            "tool_call_id": call.tool_call_id,
            "content": tool_result_text(call).unwrap_or_default(),
        }));
    }
}
