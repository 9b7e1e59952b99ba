use async_trait::async_trait;
use concierge_core::Message;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Stream interrupted: {0}")]
    Stream(String),
}

/// A fully assembled tool call proposed by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    TextDelta(String),
    ToolCall(ToolCallRequest),
    /// Provider-reported finish reason, e.g. `stop` or `tool_calls`.
    Finish(String),
}

/// One model step: everything the model needs to produce its next turn.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Value>,
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelChunk, ProviderError>> + Send>>;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ProviderError>;

    fn name(&self) -> &str;
}
