use concierge_core::ConversationError;
use concierge_providers::ProviderError;
use concierge_store::StoreError;
use concierge_tools::ToolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid conversation: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Pipeline task failed: {0}")]
    Join(String),
}
