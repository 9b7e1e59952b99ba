use concierge_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid contract for {tool}: {reason}")]
    Contract { tool: String, reason: String },

    #[error("Internal error")]
    Internal,
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        ToolError::Execution(err.to_string())
    }
}
