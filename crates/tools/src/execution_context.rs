use serde::{Deserialize, Serialize};

/// Per-invocation context handed to a tool. Tools never see global state;
/// everything owner-scoped is reached through `owner_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub owner_key: String,
    pub tool_call_id: String,
    pub timeout_ms: u64,
    pub audit_ref: String,
}

impl ExecutionContext {
    pub fn new(
        owner_key: impl Into<String>,
        tool_call_id: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            owner_key: owner_key.into(),
            tool_call_id: tool_call_id.into(),
            timeout_ms,
            audit_ref: uuid::Uuid::new_v4().to_string(),
        }
    }
}
