use std::time::Duration;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly food-ordering concierge. \
Use the tools to search the catalog, manage the user's cart and place orders. \
Never claim an order was placed unless a tool result confirms it. \
If the user declines an action, acknowledge it and offer an alternative.";

/// Knobs for one [`crate::ChatPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum model calls per request.
    pub step_budget: usize,
    /// Hard ceiling on a whole request, reconciliation included.
    pub wall_clock: Duration,
    pub tool_timeout_ms: u64,
    /// Executions remembered for retry replay.
    pub ledger_capacity: usize,
    pub system_prompt: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_budget: 5,
            wall_clock: Duration::from_secs(30),
            tool_timeout_ms: 10_000,
            ledger_capacity: 4096,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
