use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::ToolError;
use crate::execution_context::ExecutionContext;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON Schema the input must satisfy before `execute` is called.
    fn input_schema(&self) -> Value;

    /// JSON Schema every successful output satisfies.
    fn output_schema(&self) -> Value;

    /// Default gating. Deployments may override it per tool at startup.
    fn requires_approval(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError>;
}

/// Receives one structured record per dispatch.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, entry: Value);
}

/// Writes audit records to the `concierge::audit` tracing target.
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, entry: Value) {
        info!(target: "concierge::audit", %entry, "tool dispatch");
    }
}
